//! Document handles and the pixel decoder seam
//!
//! A [`Document`] is opened once and shared between the control thread and
//! the render workers. Decoders are not assumed to be thread safe, so each
//! worker asks the document for its own [`PageDecoder`] on its own thread.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info};

use crate::error::{DecodeFailure, DocumentOpenFailure};
use crate::geometry::{PagePlacement, Size};
use crate::raster::Raster;

/// Identity of a document for open-once sharing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DocumentSource {
    Path(PathBuf),
    /// Provider-defined name, e.g. a synthetic document descriptor
    Named(String),
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Rasterizer bound to one worker thread.
pub trait PageDecoder {
    /// Prepare `page` for rendering. Called once per page per worker.
    fn open_page(&mut self, page: usize) -> Result<(), DecodeFailure>;

    /// Draw `page` into `raster` so that the whole page lands on
    /// `placement`, clipped to the raster. The call cannot be interrupted.
    fn render(
        &mut self,
        page: usize,
        placement: &PagePlacement,
        raster: &mut Raster,
        annotations: bool,
    ) -> Result<(), DecodeFailure>;
}

/// An opened document.
pub trait Document: Send + Sync {
    fn page_count(&self) -> usize;

    /// Size of `page` in document units.
    fn page_size(&self, page: usize) -> Option<Size>;

    /// Create a decoder for use on the calling thread.
    fn decoder(&self) -> Result<Box<dyn PageDecoder>, DecodeFailure>;
}

/// Opens documents from sources.
pub trait DocumentProvider: Send + Sync {
    fn open(
        &self,
        source: &DocumentSource,
        password: Option<&str>,
    ) -> Result<Arc<dyn Document>, DocumentOpenFailure>;
}

struct OpenDocument {
    document: Arc<dyn Document>,
    refs: usize,
}

/// Reference-counted cache of open documents keyed by source.
///
/// Opening a source that is already open hands out the same document and
/// bumps its count; the document is closed when the count drops to zero.
pub struct DocumentRegistry {
    provider: Box<dyn DocumentProvider>,
    open: Mutex<HashMap<DocumentSource, OpenDocument>>,
}

impl DocumentRegistry {
    #[must_use]
    pub fn new(provider: impl DocumentProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            open: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<DocumentSource, OpenDocument>> {
        self.open
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Open `source` or reuse its open document, retaining it once.
    ///
    /// The provider runs without the registry lock held. When two callers
    /// open the same source concurrently, the first to finish is kept and
    /// the other document is dropped.
    pub fn open(
        &self,
        source: &DocumentSource,
        password: Option<&str>,
    ) -> Result<Arc<dyn Document>, DocumentOpenFailure> {
        if let Some(document) = self.retain(source) {
            debug!("Reusing open document {source} ({} refs)", self.ref_count(source));
            return Ok(document);
        }

        let document = self
            .provider
            .open(source, password)
            .inspect_err(|e| error!("Failed to open {source}: {e}"))?;

        match self.entries().entry(source.clone()) {
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                entry.refs += 1;
                debug!("Document {source} was opened concurrently, sharing it");
                Ok(Arc::clone(&entry.document))
            }
            Entry::Vacant(slot) => {
                info!(
                    "Opened document {source} with {} pages",
                    document.page_count()
                );
                slot.insert(OpenDocument {
                    document: Arc::clone(&document),
                    refs: 1,
                });
                Ok(document)
            }
        }
    }

    /// Open `source` and tie the reference to the returned lease.
    pub fn lease(
        self: &Arc<Self>,
        source: &DocumentSource,
        password: Option<&str>,
    ) -> Result<DocumentLease, DocumentOpenFailure> {
        let document = self.open(source, password)?;
        Ok(DocumentLease {
            registry: Arc::clone(self),
            source: source.clone(),
            document,
        })
    }

    /// Take another reference to an already open document.
    pub fn retain(&self, source: &DocumentSource) -> Option<Arc<dyn Document>> {
        let mut open = self.entries();
        let entry = open.get_mut(source)?;
        entry.refs += 1;
        Some(Arc::clone(&entry.document))
    }

    /// Drop one reference. Returns true if this closed the document.
    pub fn release(&self, source: &DocumentSource) -> bool {
        let mut open = self.entries();
        let Some(entry) = open.get_mut(source) else {
            return false;
        };
        entry.refs -= 1;
        if entry.refs > 0 {
            return false;
        }
        open.remove(source);
        info!("Closed document {source}");
        true
    }

    /// Current reference count of `source`, zero when closed.
    #[must_use]
    pub fn ref_count(&self, source: &DocumentSource) -> usize {
        self.entries()
            .get(source)
            .map_or(0, |entry| entry.refs)
    }
}

/// One reference to an open document, released on drop.
pub struct DocumentLease {
    registry: Arc<DocumentRegistry>,
    source: DocumentSource,
    document: Arc<dyn Document>,
}

impl DocumentLease {
    #[must_use]
    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }

    #[must_use]
    pub fn source(&self) -> &DocumentSource {
        &self.source
    }
}

impl Drop for DocumentLease {
    fn drop(&mut self) {
        self.registry.release(&self.source);
    }
}

impl fmt::Debug for DocumentLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentLease")
            .field("source", &self.source)
            .field("pages", &self.document.page_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use flume::{Receiver, Sender};

    use super::*;
    use crate::synthetic::SyntheticDocument;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct CountingProvider {
        opens: Arc<AtomicUsize>,
    }

    impl DocumentProvider for CountingProvider {
        fn open(
            &self,
            source: &DocumentSource,
            password: Option<&str>,
        ) -> Result<Arc<dyn Document>, DocumentOpenFailure> {
            match source {
                DocumentSource::Named(name) if name == "locked" && password.is_none() => {
                    Err(DocumentOpenFailure::AuthRequired)
                }
                DocumentSource::Path(path) => Err(DocumentOpenFailure::NotFound(path.clone())),
                DocumentSource::Named(_) => {
                    self.opens.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(SyntheticDocument::new(3, Size::new(100.0, 100.0))))
                }
            }
        }
    }

    fn registry() -> (DocumentRegistry, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let registry = DocumentRegistry::new(CountingProvider {
            opens: Arc::clone(&opens),
        });
        (registry, opens)
    }

    /// Opens "slow" only after the test releases the gate.
    struct GatedProvider {
        started: Sender<()>,
        gate: Receiver<()>,
        slow_opens: Arc<AtomicUsize>,
    }

    impl DocumentProvider for GatedProvider {
        fn open(
            &self,
            source: &DocumentSource,
            _password: Option<&str>,
        ) -> Result<Arc<dyn Document>, DocumentOpenFailure> {
            if *source == DocumentSource::Named("slow".into()) {
                let _ = self.started.send(());
                self.gate
                    .recv()
                    .map_err(|_| DocumentOpenFailure::Corrupt("gate closed".into()))?;
                self.slow_opens.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Arc::new(SyntheticDocument::new(2, Size::new(10.0, 10.0))))
        }
    }

    #[test]
    fn slow_open_does_not_block_the_registry() {
        let (started_tx, started) = flume::unbounded();
        let (gate, gate_rx) = flume::unbounded();
        let slow_opens = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(DocumentRegistry::new(GatedProvider {
            started: started_tx,
            gate: gate_rx,
            slow_opens: Arc::clone(&slow_opens),
        }));
        let slow = DocumentSource::Named("slow".into());

        let racers: Vec<_> = (0..2)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let slow = slow.clone();
                thread::spawn(move || registry.open(&slow, None))
            })
            .collect();
        started.recv_timeout(TIMEOUT).unwrap();
        started.recv_timeout(TIMEOUT).unwrap();

        // Both opens are in flight inside the provider.
        let other = DocumentSource::Named("other".into());
        registry.open(&other, None).unwrap();
        assert_eq!(registry.ref_count(&other), 1);
        assert_eq!(registry.ref_count(&slow), 0);
        assert!(registry.release(&other));

        gate.send(()).unwrap();
        gate.send(()).unwrap();
        let opened: Vec<_> = racers
            .into_iter()
            .map(|racer| racer.join().unwrap().unwrap())
            .collect();

        assert!(Arc::ptr_eq(&opened[0], &opened[1]));
        assert_eq!(slow_opens.load(Ordering::SeqCst), 2);
        assert_eq!(registry.ref_count(&slow), 2);
    }

    #[test]
    fn open_is_shared_and_ref_counted() {
        let (registry, opens) = registry();
        let source = DocumentSource::Named("doc".into());

        let a = registry.open(&source, None).unwrap();
        let b = registry.open(&source, None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(registry.ref_count(&source), 2);

        assert!(registry.retain(&source).is_some());
        assert!(!registry.release(&source));
        assert!(!registry.release(&source));
        assert!(registry.release(&source));
        assert_eq!(registry.ref_count(&source), 0);
        assert!(registry.retain(&source).is_none());

        registry.open(&source, None).unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn open_failures_are_surfaced() {
        let (registry, _) = registry();
        assert_eq!(
            registry
                .open(&DocumentSource::Named("locked".into()), None)
                .err(),
            Some(DocumentOpenFailure::AuthRequired)
        );
        let missing = DocumentSource::Path(PathBuf::from("/missing.pdf"));
        assert!(matches!(
            registry.open(&missing, None),
            Err(DocumentOpenFailure::NotFound(_))
        ));
        assert_eq!(registry.ref_count(&missing), 0);
    }

    #[test]
    fn lease_releases_on_drop() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        let source = DocumentSource::Named("doc".into());

        let lease = registry.lease(&source, None).unwrap();
        let second = registry.lease(&source, None).unwrap();
        assert_eq!(lease.document().page_count(), 3);
        assert_eq!(registry.ref_count(&source), 2);

        drop(lease);
        assert_eq!(registry.ref_count(&source), 1);
        drop(second);
        assert_eq!(registry.ref_count(&source), 0);
    }

    #[test]
    fn release_of_unknown_source_is_noop() {
        let (registry, _) = registry();
        assert!(!registry.release(&DocumentSource::Named("x".into())));
    }
}

//! Cancellable render dispatcher
//!
//! Requests are queued to a single worker thread and served one at a time.
//! Decoding cannot be interrupted: cancelling only bumps the generation, so
//! queued requests are skipped and any result that completes afterwards is
//! dropped instead of being delivered.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use flume::Sender;
use log::{debug, info};

use super::request::{DispatcherKind, RenderEvent, RenderRequest, RequestKey, WorkerCommand};
use super::worker::render_worker;
use crate::document::Document;

/// State shared between a dispatcher and its worker.
#[derive(Default)]
pub(crate) struct DispatchControl {
    running: AtomicBool,
    generation: AtomicU64,
    /// Queued or decoding requests, with the generation they were queued in
    pending: Mutex<HashMap<RequestKey, u64>>,
    discarded: AtomicU64,
}

impl DispatchControl {
    fn pending(&self) -> MutexGuard<'_, HashMap<RequestKey, u64>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Forget `key` unless it was requeued by a later generation.
    pub(crate) fn finish(&self, key: &RequestKey, generation: u64) {
        let mut pending = self.pending();
        if pending.get(key) == Some(&generation) {
            pending.remove(key);
        }
    }

    pub(crate) fn note_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    fn cancel(&self) -> u64 {
        let mut pending = self.pending();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        pending.clear();
        generation
    }
}

/// One render queue with its worker thread.
pub struct RenderDispatcher {
    kind: DispatcherKind,
    control: Arc<DispatchControl>,
    commands: Sender<WorkerCommand>,
}

impl RenderDispatcher {
    /// Spawn the worker thread. The dispatcher starts stopped.
    ///
    /// Completed tiles and failures are sent on `events`.
    pub fn spawn(
        kind: DispatcherKind,
        document: Arc<dyn Document>,
        events: Sender<RenderEvent>,
    ) -> std::io::Result<Self> {
        let control = Arc::new(DispatchControl::default());
        let (commands, command_rx) = flume::unbounded();

        let worker_control = Arc::clone(&control);
        thread::Builder::new()
            .name(format!("tilepager-{}", kind.name()))
            .spawn(move || render_worker(kind, document, command_rx, events, worker_control))?;

        Ok(Self {
            kind,
            control,
            commands,
        })
    }

    #[must_use]
    pub fn kind(&self) -> DispatcherKind {
        self.kind
    }

    pub fn start(&self) {
        if !self.control.running.swap(true, Ordering::SeqCst) {
            info!("{} dispatcher started", self.kind.name());
        }
    }

    /// Stop accepting requests and drop everything queued or in flight.
    pub fn stop(&self) {
        if self.control.running.swap(false, Ordering::SeqCst) {
            self.control.cancel();
            info!("{} dispatcher stopped", self.kind.name());
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.control.running.load(Ordering::SeqCst)
    }

    /// Queue `request` unless an equal request is already queued or being
    /// decoded. Returns true if it was queued.
    pub fn submit(&self, request: RenderRequest) -> bool {
        if !self.is_running() {
            debug!(
                "{} dispatcher stopped, ignoring page {}",
                self.kind.name(),
                request.tile.logical_page
            );
            return false;
        }

        let generation = {
            let mut pending = self.control.pending();
            let generation = self.control.generation.load(Ordering::SeqCst);
            if pending.get(&request.key()) == Some(&generation) {
                return false;
            }
            pending.insert(request.key(), generation);
            generation
        };

        self.commands
            .send(WorkerCommand::Render {
                generation,
                request,
            })
            .is_ok()
    }

    /// Drop every queued request. A decode already running finishes, but its
    /// result is discarded.
    pub fn cancel_all(&self) {
        let generation = self.control.cancel();
        debug!(
            "{} dispatcher cancelled, generation {generation}",
            self.kind.name()
        );
    }

    /// Generation of requests submitted now. Results tagged with an older
    /// generation are stale.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.control.generation.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.control.is_current(generation)
    }

    /// Requests queued or being decoded in the current generation.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.control.pending().len()
    }

    /// Results dropped by the worker because they went stale.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.control.discarded.load(Ordering::Relaxed)
    }

    /// Ask the worker to exit after its current request.
    pub fn shutdown(&self) {
        self.stop();
        let _ = self.commands.send(WorkerCommand::Shutdown);
    }
}

impl Drop for RenderDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RenderDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDispatcher")
            .field("kind", &self.kind)
            .field("running", &self.is_running())
            .field("generation", &self.generation())
            .field("pending", &self.pending_count())
            .finish()
    }
}

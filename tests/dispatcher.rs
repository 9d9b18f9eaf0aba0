use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flume::{Receiver, Sender};
use tilepager::document::{Document, PageDecoder};
use tilepager::geometry::PagePlacement;
use tilepager::raster::Raster;
use tilepager::render::{DispatcherKind, RenderDispatcher, RenderEvent, RenderRequest};
use tilepager::synthetic::SyntheticDocument;
use tilepager::{DecodeFailure, RelRect, Size, TileKey};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Document whose decoder reports each decode start and then waits for
/// the test to release it.
struct GatedDocument {
    started: Sender<usize>,
    gate: Receiver<()>,
    decodes: Arc<AtomicUsize>,
}

struct GatedDecoder {
    started: Sender<usize>,
    gate: Receiver<()>,
    decodes: Arc<AtomicUsize>,
}

impl Document for GatedDocument {
    fn page_count(&self) -> usize {
        16
    }

    fn page_size(&self, _page: usize) -> Option<Size> {
        Some(Size::new(100.0, 100.0))
    }

    fn decoder(&self) -> Result<Box<dyn PageDecoder>, DecodeFailure> {
        Ok(Box::new(GatedDecoder {
            started: self.started.clone(),
            gate: self.gate.clone(),
            decodes: Arc::clone(&self.decodes),
        }))
    }
}

impl PageDecoder for GatedDecoder {
    fn open_page(&mut self, _page: usize) -> Result<(), DecodeFailure> {
        Ok(())
    }

    fn render(
        &mut self,
        page: usize,
        _placement: &PagePlacement,
        _raster: &mut Raster,
        _annotations: bool,
    ) -> Result<(), DecodeFailure> {
        let _ = self.started.send(page);
        self.gate
            .recv()
            .map_err(|_| DecodeFailure::backend("gate closed"))?;
        self.decodes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    dispatcher: RenderDispatcher,
    events: Receiver<RenderEvent>,
    started: Receiver<usize>,
    gate: Sender<()>,
    decodes: Arc<AtomicUsize>,
}

fn gated(kind: DispatcherKind) -> Harness {
    let (started_tx, started) = flume::unbounded();
    let (gate, gate_rx) = flume::unbounded();
    let decodes = Arc::new(AtomicUsize::new(0));
    let document = Arc::new(GatedDocument {
        started: started_tx,
        gate: gate_rx,
        decodes: Arc::clone(&decodes),
    });

    let (events_tx, events) = flume::bounded(16);
    let dispatcher = RenderDispatcher::spawn(kind, document, events_tx).unwrap();
    dispatcher.start();

    Harness {
        dispatcher,
        events,
        started,
        gate,
        decodes,
    }
}

fn request(page: usize) -> RenderRequest {
    RenderRequest {
        tile: TileKey::part(page, page, 8.0, 8.0, RelRect::FULL),
        order: page as u64 + 1,
        best_quality: true,
        annotations: false,
    }
}

fn ready_page(event: RenderEvent) -> usize {
    match event {
        RenderEvent::TileReady { tile, .. } => tile.logical_page(),
        RenderEvent::Failed { key, error, .. } => {
            panic!("page {} failed: {error}", key.logical_page)
        }
    }
}

#[test]
fn identical_requests_decode_once() {
    let h = gated(DispatcherKind::Primary);

    assert!(h.dispatcher.submit(request(0)));
    assert_eq!(h.started.recv_timeout(TIMEOUT).unwrap(), 0);

    // Page 0 is decoding and page 1 is queued: neither is queued again.
    assert!(h.dispatcher.submit(request(1)));
    assert!(!h.dispatcher.submit(request(1)));
    assert!(!h.dispatcher.submit(request(0)));
    assert_eq!(h.dispatcher.pending_count(), 2);

    h.gate.send(()).unwrap();
    assert_eq!(ready_page(h.events.recv_timeout(TIMEOUT).unwrap()), 0);
    assert_eq!(h.started.recv_timeout(TIMEOUT).unwrap(), 1);
    h.gate.send(()).unwrap();
    assert_eq!(ready_page(h.events.recv_timeout(TIMEOUT).unwrap()), 1);

    assert!(h.events.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(h.decodes.load(Ordering::SeqCst), 2);
    assert_eq!(h.dispatcher.pending_count(), 0);
}

#[test]
fn cancel_discards_result_of_running_decode() {
    let h = gated(DispatcherKind::Primary);

    assert!(h.dispatcher.submit(request(3)));
    assert_eq!(h.started.recv_timeout(TIMEOUT).unwrap(), 3);
    assert!(h.dispatcher.submit(request(4)));

    h.dispatcher.cancel_all();
    assert_eq!(h.dispatcher.pending_count(), 0);

    // The same tile may be requested again in the new generation.
    assert!(h.dispatcher.submit(request(3)));
    h.gate.send(()).unwrap();
    assert_eq!(h.started.recv_timeout(TIMEOUT).unwrap(), 3);
    h.gate.send(()).unwrap();

    let event = h.events.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(event.generation(), h.dispatcher.generation());
    assert_eq!(ready_page(event), 3);

    assert!(h.events.try_recv().is_err());
    // The stale decode and the skipped queued request.
    assert_eq!(h.dispatcher.discarded(), 2);
    assert_eq!(h.decodes.load(Ordering::SeqCst), 2);
}

#[test]
fn cancelling_primary_leaves_secondary_work_alone() {
    let primary = gated(DispatcherKind::Primary);
    let secondary = gated(DispatcherKind::Secondary);

    assert!(primary.dispatcher.submit(request(0)));
    assert!(secondary.dispatcher.submit(request(5)));
    assert_eq!(primary.started.recv_timeout(TIMEOUT).unwrap(), 0);
    assert_eq!(secondary.started.recv_timeout(TIMEOUT).unwrap(), 5);
    assert!(secondary.dispatcher.submit(request(6)));

    let generation = secondary.dispatcher.generation();
    primary.dispatcher.cancel_all();
    assert_eq!(primary.dispatcher.pending_count(), 0);
    assert_eq!(secondary.dispatcher.generation(), generation);
    assert_eq!(secondary.dispatcher.pending_count(), 2);

    primary.gate.send(()).unwrap();
    secondary.gate.send(()).unwrap();
    let event = secondary.events.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(event.dispatcher(), DispatcherKind::Secondary);
    assert!(secondary.dispatcher.is_current(event.generation()));
    assert_eq!(ready_page(event), 5);

    assert_eq!(secondary.started.recv_timeout(TIMEOUT).unwrap(), 6);
    secondary.gate.send(()).unwrap();
    assert_eq!(ready_page(secondary.events.recv_timeout(TIMEOUT).unwrap()), 6);
    assert_eq!(secondary.dispatcher.discarded(), 0);

    // The cancelled primary decode finishes without reporting.
    assert!(primary.events.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn stopped_dispatcher_ignores_requests() {
    let h = gated(DispatcherKind::Primary);
    h.dispatcher.stop();
    assert!(!h.dispatcher.is_running());
    assert!(!h.dispatcher.submit(request(0)));
    assert!(h.started.recv_timeout(Duration::from_millis(100)).is_err());

    h.dispatcher.start();
    assert!(h.dispatcher.submit(request(0)));
    assert_eq!(h.started.recv_timeout(TIMEOUT).unwrap(), 0);
    h.gate.send(()).unwrap();
    assert_eq!(ready_page(h.events.recv_timeout(TIMEOUT).unwrap()), 0);
}

#[test]
fn failed_decode_keeps_worker_alive() {
    let document = Arc::new(SyntheticDocument::new(3, Size::new(50.0, 50.0)).with_failing_page(1));
    let (events_tx, events) = flume::bounded(4);
    let dispatcher =
        RenderDispatcher::spawn(DispatcherKind::Secondary, document, events_tx).unwrap();
    dispatcher.start();

    dispatcher.submit(request(1));
    dispatcher.submit(request(2));

    match events.recv_timeout(TIMEOUT).unwrap() {
        RenderEvent::Failed {
            dispatcher: kind,
            key,
            error,
            ..
        } => {
            assert_eq!(kind, DispatcherKind::Secondary);
            assert_eq!(key.document_page, 1);
            assert!(matches!(error, DecodeFailure::Page { page: 1, .. }));
        }
        RenderEvent::TileReady { .. } => panic!("page 1 should fail"),
    }

    match events.recv_timeout(TIMEOUT).unwrap() {
        RenderEvent::TileReady { tile, order, .. } => {
            assert_eq!(tile.logical_page(), 2);
            assert_eq!(order, 3);
            assert_eq!(tile.raster().width(), 8);
        }
        RenderEvent::Failed { error, .. } => panic!("page 2 failed: {error}"),
    }
}

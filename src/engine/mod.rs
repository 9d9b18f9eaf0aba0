//! Paging engine - ties viewport, planner, dispatchers and cache together
//!
//! The engine lives on the control thread. Viewport changes go through
//! [`EngineState::apply`]; the resulting effects start load passes, recycle
//! the cache or ask the host to redraw. Completed tiles come back from the
//! render workers over a bounded channel and are only applied when the host
//! polls for them.

mod state;

use std::sync::Arc;
use std::time::Duration;

use flume::Receiver;
use log::{debug, info, warn};

pub use self::state::{Command, Effect, EngineState};
use crate::cache::{CacheOccupancy, CacheRegistry, CachedTile, TileCache};
use crate::config::EngineConfig;
use crate::document::{Document, DocumentLease, DocumentRegistry, DocumentSource};
use crate::error::EngineError;
use crate::geometry::{Point, Size};
use crate::pages::PageOrder;
use crate::planner::{PlannedRequest, plan_pass};
use crate::render::{DispatcherKind, RenderDispatcher, RenderEvent, RenderRequest};
use crate::tile::{Tile, TileKey};
use crate::viewport::{ScrollDirection, Viewport};

/// Receives redraw requests from the engine.
pub trait RedrawSink: Send + Sync {
    fn request_redraw(&self);
}

impl<F> RedrawSink for F
where
    F: Fn() + Send + Sync,
{
    fn request_redraw(&self) {
        self();
    }
}

/// Running counters of one engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Load passes started
    pub passes: u64,
    /// Requests produced by the planner
    pub planned: u64,
    /// Planned tiles served from the cache without rendering
    pub promoted: u64,
    /// Requests queued on a dispatcher
    pub submitted: u64,
    /// Tiles delivered into the cache
    pub rendered: u64,
    /// Results dropped because their pass was cancelled
    pub discarded: u64,
    pub failed: u64,
    pub occupancy: CacheOccupancy,
}

/// Tiled paging engine for one document view.
pub struct PagingEngine {
    config: EngineConfig,
    document: Arc<dyn Document>,
    // Keeps the shared document open for as long as the engine lives.
    lease: Option<DocumentLease>,
    state: EngineState,
    cache: TileCache,
    primary: RenderDispatcher,
    secondary: RenderDispatcher,
    events: Receiver<RenderEvent>,
    redraw: Option<Box<dyn RedrawSink>>,
    stats: EngineStats,
    engine_discarded: u64,
}

impl PagingEngine {
    /// Create an engine over an already opened document.
    ///
    /// `pages` maps logical pages to document pages; `None` shows every page
    /// in document order. The cache joins `registry`'s shared budget.
    pub fn new(
        document: Arc<dyn Document>,
        pages: Option<PageOrder>,
        view_size: Size,
        config: EngineConfig,
        registry: &CacheRegistry,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let pages = pages.unwrap_or_else(|| PageOrder::identity(document.page_count()));
        if pages.is_empty() || document.page_count() == 0 {
            return Err(EngineError::NoPages);
        }
        let page_size = pages
            .document_page(0)
            .and_then(|page| document.page_size(page))
            .or_else(|| document.page_size(0))
            .ok_or(EngineError::NoPages)?;

        let viewport = Viewport::new(&config, view_size, page_size, pages.len());
        let cache = TileCache::new(registry, config.cache_size, config.thumbnail_cache_size);

        let (event_tx, events) = flume::bounded(config.event_capacity);
        let primary =
            RenderDispatcher::spawn(DispatcherKind::Primary, Arc::clone(&document), event_tx.clone())?;
        let secondary =
            RenderDispatcher::spawn(DispatcherKind::Secondary, Arc::clone(&document), event_tx)?;
        primary.start();
        secondary.start();

        info!(
            "Paging engine ready: {} pages, view {}x{}, tile {}",
            pages.len(),
            view_size.width,
            view_size.height,
            config.tile_size
        );

        Ok(Self {
            config,
            document,
            lease: None,
            state: EngineState::new(viewport, pages),
            cache,
            primary,
            secondary,
            events,
            redraw: None,
            stats: EngineStats::default(),
            engine_discarded: 0,
        })
    }

    /// Open `source` through `documents`, sharing an already open document.
    ///
    /// The document reference is released when the engine is dropped.
    pub fn open(
        documents: &Arc<DocumentRegistry>,
        source: &DocumentSource,
        password: Option<&str>,
        view_size: Size,
        config: EngineConfig,
        registry: &CacheRegistry,
    ) -> Result<Self, EngineError> {
        let lease = documents.lease(source, password)?;
        let mut engine = Self::new(
            Arc::clone(lease.document()),
            None,
            view_size,
            config,
            registry,
        )?;
        engine.lease = Some(lease);
        Ok(engine)
    }

    pub fn set_redraw_sink(&mut self, sink: impl RedrawSink + 'static) {
        self.redraw = Some(Box::new(sink));
    }

    /// Apply a command and execute its effects
    pub fn apply_command(&mut self, cmd: Command) {
        let effects = self.state.apply(cmd);
        self.execute_effects(effects);
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Redraw => self.request_redraw(),
                Effect::LoadPages => self.load_pass(),
                Effect::RecycleCache => self.recycle_now(),
            }
        }
    }

    /// Take offset, zoom and direction from the gesture layer as-is.
    pub fn set_viewport(&mut self, offset: Point, zoom: f32, direction: ScrollDirection) {
        self.apply_command(Command::SetViewport {
            offset,
            zoom,
            direction,
        });
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.apply_command(Command::MoveTo(Point::new(x, y)));
    }

    pub fn move_relative(&mut self, dx: f32, dy: f32) {
        self.apply_command(Command::MoveRelative { dx, dy });
    }

    pub fn zoom_to(&mut self, zoom: f32) {
        self.apply_command(Command::ZoomTo(zoom));
    }

    pub fn zoom_centered_to(&mut self, zoom: f32, pivot: Point) {
        self.apply_command(Command::ZoomCenteredTo { zoom, pivot });
    }

    pub fn reset_zoom(&mut self) {
        self.apply_command(Command::ResetZoom);
    }

    pub fn jump_to(&mut self, page: usize) {
        self.apply_command(Command::JumpTo(page));
    }

    /// Scroll to `progress` in `[0, 1]` of the document.
    pub fn set_position_offset(&mut self, progress: f32) {
        self.apply_command(Command::SetPositionOffset(progress));
    }

    pub fn resize(&mut self, view_size: Size) {
        self.apply_command(Command::Resize(view_size));
    }

    pub fn set_page_order(&mut self, pages: PageOrder) {
        self.apply_command(Command::SetPageOrder(pages));
    }

    /// Start a load pass for the current viewport.
    pub fn request_load(&mut self) {
        self.apply_command(Command::RequestLoad);
    }

    /// Drop every cached tile and everything queued or in flight.
    pub fn recycle(&mut self) {
        self.apply_command(Command::Recycle);
    }

    fn load_pass(&mut self) {
        self.primary.start();
        self.secondary.start();
        self.primary.cancel_all();
        self.cache.begin_new_pass();

        let planned = plan_pass(&self.state.viewport, &self.state.pages, &self.config);
        self.stats.passes += 1;
        self.stats.planned += planned.len() as u64;

        let mut submitted = 0u64;
        let mut promoted = 0u64;
        for request in planned {
            match request {
                PlannedRequest::Tile { key, order } => {
                    if self.cache.promote_if_present(&key, order) {
                        promoted += 1;
                    } else if self.primary.submit(self.render_request(key, order)) {
                        submitted += 1;
                    }
                }
                PlannedRequest::Thumbnail { key, dispatcher } => {
                    if self.cache.contains_thumbnail(&key) {
                        continue;
                    }
                    if self.dispatcher(dispatcher).submit(self.render_request(key, 0)) {
                        submitted += 1;
                    }
                }
            }
        }

        self.stats.promoted += promoted;
        self.stats.submitted += submitted;
        debug!(
            "Load pass {} at page {}: {submitted} submitted, {promoted} promoted",
            self.stats.passes,
            self.state.viewport.current_page()
        );
    }

    fn render_request(&self, tile: TileKey, order: u64) -> RenderRequest {
        RenderRequest {
            tile,
            order,
            best_quality: self.config.best_quality,
            annotations: self.config.annotation_rendering,
        }
    }

    fn dispatcher(&self, kind: DispatcherKind) -> &RenderDispatcher {
        match kind {
            DispatcherKind::Primary => &self.primary,
            DispatcherKind::Secondary => &self.secondary,
        }
    }

    fn recycle_now(&mut self) {
        self.primary.stop();
        self.secondary.stop();
        self.cache.recycle();
        while let Ok(event) = self.events.try_recv() {
            debug!("Dropping {:?} event on recycle", event.dispatcher());
            self.engine_discarded += 1;
        }
        info!("Paging engine recycled");
    }

    fn request_redraw(&self) {
        if let Some(sink) = &self.redraw {
            sink.request_redraw();
        }
    }

    /// Apply every completed render that is ready. Returns how many events
    /// were handled.
    pub fn poll_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
            handled += 1;
        }
        handled
    }

    /// Block up to `timeout` for one event, then apply everything ready.
    pub fn wait_for_events(&mut self, timeout: Duration) -> usize {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.apply_event(event);
                1 + self.poll_events()
            }
            Err(_) => 0,
        }
    }

    fn apply_event(&mut self, event: RenderEvent) {
        if !self
            .dispatcher(event.dispatcher())
            .is_current(event.generation())
        {
            self.engine_discarded += 1;
            return;
        }

        match event {
            RenderEvent::TileReady { order, tile, .. } => {
                let tile = Arc::new(tile);
                if tile.is_thumbnail() {
                    self.cache.insert_thumbnail(tile);
                } else {
                    self.cache.insert_tile(tile, order);
                }
                self.stats.rendered += 1;
                self.request_redraw();
            }
            RenderEvent::Failed { key, error, .. } => {
                warn!(
                    "Page {} (document page {}) failed to render: {error}",
                    key.logical_page, key.document_page
                );
                self.stats.failed += 1;
            }
        }
    }

    /// True when neither dispatcher has queued or running work.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.primary.pending_count() == 0 && self.secondary.pending_count() == 0
    }

    /// Cached full-resolution tiles, lowest priority first.
    #[must_use]
    pub fn visible_tiles_snapshot(&self) -> Vec<CachedTile> {
        self.cache.tiles_snapshot()
    }

    /// Cached thumbnails, oldest first.
    #[must_use]
    pub fn thumbnails_snapshot(&self) -> Vec<Arc<Tile>> {
        self.cache.thumbnails_snapshot()
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            discarded: self.engine_discarded
                + self.primary.discarded()
                + self.secondary.discarded(),
            occupancy: self.cache.occupancy(),
            ..self.stats
        }
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.state.viewport
    }

    #[must_use]
    pub fn page_order(&self) -> &PageOrder {
        &self.state.pages
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.state.viewport.current_page()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.pages.len()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    #[must_use]
    pub fn document(&self) -> &Arc<dyn Document> {
        &self.document
    }

    #[must_use]
    pub fn source(&self) -> Option<&DocumentSource> {
        self.lease.as_ref().map(DocumentLease::source)
    }
}

impl Drop for PagingEngine {
    fn drop(&mut self) {
        self.primary.shutdown();
        self.secondary.shutdown();
    }
}

impl std::fmt::Debug for PagingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagingEngine")
            .field("pages", &self.page_count())
            .field("current_page", &self.current_page())
            .field("primary", &self.primary)
            .field("secondary", &self.secondary)
            .finish_non_exhaustive()
    }
}

//! Render worker - runs on a dedicated thread per dispatcher

use std::collections::HashSet;
use std::sync::Arc;

use flume::{Receiver, Sender};
use log::{debug, warn};

use super::dispatcher::DispatchControl;
use super::request::{DispatcherKind, RenderEvent, RenderRequest, WorkerCommand};
use crate::document::{Document, PageDecoder};
use crate::error::DecodeFailure;
use crate::geometry::PagePlacement;
use crate::raster::{PixelFormat, Raster};
use crate::tile::Tile;

/// Decoder state owned by one worker thread.
struct WorkerState {
    document: Arc<dyn Document>,
    decoder: Option<Box<dyn PageDecoder>>,
    opened_pages: HashSet<usize>,
}

impl WorkerState {
    fn decoder(&mut self) -> Result<&mut Box<dyn PageDecoder>, DecodeFailure> {
        if self.decoder.is_none() {
            self.decoder = Some(self.document.decoder()?);
        }
        self.decoder
            .as_mut()
            .ok_or_else(|| DecodeFailure::backend("decoder unavailable"))
    }

    fn ensure_open(&mut self, page: usize) -> Result<(), DecodeFailure> {
        if self.opened_pages.contains(&page) {
            return Ok(());
        }
        self.decoder()?.open_page(page)?;
        self.opened_pages.insert(page);
        Ok(())
    }

    /// Decode one request into a tile. Blocks until the decoder is done.
    fn render(&mut self, request: &RenderRequest) -> Result<Tile, DecodeFailure> {
        let key = request.tile;
        if !key.has_area() || !key.bounds.is_within_page() {
            return Err(DecodeFailure::InvalidRegion);
        }

        self.ensure_open(key.document_page)?;

        let mut raster = Raster::allocate(key.pixel_width, key.pixel_height, PixelFormat::Rgba8888)?;
        let placement = PagePlacement::for_region(&key.bounds, key.pixel_width, key.pixel_height)
            .ok_or(DecodeFailure::InvalidRegion)?;

        self.decoder()?
            .render(key.document_page, &placement, &mut raster, request.annotations)?;

        let raster = if request.best_quality {
            raster
        } else {
            raster.into_rgb565()?
        };
        Ok(Tile::new(key, raster))
    }
}

/// Main worker loop. Serves commands in FIFO order until shutdown or until
/// either channel end is dropped.
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub(crate) fn render_worker(
    kind: DispatcherKind,
    document: Arc<dyn Document>,
    commands: Receiver<WorkerCommand>,
    events: Sender<RenderEvent>,
    control: Arc<DispatchControl>,
) {
    let mut state = WorkerState {
        document,
        decoder: None,
        opened_pages: HashSet::new(),
    };

    for command in commands {
        let (generation, request) = match command {
            WorkerCommand::Render {
                generation,
                request,
            } => (generation, request),
            WorkerCommand::Shutdown => break,
        };

        if !control.is_current(generation) {
            control.note_discarded();
            continue;
        }

        let result = state.render(&request);

        if !control.is_current(generation) {
            control.finish(&request.key(), generation);
            debug!(
                "{} worker dropped result for page {} after cancel",
                kind.name(),
                request.tile.logical_page
            );
            control.note_discarded();
            continue;
        }

        let event = match result {
            Ok(tile) => RenderEvent::TileReady {
                dispatcher: kind,
                generation,
                order: request.order,
                tile,
            },
            Err(error) => {
                warn!(
                    "{} worker failed to render page {}: {error}",
                    kind.name(),
                    request.tile.document_page
                );
                RenderEvent::Failed {
                    dispatcher: kind,
                    generation,
                    key: request.tile,
                    error,
                }
            }
        };

        // Still pending until the event is queued, so an idle dispatcher
        // never has a result in transit.
        let sent = events.send(event).is_ok();
        control.finish(&request.key(), generation);
        if !sent {
            break;
        }
    }

    debug!("{} render worker exiting", kind.name());
}

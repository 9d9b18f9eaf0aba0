//! Viewport state driven by commands

use crate::geometry::{Point, Size};
use crate::pages::PageOrder;
use crate::viewport::{ScrollDirection, Viewport};

/// Change requested by the gesture or host layer
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Offset, zoom and direction exactly as computed by the gesture layer
    SetViewport {
        offset: Point,
        zoom: f32,
        direction: ScrollDirection,
    },
    /// Clamped move; the direction is derived from the change
    MoveTo(Point),
    MoveRelative { dx: f32, dy: f32 },
    ZoomTo(f32),
    ZoomCenteredTo { zoom: f32, pivot: Point },
    ResetZoom,
    JumpTo(usize),
    SetPositionOffset(f32),
    Resize(Size),
    SetPageOrder(PageOrder),
    /// Start a new load pass
    RequestLoad,
    Recycle,
}

/// Work the engine performs after a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    Redraw,
    LoadPages,
    RecycleCache,
}

/// Viewport and page order of one document view.
#[derive(Clone, Debug)]
pub struct EngineState {
    pub viewport: Viewport,
    pub pages: PageOrder,
}

impl EngineState {
    #[must_use]
    pub fn new(viewport: Viewport, pages: PageOrder) -> Self {
        Self { viewport, pages }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::SetViewport {
                offset,
                zoom,
                direction,
            } => {
                self.viewport.set_state(offset, zoom, direction);
                vec![Effect::Redraw]
            }

            Command::MoveTo(point) => self.moved(|vp| vp.move_to(point.x, point.y)),

            Command::MoveRelative { dx, dy } => self.moved(|vp| vp.move_relative(dx, dy)),

            Command::ZoomTo(zoom) => self.moved(|vp| vp.zoom_to(zoom)),

            Command::ZoomCenteredTo { zoom, pivot } => {
                self.moved(|vp| vp.zoom_centered_to(zoom, pivot))
            }

            Command::ResetZoom => self.moved(|vp| {
                vp.reset_zoom();
                let offset = vp.offset();
                vp.move_to(offset.x, offset.y);
            }),

            Command::JumpTo(page) => self.moved(|vp| vp.jump_to(page)),

            Command::SetPositionOffset(progress) => {
                self.moved(|vp| vp.set_position_offset(progress))
            }

            Command::Resize(size) => {
                if self.viewport.view_size() == size {
                    vec![]
                } else {
                    self.viewport.set_view_size(size);
                    vec![Effect::LoadPages, Effect::Redraw]
                }
            }

            Command::SetPageOrder(pages) => {
                if self.pages == pages {
                    return vec![];
                }
                self.viewport.set_page_count(pages.len());
                self.pages = pages;
                let offset = self.viewport.offset();
                self.viewport.move_to(offset.x, offset.y);
                vec![Effect::RecycleCache, Effect::LoadPages, Effect::Redraw]
            }

            Command::RequestLoad => vec![Effect::LoadPages, Effect::Redraw],

            Command::Recycle => vec![Effect::RecycleCache],
        }
    }

    fn moved(&mut self, change: impl FnOnce(&mut Viewport)) -> Vec<Effect> {
        let before = (self.viewport.offset(), self.viewport.zoom());
        change(&mut self.viewport);
        if before == (self.viewport.offset(), self.viewport.zoom()) {
            vec![]
        } else {
            vec![Effect::Redraw]
        }
    }
}

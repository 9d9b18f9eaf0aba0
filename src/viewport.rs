//! Viewport geometry over the page strip
//!
//! Pages are laid end to end (vertically or horizontally) at zoom-scaled
//! optimal size plus per-page margins. The offset is the position of the
//! viewport's top-left corner inside that strip; it goes negative only when
//! the document is smaller than the viewport and gets centered.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::geometry::{Point, Size, snap_floor};

/// Direction in which pages are stacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

impl Orientation {
    /// Returns true if pages are stacked top to bottom
    pub fn is_vertical(self) -> bool {
        matches!(self, Self::Vertical)
    }
}

/// Movement along the strip since the previous offset change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollDirection {
    #[default]
    None,
    /// Towards the last page
    Forward,
    /// Towards the first page
    Backward,
}

impl ScrollDirection {
    /// Direction implied by moving from `previous` to `current` along the strip.
    #[must_use]
    pub fn between(previous: f32, current: f32) -> Self {
        if current > previous {
            Self::Forward
        } else if current < previous {
            Self::Backward
        } else {
            Self::None
        }
    }
}

/// Scroll, zoom and page layout state of one document view.
#[derive(Debug, Clone)]
pub struct Viewport {
    orientation: Orientation,
    paging: bool,
    view_size: Size,
    page_size: Size,
    optimal: Size,
    page_count: usize,
    zoom: f32,
    min_zoom: f32,
    mid_zoom: f32,
    max_zoom: f32,
    offset: Point,
    direction: ScrollDirection,
    margin: Size,
}

impl Viewport {
    /// Viewport over `page_count` pages whose reference size is `page_size`
    /// (in document units), shown in a `view_size` device-pixel area.
    #[must_use]
    pub fn new(config: &EngineConfig, view_size: Size, page_size: Size, page_count: usize) -> Self {
        let mut viewport = Self {
            orientation: config.orientation,
            paging: config.paging,
            view_size,
            page_size,
            optimal: Size::default(),
            page_count,
            zoom: config.min_zoom,
            min_zoom: config.min_zoom,
            mid_zoom: config.mid_zoom,
            max_zoom: config.max_zoom,
            offset: Point::default(),
            direction: ScrollDirection::None,
            margin: Size::default(),
        };
        viewport.optimal = viewport.compute_optimal();
        viewport.update_margins();
        viewport
    }

    fn compute_optimal(&self) -> Size {
        if self.view_size.is_empty() || self.page_size.is_empty() {
            return Size::default();
        }

        let ratio = self.page_size.width / self.page_size.height;
        let mut width = self.view_size.width;
        let mut height = (self.view_size.width / ratio).floor();
        if height > self.view_size.height {
            height = self.view_size.height;
            width = (self.view_size.height * ratio).floor();
        }
        Size::new(width, height)
    }

    fn update_margins(&mut self) {
        self.margin = if self.paging && self.page_count > 1 {
            Size::new(
                self.to_current_scale(self.view_size.width - self.optimal.width) / 2.0,
                self.to_current_scale(self.view_size.height - self.optimal.height) / 2.0,
            )
        } else {
            Size::default()
        };
    }

    #[must_use]
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[must_use]
    pub fn view_size(&self) -> Size {
        self.view_size
    }

    /// Page size fitted into the viewport at zoom 1.
    #[must_use]
    pub fn optimal_page_size(&self) -> Size {
        self.optimal
    }

    #[must_use]
    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    #[must_use]
    pub fn min_zoom(&self) -> f32 {
        self.min_zoom
    }

    #[must_use]
    pub fn mid_zoom(&self) -> f32 {
        self.mid_zoom
    }

    #[must_use]
    pub fn max_zoom(&self) -> f32 {
        self.max_zoom
    }

    #[must_use]
    pub fn is_zooming(&self) -> bool {
        (self.zoom - self.min_zoom).abs() > f32::EPSILON
    }

    #[must_use]
    pub fn offset(&self) -> Point {
        self.offset
    }

    #[must_use]
    pub fn scroll_direction(&self) -> ScrollDirection {
        self.direction
    }

    #[must_use]
    pub fn page_margin(&self) -> Size {
        self.margin
    }

    #[must_use]
    pub fn to_current_scale(&self, size: f32) -> f32 {
        size * self.zoom
    }

    /// Optimal page size at the current zoom.
    #[must_use]
    pub fn scaled_page_size(&self) -> Size {
        self.optimal.scaled(self.zoom)
    }

    /// Scaled page size plus margins on both sides: the pitch of the strip.
    #[must_use]
    pub fn page_outer_size(&self) -> Size {
        let scaled = self.scaled_page_size();
        Size::new(
            scaled.width + self.margin.width * 2.0,
            scaled.height + self.margin.height * 2.0,
        )
    }

    /// Component of `p` along the stacking axis.
    #[must_use]
    pub fn along(&self, p: Point) -> f32 {
        if self.orientation.is_vertical() { p.y } else { p.x }
    }

    /// Component of `s` along the stacking axis.
    #[must_use]
    pub fn along_size(&self, s: Size) -> f32 {
        if self.orientation.is_vertical() {
            s.height
        } else {
            s.width
        }
    }

    /// Component of `s` across the stacking axis.
    #[must_use]
    pub fn across_size(&self, s: Size) -> f32 {
        if self.orientation.is_vertical() {
            s.width
        } else {
            s.height
        }
    }

    /// Margin before each page on the stacking axis.
    #[must_use]
    pub fn along_margin(&self) -> f32 {
        self.along_size(self.margin)
    }

    /// Page index whose outer span contains the strip position `along`.
    /// Positions within the snap tolerance of a page boundary resolve to the
    /// later page.
    #[must_use]
    pub fn page_at_offset(&self, along: f32) -> i32 {
        let pitch = self.along_size(self.page_outer_size());
        if pitch <= 0.0 {
            return 0;
        }
        snap_floor(along / pitch)
    }

    /// Strip position of the first pixel of `page`'s outer span.
    #[must_use]
    pub fn offset_for_page(&self, page: usize) -> f32 {
        page as f32 * self.along_size(self.page_outer_size())
    }

    /// Total strip length of all scaled pages along the stacking axis.
    #[must_use]
    pub fn content_length(&self) -> f32 {
        self.page_count as f32 * self.along_size(self.scaled_page_size())
    }

    /// Page under the center of the viewport.
    #[must_use]
    pub fn current_page(&self) -> usize {
        if self.page_count == 0 {
            return 0;
        }
        let center = self.along(self.offset) + self.along_size(self.view_size) / 2.0;
        let page = self.page_at_offset(center.max(0.0)).max(0) as usize;
        page.min(self.page_count - 1)
    }

    /// True when every page fits inside the viewport at zoom 1.
    #[must_use]
    pub fn document_fits_view(&self) -> bool {
        self.page_count as f32 * self.along_size(self.optimal) < self.along_size(self.view_size)
    }

    /// Resize the viewport, refitting the optimal page size.
    pub fn set_view_size(&mut self, view_size: Size) {
        self.view_size = view_size;
        self.optimal = self.compute_optimal();
        self.update_margins();
        let offset = self.offset;
        self.move_to(offset.x, offset.y);
    }

    /// Replace the page count, e.g. after a user page table change.
    pub fn set_page_count(&mut self, page_count: usize) {
        self.page_count = page_count;
        self.update_margins();
    }

    /// Set offset, zoom and scroll direction exactly as supplied by the
    /// gesture layer. Zoom is still kept within bounds.
    pub fn set_state(&mut self, offset: Point, zoom: f32, direction: ScrollDirection) {
        self.zoom = self.clamp_zoom(zoom);
        self.update_margins();
        self.offset = offset;
        self.direction = direction;
    }

    /// Move to `x`,`y`, keeping the viewport inside the strip, and derive the
    /// scroll direction from the along-axis change.
    pub fn move_to(&mut self, x: f32, y: f32) {
        let (mut along, mut across) = if self.orientation.is_vertical() {
            (y, x)
        } else {
            (x, y)
        };

        let view_along = self.along_size(self.view_size);
        let view_across = self.across_size(self.view_size);
        let scaled = self.scaled_page_size();
        let page_along = self.along_size(scaled);
        let page_across = self.across_size(scaled);
        let content = self.content_length();

        across = if page_across < view_across {
            -(view_across - page_across) / 2.0
        } else {
            across.clamp(0.0, page_across - view_across)
        };

        along = if content < view_along {
            -(view_along - content) / 2.0
        } else if self.paging && self.is_zooming() {
            let page = self.current_page() as f32;
            let low = page * page_along;
            let high = (page + 1.0) * page_along - view_along;
            along.max(low).min(high)
        } else {
            along.clamp(0.0, content - view_along)
        };

        self.direction = ScrollDirection::between(self.along(self.offset), along);
        self.update_margins();
        self.offset = if self.orientation.is_vertical() {
            Point::new(across, along)
        } else {
            Point::new(along, across)
        };
    }

    /// Move relative to the current offset.
    pub fn move_relative(&mut self, dx: f32, dy: f32) {
        self.move_to(self.offset.x + dx, self.offset.y + dy);
    }

    /// Set the zoom factor without moving.
    pub fn zoom_to(&mut self, zoom: f32) {
        self.zoom = self.clamp_zoom(zoom);
        self.update_margins();
    }

    /// Zoom keeping the on-screen point `pivot` fixed.
    pub fn zoom_centered_to(&mut self, zoom: f32, pivot: Point) {
        let zoom = self.clamp_zoom(zoom);
        let dzoom = zoom / self.zoom;
        self.zoom_to(zoom);
        let x = (self.offset.x + pivot.x) * dzoom - pivot.x;
        let y = (self.offset.y + pivot.y) * dzoom - pivot.y;
        self.move_to(x, y);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom_to(self.min_zoom);
    }

    /// Center `page` in the viewport.
    pub fn jump_to(&mut self, page: usize) {
        let page = page.min(self.page_count.saturating_sub(1));
        let outer = self.along_size(self.page_outer_size());
        let along = page as f32 * outer + (outer - self.along_size(self.view_size)) / 2.0;
        if self.orientation.is_vertical() {
            self.move_to(self.offset.x, along);
        } else {
            self.move_to(along, self.offset.y);
        }
    }

    /// Scroll progress in `[0, 1]` along the strip.
    #[must_use]
    pub fn position_offset(&self) -> f32 {
        let scrollable = self.content_length() - self.along_size(self.view_size);
        if scrollable <= 0.0 {
            return 0.0;
        }
        (self.along(self.offset) / scrollable).clamp(0.0, 1.0)
    }

    /// Scroll to `progress` in `[0, 1]` along the strip.
    pub fn set_position_offset(&mut self, progress: f32) {
        let scrollable = self.content_length() - self.along_size(self.view_size);
        let along = scrollable.max(0.0) * progress.clamp(0.0, 1.0);
        if self.orientation.is_vertical() {
            self.move_to(self.offset.x, along);
        } else {
            self.move_to(along, self.offset.y);
        }
    }

    fn clamp_zoom(&self, zoom: f32) -> f32 {
        if !zoom.is_finite() {
            self.min_zoom
        } else {
            zoom.clamp(self.min_zoom, self.max_zoom)
        }
    }
}

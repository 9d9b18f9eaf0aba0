//! Page-relative geometry and rounding helpers

use std::hash::{Hash, Hasher};

/// Tolerance used when snapping a fractional page/row/column index to an
/// integer boundary.
pub const SNAP_EPSILON: f32 = 0.00001;

/// Floor `value`, unless it sits within [`SNAP_EPSILON`] below the next
/// integer, in which case that integer is returned.
///
/// Offsets that land exactly on a page edge drift by a few ulps after being
/// scaled by the zoom factor; without the snap, the previous page would be
/// picked on one frame and the next one on the following frame.
#[must_use]
pub fn snap_floor(value: f32) -> i32 {
    let ceil = value.ceil();
    if ceil - value < SNAP_EPSILON {
        ceil as i32
    } else {
        value.floor() as i32
    }
}

/// Ceiling that tolerates values a hair above an integer.
#[must_use]
pub fn snap_ceil(value: f32) -> i32 {
    let floor = value.floor();
    if value - floor < SNAP_EPSILON {
        floor as i32
    } else {
        value.ceil() as i32
    }
}

/// A 2D point or offset in strip coordinates (device pixels).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Width and height in device pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }
}

/// Rectangle in page-fraction coordinates, inside `[0,1]x[0,1]`.
///
/// Equality and hashing compare the raw float bits so the type can be part of
/// a cache key. Values are produced by the same arithmetic on every pass, so
/// bit equality is the identity the planner needs.
#[derive(Clone, Copy, Debug)]
pub struct RelRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RelRect {
    /// The whole page.
    pub const FULL: Self = Self {
        left: 0.0,
        top: 0.0,
        right: 1.0,
        bottom: 1.0,
    };

    #[must_use]
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// True when the rectangle lies inside the unit square.
    #[must_use]
    pub fn is_within_page(&self) -> bool {
        self.left >= 0.0
            && self.top >= 0.0
            && self.right <= 1.0
            && self.bottom <= 1.0
            && self.left <= self.right
            && self.top <= self.bottom
    }

    fn bits(&self) -> [u32; 4] {
        [
            self.left.to_bits(),
            self.top.to_bits(),
            self.right.to_bits(),
            self.bottom.to_bits(),
        ]
    }
}

impl PartialEq for RelRect {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for RelRect {}

impl Hash for RelRect {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// Where the whole page lands inside a destination raster.
///
/// Rendering a tile means drawing the page scaled to `width`x`height` with
/// its origin at (`x`, `y`), clipped to the raster bounds. Offsets are
/// usually negative: the tile's top-left corner sits somewhere inside the
/// page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PagePlacement {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PagePlacement {
    /// Affine mapping of the page into a `dest_width`x`dest_height` raster
    /// such that `region` fills the raster exactly.
    #[must_use]
    pub fn for_region(region: &RelRect, dest_width: u32, dest_height: u32) -> Option<Self> {
        if region.is_empty() || dest_width == 0 || dest_height == 0 {
            return None;
        }

        let scale_x = 1.0 / region.width();
        let scale_y = 1.0 / region.height();
        let w = dest_width as f32;
        let h = dest_height as f32;

        let left = -region.left * w * scale_x;
        let top = -region.top * h * scale_y;
        let right = left + w * scale_x;
        let bottom = top + h * scale_y;

        let x = left.round() as i32;
        let y = top.round() as i32;
        Some(Self {
            x,
            y,
            width: right.round() as i32 - x,
            height: bottom.round() as i32 - y,
        })
    }

    /// Horizontal scale from page units to raster pixels.
    #[must_use]
    pub fn scale_x(&self, page_width: f32) -> f32 {
        self.width as f32 / page_width
    }

    /// Vertical scale from page units to raster pixels.
    #[must_use]
    pub fn scale_y(&self, page_height: f32) -> f32 {
        self.height as f32 / page_height
    }
}

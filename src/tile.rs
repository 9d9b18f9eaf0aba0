//! Rendered tiles and their identity

use crate::geometry::RelRect;
use crate::raster::Raster;

/// Identity of a tile for lookup and deduplication.
///
/// Two tiles with equal keys are interchangeable: the cache never holds both.
/// Priority order and pixels are deliberately not part of the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Index in the user-visible page sequence
    pub logical_page: usize,
    /// Index into the underlying document
    pub document_page: usize,
    /// Destination raster width
    pub pixel_width: u32,
    /// Destination raster height
    pub pixel_height: u32,
    /// Page fraction covered by the tile
    pub bounds: RelRect,
    pub thumbnail: bool,
}

impl TileKey {
    /// Key for a full-resolution tile. Sizes are rounded to whole pixels.
    #[must_use]
    pub fn part(
        logical_page: usize,
        document_page: usize,
        width: f32,
        height: f32,
        bounds: RelRect,
    ) -> Self {
        Self {
            logical_page,
            document_page,
            pixel_width: width.round() as u32,
            pixel_height: height.round() as u32,
            bounds,
            thumbnail: false,
        }
    }

    /// Key for a whole-page thumbnail.
    #[must_use]
    pub fn thumbnail(logical_page: usize, document_page: usize, width: u32, height: u32) -> Self {
        Self {
            logical_page,
            document_page,
            pixel_width: width,
            pixel_height: height,
            bounds: RelRect::FULL,
            thumbnail: true,
        }
    }

    /// Zero-area keys are never requested or stored.
    #[must_use]
    pub fn has_area(&self) -> bool {
        self.pixel_width > 0 && self.pixel_height > 0 && !self.bounds.is_empty()
    }
}

/// A rendered raster fragment covering one rectangle of one page.
pub struct Tile {
    key: TileKey,
    raster: Raster,
}

impl Tile {
    #[must_use]
    pub fn new(key: TileKey, raster: Raster) -> Self {
        Self { key, raster }
    }

    #[must_use]
    pub fn key(&self) -> &TileKey {
        &self.key
    }

    #[must_use]
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    #[must_use]
    pub fn is_thumbnail(&self) -> bool {
        self.key.thumbnail
    }

    #[must_use]
    pub fn logical_page(&self) -> usize {
        self.key.logical_page
    }

    #[must_use]
    pub fn byte_size(&self) -> usize {
        self.raster.byte_size()
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("key", &self.key)
            .field("raster", &self.raster)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_key_rounds_sizes() {
        let key = TileKey::part(3, 1, 255.6, 128.2, RelRect::new(0.0, 0.0, 0.5, 0.25));
        assert_eq!(key.pixel_width, 256);
        assert_eq!(key.pixel_height, 128);
        assert!(!key.thumbnail);
        assert!(key.has_area());
    }

    #[test]
    fn thumbnail_and_part_with_same_geometry_differ() {
        let thumb = TileKey::thumbnail(0, 0, 100, 100);
        let part = TileKey::part(0, 0, 100.0, 100.0, RelRect::FULL);
        assert_ne!(thumb, part);
    }

    #[test]
    fn zero_area_key_has_no_area() {
        let key = TileKey::part(0, 0, 0.4, 10.0, RelRect::FULL);
        assert!(!key.has_area());
    }
}

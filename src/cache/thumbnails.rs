//! First-in first-out thumbnail store

use std::collections::VecDeque;
use std::sync::Arc;

use crate::tile::{Tile, TileKey};

/// Thumbnails of one cache instance in insertion order.
///
/// Sequence numbers come from the shared registry, so the oldest thumbnail
/// can be found across instances.
#[derive(Default)]
pub(crate) struct ThumbnailStore {
    entries: VecDeque<(u64, Arc<Tile>)>,
}

impl ThumbnailStore {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.entries.iter().any(|(_, tile)| tile.key() == key)
    }

    /// Swap the pixels of an already stored thumbnail, keeping its age.
    pub fn replace(&mut self, tile: Arc<Tile>) -> Option<Arc<Tile>> {
        let slot = self
            .entries
            .iter_mut()
            .find(|(_, stored)| stored.key() == tile.key())?;
        Some(std::mem::replace(&mut slot.1, tile))
    }

    pub fn push(&mut self, seq: u64, tile: Arc<Tile>) {
        self.entries.push_back((seq, tile));
    }

    pub fn oldest_seq(&self) -> Option<u64> {
        self.entries.front().map(|&(seq, _)| seq)
    }

    pub fn pop_oldest(&mut self) -> Option<Arc<Tile>> {
        self.entries.pop_front().map(|(_, tile)| tile)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Arc<Tile>> {
        self.entries.iter().map(|(_, tile)| tile)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::{PixelFormat, Raster};

    fn thumb(page: usize) -> Arc<Tile> {
        let raster = Raster::allocate(2, 2, PixelFormat::Rgb565).unwrap();
        Arc::new(Tile::new(TileKey::thumbnail(page, page, 2, 2), raster))
    }

    #[test]
    fn fifo_order() {
        let mut store = ThumbnailStore::default();
        store.push(4, thumb(0));
        store.push(7, thumb(1));
        assert_eq!(store.oldest_seq(), Some(4));
        assert_eq!(store.pop_oldest().unwrap().logical_page(), 0);
        assert_eq!(store.oldest_seq(), Some(7));
    }

    #[test]
    fn replace_keeps_position() {
        let mut store = ThumbnailStore::default();
        store.push(1, thumb(0));
        store.push(2, thumb(1));
        assert!(store.replace(thumb(0)).is_some());
        assert!(store.replace(thumb(5)).is_none());
        assert_eq!(store.len(), 2);
        assert_eq!(store.oldest_seq(), Some(1));
        assert!(store.contains(thumb(1).key()));
    }
}

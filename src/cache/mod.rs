//! Bounded, priority-ordered tile cache
//!
//! Full-resolution tiles live in two tiers: *active* holds tiles of the
//! current pass, *passive* holds survivors of earlier passes. Thumbnails are
//! kept apart in a small FIFO store. Both budgets are shared by every cache
//! created from the same [`CacheRegistry`].
//!
//! Locking: the registry lock is taken first and held for a whole insertion;
//! instance locks are then taken one at a time and never while another
//! instance lock is held.

mod registry;
mod thumbnails;
mod tier;

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

pub use self::registry::CacheRegistry;
use self::thumbnails::ThumbnailStore;
use self::tier::Tiers;
use crate::tile::{Tile, TileKey};

/// Per-instance state reachable from the registry.
pub(crate) struct CacheShared {
    id: u64,
    tiers: Mutex<Tiers>,
    thumbnails: Mutex<ThumbnailStore>,
}

impl CacheShared {
    fn tiers(&self) -> MutexGuard<'_, Tiers> {
        self.tiers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn thumbnails(&self) -> MutexGuard<'_, ThumbnailStore> {
        self.thumbnails
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn tile_count(&self) -> usize {
        self.tiers().len()
    }

    pub(crate) fn thumbnail_count(&self) -> usize {
        self.thumbnails().len()
    }
}

/// A cached tile with its current priority order.
#[derive(Clone, Debug)]
pub struct CachedTile {
    pub priority_order: u64,
    pub tile: Arc<Tile>,
}

/// Tile counts of one cache instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheOccupancy {
    pub active: usize,
    pub passive: usize,
    pub thumbnails: usize,
}

/// Tile cache of one document view.
pub struct TileCache {
    shared: Arc<CacheShared>,
    registry: CacheRegistry,
    capacity: usize,
    thumbnail_capacity: usize,
}

impl TileCache {
    /// Create a cache and register it for shared budgeting.
    ///
    /// `capacity` bounds full-resolution tiles and `thumbnail_capacity`
    /// bounds thumbnails, both summed over every live cache of `registry`.
    #[must_use]
    pub fn new(registry: &CacheRegistry, capacity: usize, thumbnail_capacity: usize) -> Self {
        let shared = Arc::new(CacheShared {
            id: registry.next_id(),
            tiers: Mutex::new(Tiers::default()),
            thumbnails: Mutex::new(ThumbnailStore::default()),
        });
        registry.register(&shared);
        debug!(
            "Tile cache {} created (tiles {capacity}, thumbnails {thumbnail_capacity})",
            shared.id
        );
        Self {
            shared,
            registry: registry.clone(),
            capacity: capacity.max(1),
            thumbnail_capacity: thumbnail_capacity.max(1),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn thumbnail_capacity(&self) -> usize {
        self.thumbnail_capacity
    }

    #[must_use]
    pub fn registry(&self) -> &CacheRegistry {
        &self.registry
    }

    /// Store a full-resolution tile in the active tier with `order`,
    /// evicting lowest-ranked tiles first so the shared budget holds.
    pub fn insert_tile(&self, tile: Arc<Tile>, order: u64) {
        let scan = self.registry.scan();
        let key = *tile.key();

        {
            let mut own = self.shared.tiers();
            if own.passive.contains(&key) || own.active.contains(&key) {
                own.passive.remove(&key);
                let rank = own.next_rank(order);
                own.active.insert(rank, tile);
                return;
            }
        }

        let others: Vec<_> = scan
            .members
            .iter()
            .filter(|m| m.id != self.shared.id)
            .collect();

        loop {
            let total: usize = scan.members.iter().map(|m| m.tile_count()).sum();
            if total < self.capacity {
                break;
            }
            if !self.evict_one(&others) {
                break;
            }
        }

        let mut own = self.shared.tiers();
        let rank = own.next_rank(order);
        own.active.insert(rank, tile);
    }

    /// Evict one tile: other caches' passive tiers (globally lowest rank),
    /// then this cache's passive and active tiers, then other caches'
    /// active tiers.
    fn evict_one(&self, others: &[&Arc<CacheShared>]) -> bool {
        if let Some(victim) = lowest_among(others, |t| t.passive.lowest_rank()) {
            if victim.tiers().passive.pop_lowest().is_some() {
                debug!("Evicted passive tile of cache {}", victim.id);
                return true;
            }
        }

        if self.shared.tiers().pop_victim().is_some() {
            return true;
        }

        if let Some(victim) = lowest_among(others, Tiers::lowest_active_rank) {
            if victim.tiers().active.pop_lowest().is_some() {
                debug!("Evicted active tile of cache {}", victim.id);
                return true;
            }
        }
        false
    }

    /// Merge the active tier into the passive one, ranking it above every
    /// tile already passive.
    pub fn begin_new_pass(&self) {
        self.shared.tiers().begin_new_pass();
    }

    /// If a tile with `key` is cached, keep it for the current pass.
    ///
    /// A passive hit moves the tile to the active tier under `new_order`; an
    /// active hit is left as is. Returns whether the tile was found.
    pub fn promote_if_present(&self, key: &TileKey, new_order: u64) -> bool {
        let mut tiers = self.shared.tiers();
        if let Some((_, tile)) = tiers.passive.remove(key) {
            let rank = tiers.next_rank(new_order);
            tiers.active.insert(rank, tile);
            return true;
        }
        tiers.active.contains(key)
    }

    #[must_use]
    pub fn contains(&self, key: &TileKey) -> bool {
        let tiers = self.shared.tiers();
        tiers.active.contains(key) || tiers.passive.contains(key)
    }

    /// Priority order of a cached tile, if present.
    #[must_use]
    pub fn order_of(&self, key: &TileKey) -> Option<u64> {
        self.shared.tiers().order_of(key)
    }

    /// Store a thumbnail, evicting the oldest thumbnails (other caches'
    /// first) so the shared thumbnail budget holds.
    pub fn insert_thumbnail(&self, tile: Arc<Tile>) {
        let scan = self.registry.scan();

        {
            let mut own = self.shared.thumbnails();
            if own.contains(tile.key()) {
                own.replace(tile);
                return;
            }
        }

        loop {
            let total: usize = scan.members.iter().map(|m| m.thumbnail_count()).sum();
            if total < self.thumbnail_capacity {
                break;
            }

            let oldest_other = scan
                .members
                .iter()
                .filter(|m| m.id != self.shared.id)
                .filter_map(|m| m.thumbnails().oldest_seq().map(|seq| (seq, m)))
                .min_by_key(|&(seq, _)| seq);

            let evicted = match oldest_other {
                Some((_, victim)) => victim.thumbnails().pop_oldest(),
                None => self.shared.thumbnails().pop_oldest(),
            };
            if evicted.is_none() {
                break;
            }
        }

        let seq = self.registry.next_thumbnail_seq();
        self.shared.thumbnails().push(seq, tile);
    }

    #[must_use]
    pub fn contains_thumbnail(&self, key: &TileKey) -> bool {
        self.shared.thumbnails().contains(key)
    }

    /// Full-resolution tiles to draw: passive tier then active tier, each
    /// from lowest to highest order, so later entries draw on top.
    #[must_use]
    pub fn tiles_snapshot(&self) -> Vec<CachedTile> {
        let tiers = self.shared.tiers();
        tiers
            .ordered()
            .map(|(priority_order, tile)| CachedTile {
                priority_order,
                tile: Arc::clone(tile),
            })
            .collect()
    }

    /// Thumbnails, oldest first.
    #[must_use]
    pub fn thumbnails_snapshot(&self) -> Vec<Arc<Tile>> {
        self.shared.thumbnails().tiles().cloned().collect()
    }

    #[must_use]
    pub fn occupancy(&self) -> CacheOccupancy {
        let (active, passive) = {
            let tiers = self.shared.tiers();
            (tiers.active.len(), tiers.passive.len())
        };
        CacheOccupancy {
            active,
            passive,
            thumbnails: self.shared.thumbnail_count(),
        }
    }

    /// Drop every tile and thumbnail. Rasters are released once no snapshot
    /// still holds them.
    pub fn recycle(&self) {
        self.shared.tiers().clear();
        self.shared.thumbnails().clear();
        debug!("Tile cache {} recycled", self.shared.id);
    }
}

fn lowest_among<'a>(
    caches: &[&'a Arc<CacheShared>],
    rank: impl Fn(&Tiers) -> Option<(u64, u64)>,
) -> Option<&'a Arc<CacheShared>> {
    caches
        .iter()
        .filter_map(|&cache| rank(&cache.tiers()).map(|r| ((r, cache.id), cache)))
        .min_by_key(|&(r, _)| r)
        .map(|(_, cache)| cache)
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("id", &self.shared.id)
            .field("capacity", &self.capacity)
            .field("thumbnail_capacity", &self.thumbnail_capacity)
            .field("occupancy", &self.occupancy())
            .finish()
    }
}

//! Priority-ordered tile tiers

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::tile::{Tile, TileKey};

/// Eviction rank: priority order first, insertion sequence second.
pub(crate) type Rank = (u64, u64);

struct Entry {
    rank: Rank,
    tile: Arc<Tile>,
}

/// Tiles indexed both by identity and by rank.
#[derive(Default)]
pub(crate) struct Tier {
    by_rank: BTreeMap<Rank, TileKey>,
    entries: HashMap<TileKey, Entry>,
}

impl Tier {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert under `rank`, replacing any tile with the same identity.
    pub fn insert(&mut self, rank: Rank, tile: Arc<Tile>) -> Option<Arc<Tile>> {
        let key = *tile.key();
        let replaced = self.remove(&key);
        self.by_rank.insert(rank, key);
        self.entries.insert(key, Entry { rank, tile });
        replaced.map(|(_, tile)| tile)
    }

    pub fn remove(&mut self, key: &TileKey) -> Option<(Rank, Arc<Tile>)> {
        let entry = self.entries.remove(key)?;
        self.by_rank.remove(&entry.rank);
        Some((entry.rank, entry.tile))
    }

    pub fn lowest_rank(&self) -> Option<Rank> {
        self.by_rank.keys().next().copied()
    }

    pub fn highest_order(&self) -> Option<u64> {
        self.by_rank.keys().next_back().map(|&(order, _)| order)
    }

    pub fn pop_lowest(&mut self) -> Option<(Rank, Arc<Tile>)> {
        let (_, key) = self.by_rank.pop_first()?;
        self.entries
            .remove(&key)
            .map(|entry| (entry.rank, entry.tile))
    }

    /// Shift every order up by `delta`.
    pub fn rebase(&mut self, delta: u64) {
        if delta == 0 {
            return;
        }
        let shifted = std::mem::take(&mut self.by_rank)
            .into_iter()
            .map(|((order, seq), key)| ((order.saturating_add(delta), seq), key))
            .collect();
        self.by_rank = shifted;
        for entry in self.entries.values_mut() {
            entry.rank.0 = entry.rank.0.saturating_add(delta);
        }
    }

    /// Move every tile of `other` into `self`, leaving `other` empty.
    pub fn append(&mut self, other: &mut Tier) {
        for (key, entry) in other.entries.drain() {
            if let Some(old) = self.entries.remove(&key) {
                self.by_rank.remove(&old.rank);
            }
            self.by_rank.insert(entry.rank, key);
            self.entries.insert(key, entry);
        }
        other.by_rank.clear();
    }

    /// Tiles with their priority order, lowest first.
    pub fn ordered(&self) -> impl Iterator<Item = (u64, &Arc<Tile>)> {
        self.by_rank.iter().filter_map(|(&(order, _), key)| {
            self.entries.get(key).map(|entry| (order, &entry.tile))
        })
    }

    pub fn order_of(&self, key: &TileKey) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.rank.0)
    }

    pub fn clear(&mut self) {
        self.by_rank.clear();
        self.entries.clear();
    }
}

/// The two tiers of one cache instance.
///
/// Active tiles are stored under their pass-local order and reported above
/// `base`, the highest passive order when the pass began, so a tile of the
/// current pass always outranks every older tile.
#[derive(Default)]
pub(crate) struct Tiers {
    pub active: Tier,
    pub passive: Tier,
    base: u64,
    next_seq: u64,
}

impl Tiers {
    pub fn len(&self) -> usize {
        self.active.len() + self.passive.len()
    }

    pub fn next_rank(&mut self, order: u64) -> Rank {
        self.next_seq += 1;
        (order, self.next_seq)
    }

    /// Order a pass-local `order` is reported under.
    pub fn active_order(&self, order: u64) -> u64 {
        self.base.saturating_add(order)
    }

    /// Reported priority order of a cached tile.
    pub fn order_of(&self, key: &TileKey) -> Option<u64> {
        self.active
            .order_of(key)
            .map(|order| self.active_order(order))
            .or_else(|| self.passive.order_of(key))
    }

    /// Lowest active rank, in reported orders.
    pub fn lowest_active_rank(&self) -> Option<Rank> {
        self.active
            .lowest_rank()
            .map(|(order, seq)| (self.active_order(order), seq))
    }

    /// Passive tiles then active tiles, each lowest first, with reported orders.
    pub fn ordered(&self) -> impl Iterator<Item = (u64, &Arc<Tile>)> {
        let base = self.base;
        self.passive.ordered().chain(
            self.active
                .ordered()
                .map(move |(order, tile)| (base.saturating_add(order), tile)),
        )
    }

    /// Merge active into passive, ranking it above everything already there.
    pub fn begin_new_pass(&mut self) {
        let shift = self.base.max(self.passive.highest_order().unwrap_or(0));
        self.active.rebase(shift);
        self.passive.append(&mut self.active);
        self.base = shift.max(self.passive.highest_order().unwrap_or(0));
    }

    /// Lowest-ranked tile, passive tier before active.
    pub fn pop_victim(&mut self) -> Option<Arc<Tile>> {
        self.passive
            .pop_lowest()
            .or_else(|| self.active.pop_lowest())
            .map(|(_, tile)| tile)
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.passive.clear();
        self.base = 0;
    }
}

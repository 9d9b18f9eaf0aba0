//! Process-wide registry of live tile caches
//!
//! Caches register a weak handle on creation. A cache whose owner is gone no
//! longer counts towards or competes for the shared budget; dead handles are
//! pruned on every scan.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use super::CacheShared;

#[derive(Default)]
struct RegistryInner {
    members: Mutex<Vec<Weak<CacheShared>>>,
    next_id: AtomicU64,
    thumbnail_seq: AtomicU64,
}

/// Shared-budget bookkeeping handle. Clones refer to the same registry.
///
/// Every [`TileCache`](super::TileCache) built from the same registry shares
/// its tile and thumbnail budgets with the others.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    inner: Arc<RegistryInner>,
}

/// Live members of the registry, held under the registry lock.
pub(crate) struct Scan<'a> {
    _guard: MutexGuard<'a, Vec<Weak<CacheShared>>>,
    pub members: Vec<Arc<CacheShared>>,
}

impl CacheRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_thumbnail_seq(&self) -> u64 {
        self.inner.thumbnail_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, cache: &Arc<CacheShared>) {
        let mut members = self.lock();
        members.retain(|m| m.strong_count() > 0);
        members.push(Arc::downgrade(cache));
    }

    /// Prune dead members and return the live ones. The registry stays
    /// locked until the scan is dropped.
    pub(crate) fn scan(&self) -> Scan<'_> {
        let mut guard = self.lock();
        guard.retain(|m| m.strong_count() > 0);
        let members = guard.iter().filter_map(Weak::upgrade).collect();
        Scan {
            _guard: guard,
            members,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Weak<CacheShared>>> {
        self.inner
            .members
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Number of caches still alive.
    #[must_use]
    pub fn live_caches(&self) -> usize {
        self.scan().members.len()
    }

    /// Full-resolution tiles held by all live caches.
    #[must_use]
    pub fn total_tiles(&self) -> usize {
        self.scan().members.iter().map(|m| m.tile_count()).sum()
    }

    /// Thumbnails held by all live caches.
    #[must_use]
    pub fn total_thumbnails(&self) -> usize {
        self.scan()
            .members
            .iter()
            .map(|m| m.thumbnail_count())
            .sum()
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("live_caches", &self.live_caches())
            .finish()
    }
}

//! Content-addressed artifact cache.
//!
//! # Architecture
//!
//! - **Content-addressed**: keys are chunk content hashes, so a key never
//!   maps to two different artifacts and nothing needs invalidating
//! - **Single-flight**: concurrent requests for one hash share one build
//!   (a `tokio::sync::OnceCell` per hash)
//! - **Two levels**: an in-memory map in front of an optional redb database
//!   at `<dir>/cache.redb`
//! - **Generational GC**: every build starts a generation; entries no live
//!   chunk references are dropped once idle for `max_idle_generations`

pub mod serialize;
mod storage;

pub use serialize::{CACHE_FORMAT_VERSION, CacheEntry, CacheMetadata};
pub use storage::{CacheError, PersistentStore};

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use kiln_graph::ContentHash;
use rustc_hash::{FxBuildHasher, FxHashSet};
use tokio::sync::OnceCell;

use crate::error::BuildError;

/// Default for [`CacheStore::max_idle_generations`].
pub const DEFAULT_MAX_IDLE_GENERATIONS: u64 = 5;

type Slot = Arc<OnceCell<Arc<CacheEntry>>>;

/// Counters since the store was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_hits: usize,
    pub persistent_hits: usize,
    /// Times a build function actually ran.
    pub builds: usize,
}

#[derive(Debug)]
pub struct CacheStore {
    memory: DashMap<ContentHash, Slot, FxBuildHasher>,
    persistent: Option<PersistentStore>,
    /// Generation each entry was last used in.
    usage: DashMap<ContentHash, u64, FxBuildHasher>,
    generation: AtomicU64,
    max_idle_generations: u64,
    memory_hits: AtomicUsize,
    persistent_hits: AtomicUsize,
    builds: AtomicUsize,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CacheStore {
    /// A store without a persistent layer.
    pub fn in_memory() -> Self {
        Self::with_persistent(None, 0)
    }

    /// A store backed by `<dir>/cache.redb`. The build generation continues
    /// from the one persisted there.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        let persistent = PersistentStore::open(dir)?;
        let generation = persistent.generation()?;
        tracing::debug!(dir = %dir.display(), generation, "opened persistent cache");
        Ok(Self::with_persistent(Some(persistent), generation))
    }

    fn with_persistent(persistent: Option<PersistentStore>, generation: u64) -> Self {
        Self {
            memory: DashMap::default(),
            persistent,
            usage: DashMap::default(),
            generation: AtomicU64::new(generation),
            max_idle_generations: DEFAULT_MAX_IDLE_GENERATIONS,
            memory_hits: AtomicUsize::new(0),
            persistent_hits: AtomicUsize::new(0),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn max_idle_generations(mut self, generations: u64) -> Self {
        self.max_idle_generations = generations;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a new build generation and persist the counter.
    pub fn begin_generation(&self) -> Result<u64, CacheError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(store) = &self.persistent {
            store.set_generation(generation)?;
        }
        Ok(generation)
    }

    /// The artifact for `hash`, built by `build` on a miss.
    ///
    /// A memory hit returns without calling `build`; a persistent hit is
    /// promoted into memory. Concurrent callers for the same hash share a
    /// single call of `build`. A failed build is not stored: the error goes
    /// to the caller whose `build` ran, and callers still waiting retry with
    /// their own.
    pub async fn get_or_build<F, Fut>(
        &self,
        hash: ContentHash,
        build: F,
    ) -> Result<Arc<CacheEntry>, BuildError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry, BuildError>>,
    {
        // The map guard is released before awaiting.
        let slot = self.memory.entry(hash).or_default().clone();

        if let Some(entry) = slot.get() {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            self.touch(&hash);
            return Ok(entry.clone());
        }

        let mut initialized_here = false;
        let flag = &mut initialized_here;
        let entry = slot
            .get_or_try_init(|| async move {
                *flag = true;
                if let Some(entry) = self.load_persistent(&hash) {
                    self.persistent_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Arc::new(entry));
                }

                self.builds.fetch_add(1, Ordering::Relaxed);
                let entry = build().await?;
                self.store_persistent(&hash, &entry);
                Ok::<_, BuildError>(Arc::new(entry))
            })
            .await?
            .clone();

        if !initialized_here {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
        }
        self.touch(&hash);
        Ok(entry)
    }

    /// Memory-level lookup.
    pub fn get(&self, hash: &ContentHash) -> Option<Arc<CacheEntry>> {
        self.memory
            .get(hash)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.get(hash).is_some()
    }

    /// Mark `hash` as used in the current generation.
    pub fn touch(&self, hash: &ContentHash) {
        self.usage.insert(*hash, self.generation());
    }

    /// Evict entries that are not in `live` and were last used more than
    /// `max_idle_generations` generations ago. Returns how many distinct
    /// entries were dropped from either level.
    pub fn collect_garbage(&self, live: &FxHashSet<ContentHash>) -> Result<usize, CacheError> {
        let generation = self.generation();
        for hash in live {
            self.touch(hash);
        }

        let idle = |hash: &ContentHash| {
            !live.contains(hash)
                && self
                    .usage
                    .get(hash)
                    .is_none_or(|last| generation.saturating_sub(*last) > self.max_idle_generations)
        };

        let mut evicted: FxHashSet<ContentHash> = self
            .memory
            .iter()
            .filter(|slot| slot.value().initialized() && idle(slot.key()))
            .map(|slot| *slot.key())
            .collect();
        for hash in &evicted {
            self.memory.remove(hash);
            self.usage.remove(hash);
        }

        if let Some(store) = &self.persistent {
            let live_hex: FxHashSet<String> = live.iter().map(ContentHash::to_hex).collect();
            store.record_usage(live_hex.iter().map(|hex| (hex.as_str(), generation)))?;
            let removed = store.evict_idle(generation, self.max_idle_generations, &|hex| {
                live_hex.contains(hex)
            })?;
            evicted.extend(removed.iter().filter_map(|hex| ContentHash::from_hex(hex)));
        }

        if !evicted.is_empty() {
            tracing::debug!(generation, evicted = evicted.len(), "cache garbage collected");
        }
        Ok(evicted.len())
    }

    /// Number of built entries held in memory.
    pub fn len(&self) -> usize {
        self.memory
            .iter()
            .filter(|slot| slot.value().initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            persistent_hits: self.persistent_hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
        }
    }

    fn load_persistent(&self, hash: &ContentHash) -> Option<CacheEntry> {
        let store = self.persistent.as_ref()?;
        match store.get(&hash.to_hex()) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(hash = %hash.short(12), error = %err, "ignoring unreadable cache entry");
                None
            }
        }
    }

    fn store_persistent(&self, hash: &ContentHash, entry: &CacheEntry) {
        if let Some(store) = &self.persistent {
            if let Err(err) = store.put(&hash.to_hex(), entry, self.generation()) {
                tracing::warn!(hash = %hash.short(12), error = %err, "failed to persist cache entry");
            }
        }
    }
}

//! Bounded evaluation cache.
//!
//! Keyed by the 64-bit position fingerprint (stones, side to move, ko and
//! komi). The map is split into shards with independent locks so an insert
//! on one shard never stalls probes of other keys; within a shard, eviction
//! is approximate LRU over a sampled handful of entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use engine_core::GameState;

use crate::evaluator::{Ensemble, Evaluator, EvaluatorError, NetResult};

const SHARD_COUNT: usize = 16;
const EVICTION_SAMPLE: usize = 8;

struct Entry {
    result: NetResult,
    stamp: u64,
}

#[derive(Default)]
struct Shard {
    map: HashMap<u64, Entry>,
}

/// Sharded, bounded cache of evaluator outputs.
pub struct EvalCache {
    shards: Vec<Mutex<Shard>>,
    /// Entry budget per shard, derived from the byte budget.
    per_shard_capacity: AtomicUsize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EvalCache {
    /// Cache bounded by `bytes`, assuming entries for `num_intersections`
    /// sized boards.
    pub fn new(bytes: usize, num_intersections: usize) -> Self {
        let cache = Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(Shard::default())).collect(),
            per_shard_capacity: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };
        cache.set_capacity_bytes(bytes, num_intersections);
        cache
    }

    /// Resize the budget. Shards shrink lazily on their next insert.
    pub fn set_capacity_bytes(&self, bytes: usize, num_intersections: usize) {
        let entry_bytes = std::mem::size_of::<Entry>()
            + 2 * num_intersections * std::mem::size_of::<f32>()
            + std::mem::size_of::<u64>();
        let entries = (bytes / entry_bytes).max(SHARD_COUNT);
        self.per_shard_capacity
            .store(entries / SHARD_COUNT, Ordering::Relaxed);
    }

    #[inline]
    fn shard_of(&self, key: u64) -> &Mutex<Shard> {
        &self.shards[(key as usize) % SHARD_COUNT]
    }

    pub fn probe(&self, key: u64) -> Option<NetResult> {
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed);
        let mut shard = self
            .shard_of(key)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(entry) = shard.map.get_mut(&key) {
            entry.stamp = stamp;
            self.hits.fetch_add(1, Ordering::Relaxed);
            Some(entry.result.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn insert(&self, key: u64, result: NetResult) {
        let capacity = self.per_shard_capacity.load(Ordering::Relaxed);
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed);
        let mut shard = self
            .shard_of(key)
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while shard.map.len() >= capacity && !shard.map.contains_key(&key) {
            // Approximate LRU: evict the oldest of a small sample.
            let victim = shard
                .map
                .iter()
                .take(EVICTION_SAMPLE)
                .min_by_key(|(_, e)| e.stamp)
                .map(|(&k, _)| k);
            match victim {
                Some(k) => {
                    shard.map.remove(&k);
                }
                None => break,
            }
        }
        shard.map.insert(key, Entry { result, stamp });
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .map
                .clear();
        }
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| {
                s.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .map
                    .len()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since the last clear.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

/// An evaluator wrapped with the cache. A hit returns the stored result
/// byte-for-byte; a miss consults the inner evaluator and stores its output.
pub struct CachedEvaluator<E> {
    inner: E,
    cache: EvalCache,
}

impl<E> CachedEvaluator<E> {
    pub fn new(inner: E, cache_bytes: usize, num_intersections: usize) -> Self {
        Self {
            inner,
            cache: EvalCache::new(cache_bytes, num_intersections),
        }
    }

    pub fn cache(&self) -> &EvalCache {
        &self.cache
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<S: GameState, E: Evaluator<S>> Evaluator<S> for CachedEvaluator<E> {
    fn evaluate(
        &self,
        state: &S,
        ensemble: Ensemble,
        temperature: f32,
    ) -> Result<NetResult, EvaluatorError> {
        let key = state.hash();
        if let Some(result) = self.cache.probe(key) {
            return Ok(result);
        }
        let result = self.inner.evaluate(state, ensemble, temperature)?;
        self.cache.insert(key, result.clone());
        Ok(result)
    }
}

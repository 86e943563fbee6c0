//  Copyright 2025 rezex authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! The Pattern Cache (PC, spec.md §4.2/§4.3). Sharded index of compiled
//! patterns with single-flight compilation on miss, LRU-by-shard capacity
//! eviction, and TTL sweeps. Disposal of an evicted PR is never performed
//! synchronously from `get_or_compile`/`release`; it happens only inside
//! `reclaim`, which the reclamation worker drives on a timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashMap;
use itertools::Itertools;
use parking_lot::Mutex;
use rezex_common::metrics::{EvictionReason, PatternCacheMetrics, PatternCacheMetricsSnapshot};
use rezex_common::options::{pattern_key, PatternOptions};
use rezex_common::{EngineError, RezexError};

use crate::config::CacheConfig;
use crate::deferred::DeferredQueue;
use crate::record::{PatternHandle, PatternRecordInner};

/// One compilation in flight per key, fanning its result out to every
/// follower that asked for the same `(source, options)` while the leader
/// was still compiling. `get_or_compile` is synchronous end to end (the
/// engine never hops onto tokio), so the fan-out channel is a blocking
/// `std::sync::mpsc`, not a `oneshot`.
type Waiters = HashMap<u64, Vec<mpsc::Sender<Result<Arc<PatternRecordInner>, RezexError>>>, ahash::RandomState>;

struct CacheShard {
    index: HashMap<u64, Arc<PatternRecordInner>, ahash::RandomState>,
    waiters: Waiters,
}

impl Default for CacheShard {
    fn default() -> Self {
        Self {
            index: HashMap::with_hasher(ahash::RandomState::default()),
            waiters: HashMap::with_hasher(ahash::RandomState::default()),
        }
    }
}

/// Victim collected by a `reclaim` sweep, carried outside the shard lock
/// before disposal so the lock is never held across a possible
/// `DeferredQueue::add` call or an `Arc` drop that runs a destructor.
struct Victim {
    pr: Arc<PatternRecordInner>,
    reason: EvictionReason,
}

pub struct PatternCache {
    shards: Vec<Mutex<CacheShard>>,
    config: CacheConfig,
    current_bytes: AtomicU64,
    metrics: PatternCacheMetrics,
}

impl PatternCache {
    pub fn new(config: CacheConfig) -> Self {
        let shard_count = config.shards.max(1);
        Self {
            shards: (0..shard_count).map(|_| Mutex::new(CacheShard::default())).collect(),
            config,
            current_bytes: AtomicU64::new(0),
            metrics: PatternCacheMetrics::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PatternCacheMetrics {
        &self.metrics
    }

    pub fn snapshot(&self) -> PatternCacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn current_bytes(&self) -> u64 {
        self.current_bytes.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> usize {
        self.shards.iter().map(|s| s.lock().index.len()).sum()
    }

    fn shard_for(&self, key: u64) -> &Mutex<CacheShard> {
        let idx = (key as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Resolves `(source, options)` to a live `PatternHandle`, compiling
    /// on miss. When `cache_enabled` is false every call compiles fresh
    /// and the handle is not tracked by any index (spec.md §6).
    pub fn get_or_compile(
        &self,
        source: &[u8],
        options: PatternOptions,
        now_millis: u64,
    ) -> Result<PatternHandle, RezexError> {
        if !self.config.cache_enabled {
            let started = Instant::now();
            let result = rezex_engine::compile(source, &options);
            self.metrics.record_compile(started, result.is_ok());
            let (artifact, _approx_bytes) = result.map_err(RezexError::from)?;
            let key = pattern_key(source, &options);
            let pr = Arc::new(PatternRecordInner::new(
                key,
                source.to_vec().into_boxed_slice(),
                options,
                artifact,
                now_millis,
                self.config.protection_window_ms,
            ));
            return Ok(PatternHandle(pr));
        }

        let key = pattern_key(source, &options);

        // Fast path: hit.
        {
            let mut shard = self.shard_for(key).lock();
            if let Some(pr) = shard.index.get(&key) {
                pr.touch(now_millis);
                let handle = PatternHandle(pr.clone());
                drop(shard);
                self.metrics.record_hit();
                return Ok(handle);
            }

            // Miss. Either become the leader compiling this key, or join
            // an in-flight leader's waiter list.
            if let Some(waiter_list) = shard.waiters.get_mut(&key) {
                let (tx, rx) = mpsc::channel();
                waiter_list.push(tx);
                drop(shard);
                self.metrics.record_miss();
                return rx.recv().unwrap_or(Err(RezexError::Compilation {
                    message: "leader compilation task vanished without a result".into(),
                    offending_fragment: None,
                }));
            }

            // We are the leader. Reserve the waiter slot before dropping
            // the lock so concurrent followers queue on us rather than
            // each becoming their own leader.
            shard.waiters.insert(key, Vec::new());
        }

        self.metrics.record_miss();
        self.compile_as_leader(key, source, options, now_millis)
    }

    /// `ResourceExhausted` (spec.md §7): a hard ceiling on live entries,
    /// independent of the byte-capacity soft cap, checked before the
    /// engine allocates anything. `0` means unlimited.
    fn over_active_pattern_ceiling(&self) -> bool {
        self.config.max_active_patterns != 0 && self.size() as u64 >= self.config.max_active_patterns
    }

    fn compile_as_leader(
        &self,
        key: u64,
        source: &[u8],
        options: PatternOptions,
        now_millis: u64,
    ) -> Result<PatternHandle, RezexError> {
        if self.over_active_pattern_ceiling() {
            self.metrics.record_resource_exhausted();
            let err = RezexError::ResourceExhausted {
                reason: format!(
                    "active pattern ceiling of {} reached",
                    self.config.max_active_patterns
                ),
            };
            let mut shard = self.shard_for(key).lock();
            let followers = shard.waiters.remove(&key).unwrap_or_default();
            drop(shard);
            for tx in followers {
                let _ = tx.send(Err(err.clone()));
            }
            return Err(err);
        }

        let started = Instant::now();
        let compiled = rezex_engine::compile(source, &options);
        self.metrics.record_compile(started, compiled.is_ok());

        match compiled {
            Ok((artifact, _approx_bytes)) => {
                let pr = Arc::new(PatternRecordInner::new(
                    key,
                    source.to_vec().into_boxed_slice(),
                    options,
                    artifact,
                    now_millis,
                    self.config.protection_window_ms,
                ));

                let mut shard = self.shard_for(key).lock();
                // Defensive re-check (spec.md §4.2 step 4): should be
                // unreachable given the waiter-slot reservation above,
                // but never trust a second compile to win silently.
                let winner = if let Some(existing) = shard.index.get(&key) {
                    existing.clone()
                } else {
                    shard.index.insert(key, pr.clone());
                    self.current_bytes.fetch_add(pr.approx_bytes, Ordering::Relaxed);
                    pr.clone()
                };
                let followers = shard.waiters.remove(&key).unwrap_or_default();
                drop(shard);

                for tx in followers {
                    let _ = tx.send(Ok(winner.clone()));
                }
                Ok(PatternHandle(winner))
            }
            Err(engine_err) => {
                let (message, offending_fragment) = match engine_err {
                    EngineError::CompilationRejected {
                        message,
                        offending_fragment,
                    } => (message, offending_fragment),
                    other => (other.to_string(), None),
                };
                let err = RezexError::Compilation {
                    message,
                    offending_fragment,
                };

                let mut shard = self.shard_for(key).lock();
                let followers = shard.waiters.remove(&key).unwrap_or_default();
                drop(shard);

                for tx in followers {
                    let _ = tx.send(Err(err.clone()));
                }
                Err(err)
            }
        }
    }

    /// Gives a handle back. Disposal, if any, happens on the next
    /// `reclaim` tick, never synchronously here (spec.md §4.2, scenario
    /// 7: "release; next tick destroys the PR").
    pub fn release(&self, handle: PatternHandle) {
        drop(handle);
    }

    /// One reclamation pass: TTL sweep, then (only if over target
    /// capacity) LRU-by-`last_used_at` capacity sweep skipping anything
    /// still within its protection window. Victims are collected under a
    /// short per-shard lock and disposed of after the lock is released.
    /// Returns `(bytes_freed, entries_destroyed_immediately)`.
    pub fn reclaim(&self, drq: &DeferredQueue, now_millis: u64) -> (u64, u64) {
        let mut victims = Vec::new();

        for shard_lock in &self.shards {
            let mut shard = shard_lock.lock();

            let ttl_expired: Vec<u64> = shard
                .index
                .iter()
                .filter(|(_, pr)| {
                    now_millis.saturating_sub(pr.last_used_at_millis()) >= self.config.pattern_cache_ttl_ms
                })
                .map(|(k, _)| *k)
                .collect();
            for k in ttl_expired {
                if let Some(pr) = shard.index.remove(&k) {
                    victims.push(Victim { pr, reason: EvictionReason::Ttl });
                }
            }

            if self.current_bytes.load(Ordering::Relaxed) > self.config.pattern_cache_target_capacity_bytes {
                let mut over_budget = self
                    .current_bytes
                    .load(Ordering::Relaxed)
                    .saturating_sub(self.config.pattern_cache_target_capacity_bytes);

                let candidates: Vec<u64> = shard
                    .index
                    .iter()
                    .filter(|(_, pr)| !pr.is_protected(now_millis))
                    .sorted_by_key(|(_, pr)| pr.last_used_at_millis())
                    .map(|(k, _)| *k)
                    .collect();

                for k in candidates {
                    if over_budget == 0 {
                        break;
                    }
                    if let Some(pr) = shard.index.remove(&k) {
                        over_budget = over_budget.saturating_sub(pr.approx_bytes);
                        victims.push(Victim { pr, reason: EvictionReason::Capacity });
                    }
                }
            }
        }

        self.dispose_victims(victims, drq, now_millis)
    }

    /// Unconditionally evicts every live entry, regardless of TTL,
    /// capacity, or protection window. Used only at process shutdown
    /// (spec.md §9: "clears PC (moving in-use entries to DRQ)") - never
    /// on the `reclaim` hot path, which always respects policy.
    pub fn evict_all(&self, drq: &DeferredQueue, now_millis: u64) -> (u64, u64) {
        let mut victims = Vec::new();
        for shard_lock in &self.shards {
            let mut shard = shard_lock.lock();
            for (_, pr) in shard.index.drain() {
                victims.push(Victim { pr, reason: EvictionReason::Capacity });
            }
        }
        self.dispose_victims(victims, drq, now_millis)
    }

    fn dispose_victims(&self, victims: Vec<Victim>, drq: &DeferredQueue, now_millis: u64) -> (u64, u64) {
        let mut bytes_freed = 0u64;
        let mut destroyed_immediately = 0u64;

        for victim in victims {
            self.current_bytes.fetch_sub(victim.pr.approx_bytes, Ordering::Relaxed);
            let bytes = victim.pr.approx_bytes;

            if Arc::strong_count(&victim.pr) == 1 {
                self.metrics.record_eviction(victim.reason, bytes);
                self.metrics.record_immediate_eviction(bytes);
                bytes_freed += bytes;
                destroyed_immediately += 1;
                drop(victim.pr);
            } else {
                self.metrics.record_moved_to_deferred();
                drq.add(victim.pr, now_millis);
            }
        }

        (bytes_freed, destroyed_immediately)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CacheConfig {
        CacheConfig {
            pattern_cache_target_capacity_bytes: 1 << 20,
            protection_window_ms: 0,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn miss_then_hit_reuses_the_same_pattern_record() {
        let pc = PatternCache::new(cfg());
        let h1 = pc.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();
        assert_eq!(pc.snapshot().misses, 1);
        let h2 = pc.get_or_compile(b"a+", PatternOptions::default(), 1).unwrap();
        assert_eq!(pc.snapshot().hits, 1);
        assert_eq!(h1.key(), h2.key());
        assert!(h1.refcount() >= 2);
    }

    #[test]
    fn release_does_not_destroy_synchronously() {
        let pc = PatternCache::new(cfg());
        let h = pc.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();
        let key = h.key();
        pc.release(h);
        // still indexed; only `reclaim` ever destroys.
        assert_eq!(pc.size(), 1);
        let h2 = pc.get_or_compile(b"a+", PatternOptions::default(), 1).unwrap();
        assert_eq!(h2.key(), key);
        assert_eq!(pc.snapshot().hits, 1);
    }

    #[test]
    fn ttl_sweep_evicts_stale_unreferenced_entries() {
        let pc = PatternCache::new(cfg());
        let h = pc.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();
        pc.release(h);

        let drq = DeferredQueue::new();
        let (bytes_freed, destroyed) = pc.reclaim(&drq, 10_000_000);
        assert!(bytes_freed > 0);
        assert_eq!(destroyed, 1);
        assert_eq!(pc.size(), 0);
        assert_eq!(drq.size(), 0);
        assert_eq!(pc.snapshot().evictions_ttl, 1);
    }

    #[test]
    fn ttl_sweep_with_outstanding_handle_moves_to_deferred_queue() {
        let pc = PatternCache::new(cfg());
        let h = pc.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();

        let drq = DeferredQueue::new();
        let (bytes_freed, destroyed) = pc.reclaim(&drq, 10_000_000);
        assert_eq!(bytes_freed, 0);
        assert_eq!(destroyed, 0);
        assert_eq!(pc.size(), 0);
        assert_eq!(drq.size(), 1);
        assert_eq!(pc.snapshot().moved_to_deferred, 1);

        // Handle is still perfectly usable; it just isn't indexed by PC.
        assert!(h.with_compiled(|_| ()).is_ok());
    }

    #[test]
    fn capacity_sweep_respects_protection_window() {
        let mut config = cfg();
        config.pattern_cache_target_capacity_bytes = 1;
        config.protection_window_ms = 10_000;
        let pc = PatternCache::new(config);

        let h = pc.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();
        pc.release(h);

        let drq = DeferredQueue::new();
        // now_millis still inside the protection window: nothing evicted.
        let (bytes_freed, destroyed) = pc.reclaim(&drq, 5_000);
        assert_eq!(bytes_freed, 0);
        assert_eq!(destroyed, 0);
        assert_eq!(pc.size(), 1);
    }

    #[test]
    fn capacity_sweep_evicts_lru_once_over_budget() {
        // Probe the compiled size first so the budget below admits
        // exactly one of the two patterns.
        let probe = PatternCache::new(cfg());
        let probe_handle = probe.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();
        let approx = probe_handle.approx_bytes();

        let mut config = cfg();
        config.protection_window_ms = 0;
        config.pattern_cache_target_capacity_bytes = approx;
        let pc = PatternCache::new(config);

        let h1 = pc.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();
        pc.release(h1);
        let h2 = pc.get_or_compile(b"b+", PatternOptions::default(), 1).unwrap();
        pc.release(h2);

        let drq = DeferredQueue::new();
        let (_bytes_freed, destroyed) = pc.reclaim(&drq, 100);
        // The older ("a+", last used at 0) entry should be the one evicted.
        assert_eq!(destroyed, 1);
        assert_eq!(pc.size(), 1);
        assert_eq!(pc.snapshot().evictions_capacity, 1);
    }

    #[test]
    fn disabled_cache_compiles_every_call_and_tracks_nothing() {
        let mut config = cfg();
        config.cache_enabled = false;
        let pc = PatternCache::new(config);

        let h1 = pc.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();
        let h2 = pc.get_or_compile(b"a+", PatternOptions::default(), 1).unwrap();
        assert_eq!(h1.key(), h2.key());
        assert_eq!(pc.size(), 0);
        assert_eq!(pc.snapshot().hits, 0);
        assert_eq!(pc.snapshot().misses, 0);
    }

    #[test]
    fn active_pattern_ceiling_rejects_new_compiles_without_allocating() {
        let mut config = cfg();
        config.max_active_patterns = 1;
        let pc = PatternCache::new(config);

        let h1 = pc.get_or_compile(b"a+", PatternOptions::default(), 0).unwrap();
        let err = pc.get_or_compile(b"b+", PatternOptions::default(), 0).unwrap_err();
        assert!(matches!(err, RezexError::ResourceExhausted { .. }));
        assert_eq!(pc.snapshot().resource_exhausted, 1);
        assert_eq!(pc.size(), 1);

        // A repeat hit on the already-cached pattern still succeeds;
        // the ceiling only blocks *new* entries.
        let h1_again = pc.get_or_compile(b"a+", PatternOptions::default(), 1).unwrap();
        assert_eq!(h1.key(), h1_again.key());
    }

    /// P2/P3 fuzz: many threads hammering `get_or_compile`/`release` on a
    /// small key space while a dedicated thread drives `reclaim` on a
    /// tight, rapidly advancing clock, so the cache is constantly
    /// evicting entries the other threads might still be holding.
    /// Every handle obtained must remain usable for a real match until
    /// explicitly released - no thread should ever observe a torn-down
    /// artifact through a handle it still holds. Grounded in the
    /// teacher's `test_cache_fuzzy` (`foyer-memory/src/cache.rs`):
    /// a `SmallRng`-seeded randomized operation loop against a shared
    /// cache, adapted here to run across real OS threads rather than a
    /// single-threaded loop, since this property is specifically about
    /// concurrent interleavings.
    #[test]
    fn concurrent_get_release_survives_aggressive_reclamation() {
        use rand::rngs::SmallRng;
        use rand::{Rng, SeedableRng};

        let mut config = cfg();
        config.pattern_cache_ttl_ms = 1;
        config.protection_window_ms = 0;
        let pc = Arc::new(PatternCache::new(config));
        let drq = Arc::new(DeferredQueue::new());
        // A fixed-size array of `Copy` slices so every worker closure
        // below gets its own copy on capture rather than fighting over
        // a single moved `Vec`.
        let patterns: [&[u8]; 4] = [b"a+", b"b+", b"c+", b"d+"];

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let reclaimer = {
            let pc = pc.clone();
            let drq = drq.clone();
            let stop = stop.clone();
            std::thread::spawn(move || {
                let mut now = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    now += 1;
                    pc.reclaim(&drq, now);
                    drq.reclaim(now, config_deferred_ttl());
                }
            })
        };

        let workers: Vec<_> = (0..8)
            .map(|seed| {
                let pc = pc.clone();
                std::thread::spawn(move || {
                    let mut rng = SmallRng::seed_from_u64(seed);
                    for i in 0..2_000u64 {
                        let pattern = patterns[rng.gen_range(0..patterns.len())];
                        let handle = pc.get_or_compile(pattern, PatternOptions::default(), i).unwrap();
                        // Whether or not this PR has been evicted/deferred
                        // underneath us, the handle we hold must still
                        // resolve to a well-defined boolean (P3) - never a
                        // panic, never a read of freed memory.
                        let _ = handle.with_compiled(|artifact| {
                            rezex_engine::full_match(artifact, b"aaa")
                        });
                        pc.release(handle);
                    }
                })
            })
            .collect();

        for w in workers {
            w.join().unwrap();
        }
        stop.store(true, Ordering::Relaxed);
        reclaimer.join().unwrap();
    }

    fn config_deferred_ttl() -> u64 {
        CacheConfig::default().deferred_cache_ttl_ms
    }
}

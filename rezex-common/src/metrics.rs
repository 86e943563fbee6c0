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

//! The metric *events* this core emits (spec.md §6). Storage/export of
//! these events is an external collaborator's concern; what lives here
//! is the set of atomics each component updates plus the `metrics`
//! crate facade calls that let a host process wire in a real recorder.
//! Snapshots of these atomics are what `rezex`'s metrics-snapshot
//! document (§6) is built from.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Why a pattern record left the live cache or the deferred queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    Ttl,
    Capacity,
    DeferredImmediate,
    DeferredForced,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Ttl => "ttl",
            EvictionReason::Capacity => "capacity",
            EvictionReason::DeferredImmediate => "deferred_immediate",
            EvictionReason::DeferredForced => "deferred_forced",
        }
    }
}

/// The input-kind split spec.md §6 requires for per-operation counts and
/// latencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    DecodedText,
    BorrowedMemory,
    Bulk,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::DecodedText => "decoded_text",
            InputKind::BorrowedMemory => "borrowed_memory",
            InputKind::Bulk => "bulk",
        }
    }
}

/// Counters owned by the Pattern Cache (PC). `hits`/`misses` and the
/// eviction-by-reason counters are the ones spec.md §8's scenario 6/7/8
/// assert against directly.
#[derive(Debug, Default)]
pub struct PatternCacheMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub compiled: AtomicU64,
    pub compile_failures: AtomicU64,
    pub evictions_ttl: AtomicU64,
    pub evictions_capacity: AtomicU64,
    pub moved_to_deferred: AtomicU64,
    pub immediate_eviction: AtomicU64,
    pub resource_exhausted: AtomicU64,
}

impl PatternCacheMetrics {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rezex_pattern_cache_hits_total").increment(1);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rezex_pattern_cache_misses_total").increment(1);
    }

    pub fn record_compile(&self, started: Instant, ok: bool) {
        let elapsed = started.elapsed().as_secs_f64();
        metrics::histogram!("rezex_pattern_compile_latency_seconds").record(elapsed);
        if ok {
            self.compiled.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("rezex_pattern_compile_total").increment(1);
        } else {
            self.compile_failures.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("rezex_pattern_compile_failures_total").increment(1);
        }
    }

    /// Records a PR leaving the live cache for good (destroyed with no
    /// outstanding handles). `reason` is always `Ttl` or `Capacity` here;
    /// a PR that instead moves to the deferred queue is not yet "evicted"
    /// in this counter's sense — see `record_moved_to_deferred`.
    pub fn record_eviction(&self, reason: EvictionReason, bytes_freed: u64) {
        match reason {
            EvictionReason::Ttl => self.evictions_ttl.fetch_add(1, Ordering::Relaxed),
            EvictionReason::Capacity => self.evictions_capacity.fetch_add(1, Ordering::Relaxed),
            EvictionReason::DeferredImmediate | EvictionReason::DeferredForced => 0,
        };
        metrics::counter!("rezex_pattern_cache_evictions_total", "reason" => reason.as_str())
            .increment(1);
        metrics::counter!("rezex_pattern_cache_eviction_bytes_total", "reason" => reason.as_str())
            .increment(bytes_freed);
    }

    /// A PR left the live index but still has outstanding handles, so it
    /// was handed to the deferred-release queue rather than destroyed.
    pub fn record_moved_to_deferred(&self) {
        self.moved_to_deferred.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rezex_pattern_cache_moved_to_deferred_total").increment(1);
    }

    pub fn record_immediate_eviction(&self, bytes_freed: u64) {
        self.immediate_eviction.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rezex_pattern_cache_immediate_eviction_total").increment(1);
        metrics::counter!("rezex_pattern_cache_immediate_eviction_bytes_total")
            .increment(bytes_freed);
    }

    /// Compilation was refused before any artifact was allocated
    /// because the active-pattern ceiling was already at capacity
    /// (spec.md §7, `ResourceExhausted`). Distinct from
    /// `compile_failures`, which covers the engine rejecting a pattern
    /// source it was actually asked to compile.
    pub fn record_resource_exhausted(&self) {
        self.resource_exhausted.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("rezex_pattern_cache_resource_exhausted_total").increment(1);
    }

    pub fn snapshot(&self) -> PatternCacheMetricsSnapshot {
        PatternCacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            compiled: self.compiled.load(Ordering::Relaxed),
            compile_failures: self.compile_failures.load(Ordering::Relaxed),
            evictions_ttl: self.evictions_ttl.load(Ordering::Relaxed),
            evictions_capacity: self.evictions_capacity.load(Ordering::Relaxed),
            moved_to_deferred: self.moved_to_deferred.load(Ordering::Relaxed),
            immediate_eviction: self.immediate_eviction.load(Ordering::Relaxed),
            resource_exhausted: self.resource_exhausted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PatternCacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub compiled: u64,
    pub compile_failures: u64,
    pub evictions_ttl: u64,
    pub evictions_capacity: u64,
    pub moved_to_deferred: u64,
    pub immediate_eviction: u64,
    pub resource_exhausted: u64,
}

/// Counters owned by the Deferred-Release Queue (DRQ).
#[derive(Debug, Default)]
pub struct DeferredQueueMetrics {
    pub immediate_release: AtomicU64,
    pub forced_release: AtomicU64,
    pub bytes_freed: AtomicU64,
}

impl DeferredQueueMetrics {
    pub fn record_immediate(&self, bytes_freed: u64) {
        self.immediate_release.fetch_add(1, Ordering::Relaxed);
        self.bytes_freed.fetch_add(bytes_freed, Ordering::Relaxed);
        metrics::counter!("rezex_deferred_cache_immediate_release_total").increment(1);
    }

    /// A forced release is a high-severity event: it means a caller
    /// held a handle for longer than `deferred_TTL`, and the engine
    /// artifact was torn down out from under it regardless.
    pub fn record_forced(&self, pattern_key: u64, bytes_freed: u64) {
        self.forced_release.fetch_add(1, Ordering::Relaxed);
        self.bytes_freed.fetch_add(bytes_freed, Ordering::Relaxed);
        metrics::counter!("rezex_deferred_cache_forced_release_total").increment(1);
        tracing::warn!(
            pattern_key,
            bytes_freed,
            "forced release of a deferred pattern still referenced by a live handle"
        );
    }

    pub fn snapshot(&self) -> DeferredQueueMetricsSnapshot {
        DeferredQueueMetricsSnapshot {
            immediate_release: self.immediate_release.load(Ordering::Relaxed),
            forced_release: self.forced_release.load(Ordering::Relaxed),
            bytes_freed: self.bytes_freed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeferredQueueMetricsSnapshot {
    pub immediate_release: u64,
    pub forced_release: u64,
    pub bytes_freed: u64,
}

/// Counters owned by the Dispatch Layer (DL), split by input kind per
/// spec.md §6.
#[derive(Debug, Default)]
pub struct OperationMetrics {
    pub match_ops: AtomicU64,
    pub find_ops: AtomicU64,
    pub replace_ops: AtomicU64,
}

impl OperationMetrics {
    pub fn record(&self, op: &'static str, kind: InputKind, started: Instant) {
        let elapsed = started.elapsed().as_secs_f64();
        match op {
            "match" => self.match_ops.fetch_add(1, Ordering::Relaxed),
            "find" => self.find_ops.fetch_add(1, Ordering::Relaxed),
            "replace" => self.replace_ops.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
        metrics::counter!("rezex_pattern_result_cache_ops_total", "op" => op, "input" => kind.as_str())
            .increment(1);
        metrics::histogram!("rezex_pattern_result_cache_latency_seconds", "op" => op, "input" => kind.as_str())
            .record(elapsed);
    }

    pub fn snapshot(&self) -> OperationMetricsSnapshot {
        OperationMetricsSnapshot {
            match_ops: self.match_ops.load(Ordering::Relaxed),
            find_ops: self.find_ops.load(Ordering::Relaxed),
            replace_ops: self.replace_ops.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OperationMetricsSnapshot {
    pub match_ops: u64,
    pub find_ops: u64,
    pub replace_ops: u64,
}

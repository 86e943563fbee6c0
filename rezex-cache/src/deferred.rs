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

//! The Deferred-Release Queue (DRQ, spec.md §4.4). Holds PRs evicted
//! from the live cache while handles were still outstanding, and
//! guarantees bounded-time disposal.

use std::sync::Arc;

use parking_lot::Mutex;
use rezex_common::metrics::{DeferredQueueMetrics, DeferredQueueMetricsSnapshot, EvictionReason};

use crate::record::PatternRecordInner;

#[derive(Default)]
pub struct DeferredQueue {
    entries: Mutex<Vec<Arc<PatternRecordInner>>>,
    metrics: DeferredQueueMetrics,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the Pattern Cache when a PR is evicted from the live
    /// index with outstanding handles. `now_millis` becomes the PR's
    /// eviction timestamp, from which `deferred_TTL` is measured.
    pub fn add(&self, pr: Arc<PatternRecordInner>, now_millis: u64) {
        pr.mark_evicted(now_millis);
        self.entries.lock().push(pr);
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn current_bytes(&self) -> u64 {
        self.entries.lock().iter().map(|pr| pr.approx_bytes).sum()
    }

    pub fn metrics(&self) -> &DeferredQueueMetrics {
        &self.metrics
    }

    /// Two-phase sweep (spec.md §4.4): destroy anything with no
    /// remaining handles, then force-destroy anything that has
    /// overstayed `deferred_ttl_millis` regardless of refcount.
    pub fn reclaim(&self, now_millis: u64, deferred_ttl_millis: u64) -> (u64, u64, u64) {
        let mut immediate_count = 0u64;
        let mut forced_count = 0u64;
        let mut bytes_freed = 0u64;

        let mut entries = self.entries.lock();
        let mut remaining = Vec::with_capacity(entries.len());
        for pr in entries.drain(..) {
            // `entries`'s own clone plus `pr` here both count toward
            // strong_count; subtract this function's local clone to get
            // the count as the rest of the system sees it.
            let outstanding = Arc::strong_count(&pr);
            if outstanding == 1 {
                // No handles remain; this local `pr` is the only owner.
                let freed = pr.force_release().unwrap_or(0);
                self.metrics.record_immediate(freed);
                tracing::debug!(
                    key = pr.key,
                    bytes_freed = freed,
                    reason = EvictionReason::DeferredImmediate.as_str(),
                    "deferred queue released pattern with no outstanding handles"
                );
                immediate_count += 1;
                bytes_freed += freed;
                continue;
            }

            if now_millis.saturating_sub(pr.eviction_timestamp_millis()) >= deferred_ttl_millis {
                let freed = pr.force_release().unwrap_or(0);
                self.metrics.record_forced(pr.key, freed);
                tracing::warn!(
                    key = pr.key,
                    bytes_freed = freed,
                    outstanding_handles = outstanding - 1,
                    reason = EvictionReason::DeferredForced.as_str(),
                    "forced release of a deferred pattern still referenced by a live handle"
                );
                forced_count += 1;
                bytes_freed += freed;
                continue;
            }

            remaining.push(pr);
        }
        *entries = remaining;

        (immediate_count, forced_count, bytes_freed)
    }

    pub fn snapshot(&self) -> DeferredQueueMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rezex_common::options::PatternOptions;
    use rezex_engine::compile;

    use super::*;
    use crate::record::PatternRecordInner;

    fn make_pr(key: u64) -> Arc<PatternRecordInner> {
        let (artifact, _) = compile(b"a+", &PatternOptions::default()).unwrap();
        Arc::new(PatternRecordInner::new(
            key,
            b"a+".to_vec().into_boxed_slice(),
            PatternOptions::default(),
            artifact,
            0,
            0,
        ))
    }

    #[test]
    fn reclaim_destroys_unreferenced_entries_immediately() {
        let drq = DeferredQueue::new();
        let pr = make_pr(1);
        drq.add(pr, 0);
        assert_eq!(drq.size(), 1);

        let (immediate, forced, _bytes) = drq.reclaim(10, 1_000);
        assert_eq!(immediate, 1);
        assert_eq!(forced, 0);
        assert_eq!(drq.size(), 0);
    }

    #[test]
    fn reclaim_force_releases_after_deferred_ttl_even_with_handle_held() {
        let drq = DeferredQueue::new();
        let pr = make_pr(2);
        let handle_clone = pr.clone();
        drq.add(pr, 0);

        // Not yet past deferred_ttl: nothing happens, handle still works.
        let (immediate, forced, _) = drq.reclaim(500, 1_000);
        assert_eq!(immediate, 0);
        assert_eq!(forced, 0);
        assert!(handle_clone.with_compiled(|_| ()).is_ok());

        // Past deferred_ttl: forced release even though handle_clone is alive.
        let (immediate, forced, _) = drq.reclaim(2_000, 1_000);
        assert_eq!(immediate, 0);
        assert_eq!(forced, 1);
        assert!(matches!(
            handle_clone.with_compiled(|_| ()),
            Err(rezex_common::EngineError::PatternForceReleased)
        ));
    }

    #[test]
    fn reclaim_leaves_unexpired_referenced_entries_in_queue() {
        let drq = DeferredQueue::new();
        let pr = make_pr(3);
        let _handle_clone = pr.clone();
        drq.add(pr, 0);

        let (immediate, forced, _) = drq.reclaim(10, 1_000);
        assert_eq!(immediate, 0);
        assert_eq!(forced, 0);
        assert_eq!(drq.size(), 1);
    }
}

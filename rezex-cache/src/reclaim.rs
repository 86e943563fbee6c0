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

//! The Reclamation Worker (RW, spec.md §4.5). A single background task
//! that ticks the Pattern Cache and the Deferred-Release Queue on a
//! fixed interval. Every tick drives both sweeps in the same order: PC
//! first (it may hand fresh victims to the DRQ), then DRQ.
//!
//! One worker per `PatternCache`/`DeferredQueue` pair, started at most
//! once; it is not restartable within a process's lifetime, matching
//! spec.md's "auto_start_eviction_thread" being a start-up-only knob.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::PatternCache;
use crate::deferred::DeferredQueue;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Handle to a running reclamation task. Dropping this without calling
/// `shutdown` leaves the task running detached; `shutdown` is the clean
/// path and is what the facade uses at process teardown.
pub struct ReclamationWorker {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReclamationWorker {
    /// Spawns the worker onto the current tokio runtime. Panics if
    /// called outside of one, same as `tokio::spawn`.
    pub fn spawn(cache: Arc<PatternCache>, deferred: Arc<DeferredQueue>, interval_ms: u64) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = now_millis();
                        let (pc_bytes_freed, pc_destroyed) = cache.reclaim(&deferred, now);
                        let deferred_ttl_ms = cache.config().deferred_cache_ttl_ms;
                        let (drq_immediate, drq_forced, drq_bytes_freed) = deferred.reclaim(now, deferred_ttl_ms);
                        tracing::debug!(
                            pc_bytes_freed,
                            pc_destroyed,
                            drq_immediate,
                            drq_forced,
                            drq_bytes_freed,
                            "reclamation tick complete"
                        );
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        Self { stop_tx, join }
    }

    /// Signals the task to stop and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.join.await;
    }
}

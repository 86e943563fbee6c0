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

//! The metrics snapshot document (spec.md §6): one structured document
//! with sections `pattern_result_cache`, `pattern_cache`,
//! `deferred_cache`, `engine_library`, and a `generated_at` timestamp.
//! Storage/export of these numbers elsewhere is out of scope (spec.md
//! §1); this is just the one stable, serializable view of them.

use rezex_common::metrics::{DeferredQueueMetricsSnapshot, OperationMetricsSnapshot, PatternCacheMetricsSnapshot};
use rezex_common::time::format_rfc3339_now;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PatternCacheSection {
    #[serde(flatten)]
    pub counters: PatternCacheMetricsSnapshot,
    pub entry_count: usize,
    pub actual_bytes: u64,
    pub target_bytes: u64,
    pub utilization: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeferredCacheSection {
    #[serde(flatten)]
    pub counters: DeferredQueueMetricsSnapshot,
    pub entry_count: usize,
    pub current_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineLibrarySection {
    pub name: &'static str,
    pub style: &'static str,
    pub byte_oriented: bool,
}

impl Default for EngineLibrarySection {
    fn default() -> Self {
        Self {
            name: "regex",
            style: "re2-style (linear-time, non-backtracking)",
            byte_oriented: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub pattern_result_cache: OperationMetricsSnapshot,
    pub pattern_cache: PatternCacheSection,
    pub deferred_cache: DeferredCacheSection,
    pub engine_library: EngineLibrarySection,
    pub generated_at: String,
}

impl MetricsSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub(crate) fn build(
    operation: OperationMetricsSnapshot,
    pattern_cache: PatternCacheMetricsSnapshot,
    entry_count: usize,
    actual_bytes: u64,
    target_bytes: u64,
    deferred: DeferredQueueMetricsSnapshot,
    deferred_entry_count: usize,
    deferred_current_bytes: u64,
) -> MetricsSnapshot {
    let utilization = if target_bytes == 0 {
        0.0
    } else {
        actual_bytes as f64 / target_bytes as f64
    };

    MetricsSnapshot {
        pattern_result_cache: operation,
        pattern_cache: PatternCacheSection {
            counters: pattern_cache,
            entry_count,
            actual_bytes,
            target_bytes,
            utilization,
        },
        deferred_cache: DeferredCacheSection {
            counters: deferred,
            entry_count: deferred_entry_count,
            current_bytes: deferred_current_bytes,
        },
        engine_library: EngineLibrarySection::default(),
        generated_at: format_rfc3339_now(),
    }
}

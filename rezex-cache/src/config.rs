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

//! Cache configuration, loaded as JSON (spec.md §6). `shards` is an
//! ambient knob the spec's recognized-keys table does not name; it only
//! affects internal sharding, not observable behavior, so it carries a
//! default and is not subject to the table's validation rules.

use rezex_common::RezexError;
use serde::{Deserialize, Serialize};

fn default_shards() -> usize {
    16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    pub pattern_cache_target_capacity_bytes: u64,
    pub pattern_cache_ttl_ms: u64,
    pub deferred_cache_ttl_ms: u64,
    pub eviction_check_interval_ms: u64,
    #[serde(default = "default_true")]
    pub auto_start_eviction_thread: bool,
    #[serde(default)]
    pub protection_window_ms: u64,
    #[serde(default = "default_shards")]
    pub shards: usize,
    /// Hard ceiling on live pattern-cache entries, independent of
    /// `pattern_cache_target_capacity_bytes` (spec.md §7,
    /// `ResourceExhausted`). `0` means unlimited. Like `shards`, this is
    /// an ambient knob spec.md §6's recognized-keys table does not name.
    #[serde(default)]
    pub max_active_patterns: u64,
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            pattern_cache_target_capacity_bytes: 64 << 20,
            pattern_cache_ttl_ms: 5 * 60_000,
            deferred_cache_ttl_ms: 10 * 60_000,
            eviction_check_interval_ms: 30_000,
            auto_start_eviction_thread: true,
            protection_window_ms: 1_000,
            shards: default_shards(),
            max_active_patterns: 0,
        }
    }
}

impl CacheConfig {
    /// Non-negative intervals; positive TTLs and capacity;
    /// `deferred_TTL > pc_TTL` (spec.md §6).
    pub fn validate(&self) -> Result<(), RezexError> {
        if self.pattern_cache_target_capacity_bytes == 0 {
            return Err(RezexError::Configuration(
                "pattern_cache_target_capacity_bytes must be positive".into(),
            ));
        }
        if self.pattern_cache_ttl_ms == 0 {
            return Err(RezexError::Configuration(
                "pattern_cache_ttl_ms must be positive".into(),
            ));
        }
        if self.deferred_cache_ttl_ms == 0 {
            return Err(RezexError::Configuration(
                "deferred_cache_ttl_ms must be positive".into(),
            ));
        }
        if self.deferred_cache_ttl_ms <= self.pattern_cache_ttl_ms {
            return Err(RezexError::Configuration(
                "deferred_cache_ttl_ms must exceed pattern_cache_ttl_ms".into(),
            ));
        }
        if self.shards == 0 {
            return Err(RezexError::Configuration("shards must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        CacheConfig::default().validate().unwrap();
    }

    #[test]
    fn deferred_ttl_must_exceed_pc_ttl() {
        let mut cfg = CacheConfig::default();
        cfg.deferred_cache_ttl_ms = cfg.pattern_cache_ttl_ms;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut cfg = CacheConfig::default();
        cfg.pattern_cache_target_capacity_bytes = 0;
        assert!(cfg.validate().is_err());
    }
}

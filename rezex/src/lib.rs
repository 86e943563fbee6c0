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

//! `rezex`: the public surface of the in-process regex execution
//! service. This crate is the process-wide facade over
//! `rezex-cache`/`rezex-dispatch`/`rezex-engine` - `init` once, call the
//! functions below from as many threads as you like, `shutdown` once.
//!
//! ```no_run
//! use rezex::{CacheConfig, PatternOptions};
//!
//! rezex::init(CacheConfig::default()).unwrap();
//! let id = rezex::compile(br"\d+", PatternOptions::default()).unwrap();
//! assert!(rezex::full_match(id, b"12345").unwrap());
//! rezex::release(id).unwrap();
//! rezex::shutdown().unwrap();
//! ```

mod metrics_snapshot;
mod runtime;

pub use rezex_cache::CacheConfig;
pub use rezex_common::options::PatternOptions;
pub use rezex_common::RezexError;
pub use rezex_dispatch::{ByteView, HandleId, MatchResult, ReplaceAllResult, ReplaceFirstResult};
pub use rezex_engine::{Introspection, MatchMode};
pub use metrics_snapshot::MetricsSnapshot;

use runtime::with_running;

/// Installs `config` and starts the reclamation worker. May be called
/// at most once per process; see `shutdown`.
pub fn init(config: CacheConfig) -> Result<(), RezexError> {
    runtime::init(config)
}

/// Stops the reclamation worker and drains the cache and deferred
/// queue. Terminal: `init` cannot be called again afterwards.
pub fn shutdown() -> Result<(), RezexError> {
    runtime::shutdown()
}

pub fn compile(source: &[u8], options: PatternOptions) -> Result<HandleId, RezexError> {
    with_running(|rt| rt.dispatcher.compile(source, options, runtime::now_millis()))?
}

pub fn release(id: HandleId) -> Result<(), RezexError> {
    with_running(|rt| rt.dispatcher.release(id))?
}

pub fn full_match<'a>(id: HandleId, input: impl Into<ByteView<'a>>) -> Result<bool, RezexError> {
    with_running(|rt| rt.dispatcher.full_match(id, input.into()))?
}

pub fn partial_match<'a>(id: HandleId, input: impl Into<ByteView<'a>>) -> Result<bool, RezexError> {
    with_running(|rt| rt.dispatcher.partial_match(id, input.into()))?
}

pub fn match_with_captures<'a>(
    id: HandleId,
    input: impl Into<ByteView<'a>>,
    mode: MatchMode,
) -> Result<Option<MatchResult>, RezexError> {
    with_running(|rt| rt.dispatcher.match_with_captures(id, input.into(), mode))?
}

pub fn find_all<'a>(id: HandleId, input: impl Into<ByteView<'a>>) -> Result<Vec<MatchResult>, RezexError> {
    with_running(|rt| rt.dispatcher.find_all(id, input.into()))?
}

pub fn replace_first<'a>(
    id: HandleId,
    input: impl Into<ByteView<'a>>,
    rewrite: &[u8],
) -> Result<ReplaceFirstResult, RezexError> {
    with_running(|rt| rt.dispatcher.replace_first(id, input.into(), rewrite))?
}

pub fn replace_all<'a>(
    id: HandleId,
    input: impl Into<ByteView<'a>>,
    rewrite: &[u8],
) -> Result<ReplaceAllResult, RezexError> {
    with_running(|rt| rt.dispatcher.replace_all(id, input.into(), rewrite))?
}

pub fn validate_rewrite(id: HandleId, rewrite: &[u8]) -> Result<(), RezexError> {
    with_running(|rt| rt.dispatcher.validate_rewrite(id, rewrite))?
}

pub fn introspect(id: HandleId) -> Result<Introspection, RezexError> {
    with_running(|rt| rt.dispatcher.introspect(id))?
}

/// Pure: no handle, no cache lookup. Spec.md §8 (P7) expects
/// `quote_literal(x)` compiled and matched against `x` to full-match.
pub fn quote_literal(bytes: &[u8]) -> Vec<u8> {
    rezex_dispatch::Dispatcher::quote_literal(bytes)
}

/// Bulk full-match over N inputs against one compiled pattern. A `None`
/// slot yields `false`; the call never fails partway through (P6).
pub fn bulk_full_match<'a>(
    id: HandleId,
    inputs: &[Option<ByteView<'a>>],
) -> Result<Vec<bool>, RezexError> {
    with_running(|rt| rt.dispatcher.bulk_full_match(id, inputs))?
}

pub fn bulk_partial_match<'a>(
    id: HandleId,
    inputs: &[Option<ByteView<'a>>],
) -> Result<Vec<bool>, RezexError> {
    with_running(|rt| rt.dispatcher.bulk_partial_match(id, inputs))?
}

/// Assembles the `pattern_result_cache` / `pattern_cache` /
/// `deferred_cache` / `engine_library` / `generated_at` document
/// spec.md §6 specifies.
pub fn metrics_snapshot() -> Result<MetricsSnapshot, RezexError> {
    let deferred = runtime::deferred_queue()?;
    with_running(|rt| {
        metrics_snapshot::build(
            rt.dispatcher.metrics(),
            rt.cache.snapshot(),
            rt.cache.size(),
            rt.cache.current_bytes(),
            rt.config.pattern_cache_target_capacity_bytes,
            deferred.snapshot(),
            deferred.size(),
            deferred.current_bytes(),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // `rezex::init`/`shutdown` are process-wide singletons, so every
    // test that touches them must run under this lock to avoid racing
    // another test's init/shutdown pair.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn test_config() -> CacheConfig {
        CacheConfig {
            auto_start_eviction_thread: false,
            ..CacheConfig::default()
        }
    }

    #[test]
    fn compile_match_release_round_trip() {
        let _guard = SERIAL.lock().unwrap();
        init(test_config()).unwrap();

        let id = compile(br"\d+", PatternOptions::default()).unwrap();
        assert!(full_match(id, &b"12345"[..]).unwrap());
        assert!(!full_match(id, &b"12a45"[..]).unwrap());
        assert!(partial_match(id, "abc 42").unwrap());
        release(id).unwrap();

        shutdown().unwrap();
    }

    #[test]
    fn quote_literal_round_trips_without_init() {
        let literal = b"a.b*c(d)";
        let quoted = quote_literal(literal);
        assert_ne!(quoted, literal);
    }

    #[test]
    fn calls_before_init_report_configuration_error() {
        let _guard = SERIAL.lock().unwrap();
        // This test intentionally does not call `init`; it runs in
        // isolation under `SERIAL` so it cannot observe another test's
        // `RUNNING` state, but the process-wide `RUNTIME` may already
        // have been set by an earlier test in this binary. Only assert
        // the error path when still uninitialized.
        let result = compile(b"a+", PatternOptions::default());
        if let Err(err) = result {
            assert!(matches!(err, RezexError::Configuration(_)));
        }
    }
}

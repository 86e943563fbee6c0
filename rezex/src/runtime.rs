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

//! The process-wide singleton (spec.md §9: "the cache is a process-wide
//! singleton with explicit init/teardown"). `init` installs the
//! configuration, builds the pattern cache and deferred queue, and - if
//! `auto_start_eviction_thread` is set - starts the reclamation worker
//! on a small dedicated `tokio` runtime. `shutdown` stops the worker,
//! force-drains the cache and deferred queue, and moves the module to a
//! final state from which re-init is not supported; this matches
//! spec.md exactly rather than replicating the teacher's host-runtime
//! "close / force-close" wait loop (Open Question 3, see DESIGN.md).

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rezex_cache::{CacheConfig, DeferredQueue, PatternCache, ReclamationWorker};
use rezex_common::{time::monotonic_millis, RezexError};
use rezex_dispatch::Dispatcher;

const UNINITIALIZED: u8 = 0;
const RUNNING: u8 = 1;
const SHUT_DOWN: u8 = 2;

/// Gates `init`/`shutdown` transitions only. Hot-path dispatch calls
/// never touch this lock - they go straight through `RUNTIME.get()`,
/// whose internals (`PatternCache`'s sharded locks, `HandleTable`'s own
/// mutex) already provide the concurrency the spec requires.
static LIFECYCLE: AtomicU8 = AtomicU8::new(UNINITIALIZED);
static TRANSITION_LOCK: Mutex<()> = Mutex::new(());
static RUNTIME: OnceLock<RunningRuntime> = OnceLock::new();

struct RunningRuntime {
    cache: Arc<PatternCache>,
    deferred: Arc<DeferredQueue>,
    dispatcher: Dispatcher,
    config: CacheConfig,
    tokio_rt: tokio::runtime::Runtime,
    worker: Mutex<Option<ReclamationWorker>>,
}

fn not_initialized_error() -> RezexError {
    RezexError::Configuration("rezex is not initialized (call rezex::init first)".into())
}

pub(crate) struct Handles<'a> {
    pub cache: &'a Arc<PatternCache>,
    pub dispatcher: &'a Dispatcher,
    pub config: &'a CacheConfig,
}

pub(crate) fn with_running<R>(f: impl FnOnce(Handles<'_>) -> R) -> Result<R, RezexError> {
    if LIFECYCLE.load(Ordering::Acquire) != RUNNING {
        return Err(not_initialized_error());
    }
    let rt = RUNTIME.get().ok_or_else(not_initialized_error)?;
    Ok(f(Handles {
        cache: &rt.cache,
        dispatcher: &rt.dispatcher,
        config: &rt.config,
    }))
}

pub(crate) fn deferred_queue() -> Result<&'static Arc<DeferredQueue>, RezexError> {
    if LIFECYCLE.load(Ordering::Acquire) != RUNNING {
        return Err(not_initialized_error());
    }
    RUNTIME.get().map(|rt| &rt.deferred).ok_or_else(not_initialized_error)
}

pub fn now_millis() -> u64 {
    monotonic_millis()
}

/// Installs `config` and starts the reclamation worker (unless
/// `auto_start_eviction_thread` is false). Returns `ConfigurationError`
/// if `config` fails validation, or if `init` is called more than once
/// in this process's lifetime - including after `shutdown`, which is
/// terminal (spec.md §9).
pub fn init(config: CacheConfig) -> Result<(), RezexError> {
    config.validate()?;
    let _guard = TRANSITION_LOCK.lock();

    match LIFECYCLE.load(Ordering::Acquire) {
        RUNNING => return Err(RezexError::Configuration("rezex is already initialized".into())),
        SHUT_DOWN => {
            return Err(RezexError::Configuration(
                "rezex was already shut down in this process; re-init is not supported".into(),
            ))
        }
        _ => {}
    }

    let cache = Arc::new(PatternCache::new(config.clone()));
    let deferred = Arc::new(DeferredQueue::new());
    let dispatcher = Dispatcher::new(cache.clone());

    let tokio_rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("rezex-reclaim")
        .enable_time()
        .build()
        .map_err(|e| RezexError::Configuration(format!("failed to start reclamation runtime: {e}")))?;

    let worker = if config.auto_start_eviction_thread {
        let _enter = tokio_rt.enter();
        Some(ReclamationWorker::spawn(
            cache.clone(),
            deferred.clone(),
            config.eviction_check_interval_ms,
        ))
    } else {
        None
    };

    let running = RunningRuntime {
        cache,
        deferred,
        dispatcher,
        config,
        tokio_rt,
        worker: Mutex::new(worker),
    };

    // `OnceLock::set` only fails if already set, which the lifecycle
    // flag above already rules out under the transition lock.
    let _ = RUNTIME.set(running);
    LIFECYCLE.store(RUNNING, Ordering::Release);
    Ok(())
}

/// Stops the reclamation worker, force-evicts everything still live in
/// the cache into the deferred queue, force-drains the deferred queue
/// regardless of outstanding handles, and transitions to the terminal
/// state. Outstanding handles callers failed to release become forced
/// DRQ releases here (spec.md §5: "unreleased handles at shutdown
/// become forced DRQ releases").
pub fn shutdown() -> Result<(), RezexError> {
    let _guard = TRANSITION_LOCK.lock();
    match LIFECYCLE.load(Ordering::Acquire) {
        RUNNING => {}
        UNINITIALIZED => return Err(not_initialized_error()),
        _ => return Err(RezexError::Configuration("rezex is already shut down".into())),
    }

    let rt = RUNTIME.get().expect("lifecycle says RUNNING, runtime must be set");

    if let Some(worker) = rt.worker.lock().take() {
        rt.tokio_rt.block_on(worker.shutdown());
    }

    let now = monotonic_millis();
    rt.cache.evict_all(&rt.deferred, now);
    let (immediate, forced, bytes_freed) = rt.deferred.reclaim(now, 0);
    tracing::info!(immediate, forced, bytes_freed, "rezex shutdown drained the deferred queue");

    LIFECYCLE.store(SHUT_DOWN, Ordering::Release);
    Ok(())
}

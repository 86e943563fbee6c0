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

//! The Pattern Record (PR) and the Pattern Handle given to callers.
//!
//! Refcount discipline here is `Arc` strong-count, not a manual atomic:
//! the live cache index holds one clone ("cache hold"), the deferred
//! queue holds one clone while a PR sits there, and every outstanding
//! `PatternHandle` is another clone. Dropping a clone is exactly
//! "decrement refcount"; the last clone's `Drop` deallocates the
//! `PatternRecordInner` itself. This is the ownership-safe analogue of
//! the teacher's manual `NonNull` + `AtomicUsize` refcount scheme.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rezex_common::options::PatternOptions;
use rezex_common::EngineError;
use rezex_engine::CompiledArtifact;

/// Mirrors spec's PR state machine. `Released` is never observed as a
/// stored value (the struct is gone by then); it exists so tests and
/// diagnostics can name the terminal state without over-modeling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PatternState {
    Live = 0,
    Evicted = 1,
    Released = 2,
}

impl PatternState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PatternState::Live,
            1 => PatternState::Evicted,
            _ => PatternState::Released,
        }
    }
}

/// The cached entity. Never constructed bare; always behind an `Arc`.
#[derive(Debug)]
pub struct PatternRecordInner {
    pub key: u64,
    pub source: Box<[u8]>,
    pub options: PatternOptions,
    /// `None` once force-released by the deferred queue. Readers observe
    /// this instead of a true use-after-free.
    compiled: RwLock<Option<Arc<CompiledArtifact>>>,
    pub approx_bytes: u64,
    pub created_at_millis: u64,
    last_used_at_millis: AtomicU64,
    state: AtomicU8,
    /// 0 until this PR enters the deferred queue.
    eviction_timestamp_millis: AtomicU64,
    /// Capacity eviction must not select this PR before this deadline.
    protect_until_millis: u64,
}

impl PatternRecordInner {
    pub fn new(
        key: u64,
        source: Box<[u8]>,
        options: PatternOptions,
        artifact: CompiledArtifact,
        now_millis: u64,
        protection_window_millis: u64,
    ) -> Self {
        let approx_bytes = artifact.approx_bytes();
        Self {
            key,
            source,
            options,
            compiled: RwLock::new(Some(Arc::new(artifact))),
            approx_bytes,
            created_at_millis: now_millis,
            last_used_at_millis: AtomicU64::new(now_millis),
            state: AtomicU8::new(PatternState::Live as u8),
            eviction_timestamp_millis: AtomicU64::new(0),
            protect_until_millis: now_millis.saturating_add(protection_window_millis),
        }
    }

    pub fn last_used_at_millis(&self) -> u64 {
        self.last_used_at_millis.load(Ordering::Relaxed)
    }

    pub fn touch(&self, now_millis: u64) {
        self.last_used_at_millis.store(now_millis, Ordering::Relaxed);
    }

    pub fn state(&self) -> PatternState {
        PatternState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn mark_evicted(&self, now_millis: u64) {
        self.state.store(PatternState::Evicted as u8, Ordering::Relaxed);
        self.eviction_timestamp_millis.store(now_millis, Ordering::Relaxed);
    }

    pub fn eviction_timestamp_millis(&self) -> u64 {
        self.eviction_timestamp_millis.load(Ordering::Relaxed)
    }

    pub fn is_protected(&self, now_millis: u64) -> bool {
        now_millis < self.protect_until_millis
    }

    /// Forced release: drops the compiled artifact regardless of how
    /// many `PatternHandle`s still reference this `PatternRecordInner`.
    /// Returns the approximate byte count that was freed, or `None` if
    /// the slot was already empty (double-disposal defended against,
    /// though the deferred queue is expected to call this at most once
    /// per PR).
    pub fn force_release(&self) -> Option<u64> {
        let mut slot = self.compiled.write();
        if slot.take().is_some() {
            Some(self.approx_bytes)
        } else {
            None
        }
    }

    /// Runs `f` against the compiled artifact, or yields
    /// `PatternForceReleased` if this PR was torn down out from under a
    /// still-held handle.
    pub fn with_compiled<R>(
        &self,
        f: impl FnOnce(&CompiledArtifact) -> R,
    ) -> Result<R, EngineError> {
        let slot = self.compiled.read();
        match slot.as_ref() {
            Some(artifact) => Ok(f(artifact)),
            None => Err(EngineError::PatternForceReleased),
        }
    }
}

/// A pinned reference to a `PatternRecordInner`, returned to callers by
/// `PatternCache::get_or_compile`. Single-ownership: consuming it (by
/// value, via `PatternCache::release`) is the only way to give it back.
/// There is no `Drop`-based auto-release — see DESIGN.md for why the
/// double-release check (P1) lives at the dispatch boundary instead.
#[derive(Debug, Clone)]
pub struct PatternHandle(pub(crate) Arc<PatternRecordInner>);

impl PatternHandle {
    pub fn key(&self) -> u64 {
        self.0.key
    }

    pub fn source(&self) -> &[u8] {
        &self.0.source
    }

    pub fn options(&self) -> &PatternOptions {
        &self.0.options
    }

    pub fn approx_bytes(&self) -> u64 {
        self.0.approx_bytes
    }

    /// Outstanding references to the underlying PR, including this
    /// handle itself and any cache/deferred-queue hold. Exposed for
    /// tests asserting P2 (hit identity / refcount bookkeeping).
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn state(&self) -> PatternState {
        self.0.state()
    }

    pub fn with_compiled<R>(
        &self,
        f: impl FnOnce(&CompiledArtifact) -> R,
    ) -> Result<R, EngineError> {
        self.0.with_compiled(f)
    }

    pub(crate) fn inner(&self) -> &Arc<PatternRecordInner> {
        &self.0
    }
}

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

use thiserror::Error;

/// The error kinds a caller of the core can observe. Each kind is
/// surfaced distinctly and never conflated with another: a compilation
/// failure is not a match miss, a stale handle is not "no match", and a
/// configuration mistake is not a runtime engine failure.
#[derive(Debug, Error, Clone)]
pub enum RezexError {
    /// The engine rejected a pattern source. Never retried.
    #[error("pattern compilation failed: {message}")]
    Compilation {
        message: String,
        offending_fragment: Option<String>,
    },

    /// A handle was used after release, or a null/unknown handle was
    /// passed. Programmer error, not a match miss.
    #[error("pattern handle is invalid or has already been released")]
    InvalidHandle,

    /// Compiling this pattern would exceed the active-pattern ceiling.
    /// Hard limit, independent of cache capacity, checked before any
    /// artifact is allocated.
    #[error("resource exhausted: {reason}")]
    ResourceExhausted { reason: String },

    /// The cache/engine configuration failed validation at load time.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A failure surfaced by the engine during match/replace, or the
    /// safe-Rust surfacing of a deferred-queue forced release.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Failures attributable to the engine adapter rather than to cache
/// bookkeeping. `EngineError` is "rare" per spec: it is never expected
/// on the hot match path and is propagated verbatim rather than masked.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// The pattern's compiled artifact was force-released by the
    /// deferred-release queue while this handle was still outstanding.
    /// Not a true use-after-free: the artifact slot is behind a lock and
    /// was observed empty. A high-severity `forced_release` metric event
    /// was already emitted when this happened.
    #[error("pattern was force-released from the deferred queue while still held")]
    PatternForceReleased,

    /// A rewrite template referenced a capture group index the pattern
    /// does not have.
    #[error("rewrite template references out-of-range capture group \\{index}")]
    InvalidRewriteGroup { index: usize },

    /// `compile` rejected a pattern source. Carries the substring of the
    /// pattern text a syntax/translation error pinpoints, when the
    /// underlying parser exposes a span for it (spec.md §4.1/§7:
    /// `CompilationError` "carries ... the offending fragment").
    #[error("pattern rejected: {message}")]
    CompilationRejected {
        message: String,
        offending_fragment: Option<String>,
    },

    /// Any other unexpected failure from the underlying engine.
    #[error("unexpected engine failure: {0}")]
    Unexpected(String),
}

pub type Result<T, E = RezexError> = std::result::Result<T, E>;

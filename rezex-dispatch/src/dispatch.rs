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

//! The Dispatch Layer (DL, spec.md §4.6): a thin, stateless-over-its-
//! inputs layer that validates handles, routes owned/borrowed/decoded-
//! text views to the engine with no copying, and threads timing events
//! through metrics. The only state it carries is the handle table (the
//! external duck-typed handle boundary) and the per-operation metric
//! counters - neither participates in match/replace correctness, so the
//! routing logic itself remains as stateless as spec.md describes.

use std::sync::Arc;
use std::time::Instant;

use rezex_cache::{PatternCache, PatternHandle};
use rezex_common::metrics::{InputKind, OperationMetrics, OperationMetricsSnapshot};
use rezex_common::options::PatternOptions;
use rezex_common::RezexError;
use rezex_engine::{ByteRange, Introspection, MatchMode};
use rezex_util::ByteView;

use crate::handle_table::{HandleId, HandleTable};

/// Capture-group result shape (spec.md §4.6): `matched`, the input
/// length (views are never stored past the call, so the result cannot
/// hold a borrowed slice of them), and a group-name mapping that is
/// *queried from the shared artifact* rather than copied into the
/// result - `group_by_name` goes back through the handle on demand.
#[derive(Debug)]
pub struct MatchResult {
    pub matched: bool,
    pub input_len: usize,
    pub groups: Vec<Option<ByteRange>>,
    handle: PatternHandle,
}

impl MatchResult {
    pub fn group(&self, index: usize) -> Option<ByteRange> {
        self.groups.get(index).copied().flatten()
    }

    /// `None` both when the name is unknown and when the named group
    /// did not participate in this particular match - spec.md §8 (P8)
    /// only requires the two to agree with numeric lookup, not that
    /// they be distinguishable from each other.
    pub fn group_by_name(&self, name: &str) -> Option<ByteRange> {
        let index = self
            .handle
            .with_compiled(|artifact| artifact.introspect().named_groups.get(name).copied())
            .ok()
            .flatten()?;
        self.group(index)
    }
}

#[derive(Debug, Clone)]
pub struct ReplaceFirstResult {
    pub output: Vec<u8>,
    pub replaced: bool,
}

#[derive(Debug, Clone)]
pub struct ReplaceAllResult {
    pub output: Vec<u8>,
    pub count: usize,
}

/// `ByteView::Owned`/`Borrowed` are both byte buffers as far as the
/// metrics split in spec.md §6 is concerned (`decoded-text` vs
/// `borrowed-memory` vs `bulk`); only `Text` gets its own bucket.
/// The engine represents a non-participating capturing group with a
/// sentinel `ByteRange`; the dispatch-layer result shape hides that
/// sentinel behind `None` per spec.md §4.6's `Option<ByteRange>` groups.
fn absent_sentinel_to_option(range: ByteRange) -> Option<ByteRange> {
    if range.is_absent() {
        None
    } else {
        Some(range)
    }
}

fn input_kind_of(view: &ByteView<'_>) -> InputKind {
    match view {
        ByteView::Text(_) => InputKind::DecodedText,
        ByteView::Owned(_) | ByteView::Borrowed(_) => InputKind::BorrowedMemory,
    }
}

pub struct Dispatcher {
    cache: Arc<PatternCache>,
    handles: HandleTable,
    metrics: OperationMetrics,
}

impl Dispatcher {
    pub fn new(cache: Arc<PatternCache>) -> Self {
        Self {
            cache,
            handles: HandleTable::new(),
            metrics: OperationMetrics::default(),
        }
    }

    pub fn metrics(&self) -> OperationMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn outstanding_handles(&self) -> usize {
        self.handles.len()
    }

    pub fn compile(
        &self,
        source: &[u8],
        options: PatternOptions,
        now_millis: u64,
    ) -> Result<HandleId, RezexError> {
        let handle = self.cache.get_or_compile(source, options, now_millis)?;
        Ok(self.handles.insert(handle))
    }

    pub fn release(&self, id: HandleId) -> Result<(), RezexError> {
        let handle = self.handles.release(id)?;
        self.cache.release(handle);
        Ok(())
    }

    pub fn full_match(&self, id: HandleId, view: ByteView<'_>) -> Result<bool, RezexError> {
        let handle = self.handles.get(id)?;
        let started = Instant::now();
        let kind = input_kind_of(&view);
        let result = handle.with_compiled(|artifact| rezex_engine::full_match(artifact, view.as_bytes()))?;
        self.metrics.record("match", kind, started);
        Ok(result)
    }

    pub fn partial_match(&self, id: HandleId, view: ByteView<'_>) -> Result<bool, RezexError> {
        let handle = self.handles.get(id)?;
        let started = Instant::now();
        let kind = input_kind_of(&view);
        let result =
            handle.with_compiled(|artifact| rezex_engine::partial_match(artifact, view.as_bytes()))?;
        self.metrics.record("match", kind, started);
        Ok(result)
    }

    pub fn match_with_captures(
        &self,
        id: HandleId,
        view: ByteView<'_>,
        mode: MatchMode,
    ) -> Result<Option<MatchResult>, RezexError> {
        let handle = self.handles.get(id)?;
        let started = Instant::now();
        let kind = input_kind_of(&view);
        let input_len = view.len();
        let ranges = handle
            .with_compiled(|artifact| rezex_engine::match_with_captures(artifact, view.as_bytes(), mode))?;
        self.metrics.record("find", kind, started);
        Ok(ranges.map(|groups| MatchResult {
            matched: true,
            input_len,
            groups: groups.into_iter().map(absent_sentinel_to_option).collect(),
            handle: handle.clone(),
        }))
    }

    /// Materializes the engine's lazy match sequence into one result
    /// vector for this dispatch call. The sequence itself is finite and
    /// restartable at the engine layer (spec.md §4.1); the dispatch
    /// boundary has no notion of a cursor to hand back across a call,
    /// so it always walks it to the end.
    pub fn find_all(&self, id: HandleId, view: ByteView<'_>) -> Result<Vec<MatchResult>, RezexError> {
        let handle = self.handles.get(id)?;
        let started = Instant::now();
        let kind = input_kind_of(&view);
        let input_len = view.len();
        let results = handle.with_compiled(|artifact| {
            rezex_engine::find_all(artifact, view.as_bytes())
                .map(|groups| MatchResult {
                    matched: true,
                    input_len,
                    groups: groups.into_iter().map(absent_sentinel_to_option).collect(),
                    handle: handle.clone(),
                })
                .collect::<Vec<_>>()
        })?;
        self.metrics.record("find", kind, started);
        Ok(results)
    }

    pub fn replace_first(
        &self,
        id: HandleId,
        view: ByteView<'_>,
        rewrite: &[u8],
    ) -> Result<ReplaceFirstResult, RezexError> {
        let handle = self.handles.get(id)?;
        let started = Instant::now();
        let kind = input_kind_of(&view);
        let (output, replaced) =
            handle.with_compiled(|artifact| rezex_engine::replace_first(artifact, view.as_bytes(), rewrite))?;
        self.metrics.record("replace", kind, started);
        Ok(ReplaceFirstResult { output, replaced })
    }

    pub fn replace_all(
        &self,
        id: HandleId,
        view: ByteView<'_>,
        rewrite: &[u8],
    ) -> Result<ReplaceAllResult, RezexError> {
        let handle = self.handles.get(id)?;
        let started = Instant::now();
        let kind = input_kind_of(&view);
        let (output, count) =
            handle.with_compiled(|artifact| rezex_engine::replace_all(artifact, view.as_bytes(), rewrite))?;
        self.metrics.record("replace", kind, started);
        Ok(ReplaceAllResult { output, count })
    }

    pub fn validate_rewrite(&self, id: HandleId, rewrite: &[u8]) -> Result<(), RezexError> {
        let handle = self.handles.get(id)?;
        handle
            .with_compiled(|artifact| rezex_engine::validate_rewrite(artifact, rewrite))?
            .map_err(RezexError::from)
    }

    pub fn introspect(&self, id: HandleId) -> Result<Introspection, RezexError> {
        let handle = self.handles.get(id)?;
        Ok(handle.with_compiled(|artifact| artifact.introspect())?)
    }

    pub fn quote_literal(bytes: &[u8]) -> Vec<u8> {
        rezex_engine::quote_literal(bytes)
    }

    /// Bulk dispatch (spec.md §4.6/§7, P6): one handle, N inputs, a
    /// single iteration. A `None` slot (absent/invalid input) yields
    /// `false` and iteration continues; a per-item engine error (e.g. a
    /// force-released pattern racing a still-held handle) is likewise
    /// folded into `false` rather than aborting the batch. Only the
    /// handle itself is validated up front - invalid there fails the
    /// whole call, since it is shared by every item.
    pub fn bulk_full_match(
        &self,
        id: HandleId,
        inputs: &[Option<ByteView<'_>>],
    ) -> Result<Vec<bool>, RezexError> {
        let handle = self.handles.get(id)?;
        let started = Instant::now();
        let results = inputs
            .iter()
            .map(|maybe_view| match maybe_view {
                Some(view) => handle
                    .with_compiled(|artifact| rezex_engine::full_match(artifact, view.as_bytes()))
                    .unwrap_or(false),
                None => false,
            })
            .collect();
        self.metrics.record("match", InputKind::Bulk, started);
        Ok(results)
    }

    pub fn bulk_partial_match(
        &self,
        id: HandleId,
        inputs: &[Option<ByteView<'_>>],
    ) -> Result<Vec<bool>, RezexError> {
        let handle = self.handles.get(id)?;
        let started = Instant::now();
        let results = inputs
            .iter()
            .map(|maybe_view| match maybe_view {
                Some(view) => handle
                    .with_compiled(|artifact| rezex_engine::partial_match(artifact, view.as_bytes()))
                    .unwrap_or(false),
                None => false,
            })
            .collect();
        self.metrics.record("match", InputKind::Bulk, started);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use rezex_cache::CacheConfig;

    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(PatternCache::new(CacheConfig::default())))
    }

    #[test]
    fn full_and_partial_match_route_through_a_handle() {
        let d = dispatcher();
        let id = d.compile(br"\d+", PatternOptions::default(), 0).unwrap();
        assert!(d.full_match(id, b"12345"[..].into()).unwrap());
        assert!(!d.full_match(id, b"12a45"[..].into()).unwrap());
        assert!(d.partial_match(id, "abc 42".into()).unwrap());
        d.release(id).unwrap();
    }

    #[test]
    fn released_handle_is_rejected_on_reuse() {
        let d = dispatcher();
        let id = d.compile(b"a+", PatternOptions::default(), 0).unwrap();
        d.release(id).unwrap();
        assert!(matches!(
            d.full_match(id, b"a"[..].into()),
            Err(RezexError::InvalidHandle)
        ));
        assert!(matches!(d.release(id), Err(RezexError::InvalidHandle)));
    }

    #[test]
    fn capture_order_and_named_lookup() {
        let d = dispatcher();
        let id = d
            .compile(br"(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})", PatternOptions::default(), 0)
            .unwrap();
        let result = d
            .match_with_captures(id, "2025-11-24".into(), MatchMode::Unanchored)
            .unwrap()
            .unwrap();
        let view = b"2025-11-24";
        assert_eq!(result.group(1).unwrap().slice(view).unwrap(), b"2025");
        assert_eq!(result.group_by_name("y").unwrap().slice(view).unwrap(), b"2025");
        assert!(result.group_by_name("q").is_none());
        d.release(id).unwrap();
    }

    #[test]
    fn bulk_match_never_short_circuits_on_invalid_slots() {
        let d = dispatcher();
        let id = d.compile(br"\d+", PatternOptions::default(), 0).unwrap();
        let inputs = vec![Some(ByteView::from(&b"123"[..])), None, Some(ByteView::from(&b"abc"[..]))];
        let results = d.bulk_full_match(id, &inputs).unwrap();
        assert_eq!(results, vec![true, false, false]);
        d.release(id).unwrap();
    }

    #[test]
    fn replace_all_reports_count() {
        let d = dispatcher();
        let id = d.compile(br"\d+", PatternOptions::default(), 0).unwrap();
        let result = d
            .replace_all(id, "Item 123 costs $456".into(), b"XXX")
            .unwrap();
        assert_eq!(result.output, b"Item XXX costs $XXX");
        assert_eq!(result.count, 2);
        d.release(id).unwrap();
    }
}

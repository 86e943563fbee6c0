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

/// A `[start, end)` byte-index pair into a caller-supplied view. Index 0
/// of a capture vector is always the whole match; subsequent indices
/// correspond to capturing groups in syntactic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    /// Sentinel for a capturing group that did not participate in the
    /// match, per spec.md §4.1.
    pub const ABSENT: ByteRange = ByteRange {
        start: usize::MAX,
        end: usize::MAX,
    };

    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_absent(&self) -> bool {
        *self == Self::ABSENT
    }

    pub fn len(&self) -> usize {
        if self.is_absent() {
            0
        } else {
            self.end - self.start
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slices `view` by this range, or `None` for an absent group.
    pub fn slice<'v>(&self, view: &'v [u8]) -> Option<&'v [u8]> {
        if self.is_absent() {
            None
        } else {
            view.get(self.start..self.end)
        }
    }
}

/// Whether `match_with_captures` requires the match to begin at byte 0
/// of the view, or may begin anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Anchored,
    Unanchored,
}

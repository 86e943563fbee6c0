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

//! Engine Interface (EI): the abstract adapter over the underlying
//! regex engine (spec.md §4.1), concretely implemented over the real
//! `regex` crate's byte-oriented engine.

mod artifact;
mod byte_range;
mod re2;

pub use artifact::{estimate_approx_bytes, CompiledArtifact, Introspection};
pub use byte_range::{ByteRange, MatchMode};
pub use re2::{
    compile, find_all, full_match, match_with_captures, partial_match, quote_literal,
    replace_all, replace_first, rewrite, validate_rewrite,
};

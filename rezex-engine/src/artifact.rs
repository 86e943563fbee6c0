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

use std::collections::HashMap;

use regex::bytes::Regex;

/// A compiled, immutable pattern. Safe to share across threads for
/// read-only use once built; `regex::bytes::Regex` already guarantees
/// this (it is `Sync`), so no additional synchronization is needed here.
#[derive(Debug)]
pub struct CompiledArtifact {
    regex: Regex,
    source: Box<[u8]>,
    approx_bytes: u64,
}

/// Heuristic constants for `approx_bytes`. `regex::bytes::Regex` does
/// not expose its compiled program's memory footprint directly (that is
/// an internal detail of `regex-automata`), so capacity accounting uses
/// a source-length-proportional estimate plus a fixed per-artifact
/// overhead, in the spirit of spec.md §3's "engine-reported size
/// estimate" rather than an exact figure.
const ENGINE_BYTES_PER_SOURCE_BYTE: u64 = 64;
const ENGINE_FIXED_OVERHEAD_BYTES: u64 = 256;

pub fn estimate_approx_bytes(source: &[u8]) -> u64 {
    source.len() as u64 * ENGINE_BYTES_PER_SOURCE_BYTE + ENGINE_FIXED_OVERHEAD_BYTES
}

impl CompiledArtifact {
    pub(crate) fn new(regex: Regex, source: Box<[u8]>) -> Self {
        let approx_bytes = estimate_approx_bytes(&source);
        Self {
            regex,
            source,
            approx_bytes,
        }
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    pub fn approx_bytes(&self) -> u64 {
        self.approx_bytes
    }

    pub fn introspect(&self) -> Introspection {
        let group_count = self.regex.captures_len();
        let mut named_groups = HashMap::new();
        let mut group_names = HashMap::new();
        for (index, name) in self.regex.capture_names().enumerate() {
            if let Some(name) = name {
                named_groups.insert(name.to_string(), index);
                group_names.insert(index, name.to_string());
            }
        }
        Introspection {
            group_count,
            named_groups,
            group_names,
            approx_bytes: self.approx_bytes,
            program_size: self.regex.as_str().len(),
            fixed_group_count: self.regex.static_captures_len(),
        }
    }
}

/// Engine-level introspection of a compiled artifact (spec.md §4.1),
/// plus one supplement: `fixed_group_count` mirrors the original RE2
/// family's notion of a statically-known capture count, additive to the
/// named fields spec.md already requires.
#[derive(Debug, Clone)]
pub struct Introspection {
    pub group_count: usize,
    pub named_groups: HashMap<String, usize>,
    pub group_names: HashMap<usize, String>,
    pub approx_bytes: u64,
    pub program_size: usize,
    pub fixed_group_count: Option<usize>,
}

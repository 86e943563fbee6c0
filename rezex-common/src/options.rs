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

use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Byte interpretation of the input the compiled pattern is matched
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
}

/// The recognized engine-relevant compilation options. This record,
/// paired with the pattern source, is the compilation key (spec.md §3).
///
/// The per-options hash (not the combined source+options key) is
/// memoized on the value itself so that repeated lookups for the same
/// options against many different sources do not re-pack the bitfield
/// every time.
#[derive(Debug)]
pub struct PatternOptions {
    pub posix_syntax: bool,
    pub longest_match: bool,
    pub literal: bool,
    pub never_newline: bool,
    pub dot_matches_newline: bool,
    pub never_capture: bool,
    pub case_sensitive: bool,
    pub perl_classes: bool,
    pub word_boundary: bool,
    pub one_line: bool,
    pub encoding: Encoding,
    pub max_memory_bytes: u64,
    /// 0 means "not yet computed", matching spec.md §6's reserved
    /// sentinel.
    cached_options_hash: AtomicU64,
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            posix_syntax: false,
            longest_match: false,
            literal: false,
            never_newline: false,
            dot_matches_newline: false,
            never_capture: false,
            case_sensitive: true,
            perl_classes: false,
            word_boundary: false,
            one_line: false,
            encoding: Encoding::Utf8,
            max_memory_bytes: 8 << 20,
            cached_options_hash: AtomicU64::new(0),
        }
    }
}

impl Clone for PatternOptions {
    fn clone(&self) -> Self {
        Self {
            posix_syntax: self.posix_syntax,
            longest_match: self.longest_match,
            literal: self.literal,
            never_newline: self.never_newline,
            dot_matches_newline: self.dot_matches_newline,
            never_capture: self.never_capture,
            case_sensitive: self.case_sensitive,
            perl_classes: self.perl_classes,
            word_boundary: self.word_boundary,
            one_line: self.one_line,
            encoding: self.encoding,
            max_memory_bytes: self.max_memory_bytes,
            cached_options_hash: AtomicU64::new(self.cached_options_hash.load(Ordering::Relaxed)),
        }
    }
}

impl PatternOptions {
    /// Packs the booleans into bits 0-10, the encoding into bit 11, and
    /// the low 32 bits of `max_memory_bytes` into bits 13-44, exactly as
    /// spec.md §6 prescribes. 0 is reserved for "not yet computed", so a
    /// genuine all-zero packing is nudged to 1.
    pub fn options_hash(&self) -> u64 {
        let cached = self.cached_options_hash.load(Ordering::Relaxed);
        if cached != 0 {
            return cached;
        }
        let computed = self.pack_bits();
        let computed = if computed == 0 { 1 } else { computed };
        self.cached_options_hash.store(computed, Ordering::Relaxed);
        computed
    }

    fn pack_bits(&self) -> u64 {
        let mut bits: u64 = 0;
        let mut flag = |set: bool, bit: u32| {
            if set {
                bits |= 1 << bit;
            }
        };
        flag(self.posix_syntax, 0);
        flag(self.longest_match, 1);
        flag(self.literal, 2);
        flag(self.never_newline, 3);
        flag(self.dot_matches_newline, 4);
        flag(self.never_capture, 5);
        flag(self.case_sensitive, 6);
        flag(self.perl_classes, 7);
        flag(self.word_boundary, 8);
        flag(self.one_line, 9);
        let encoding_bit = matches!(self.encoding, Encoding::Latin1) as u64;
        bits |= encoding_bit << 11;
        let mem_low32 = self.max_memory_bytes & 0xFFFF_FFFF;
        bits |= mem_low32 << 13;
        bits
    }
}

/// Fixed (not per-process-random) seeds: the pattern cache key only
/// needs to be stable for the lifetime of one process, but determinism
/// makes the cache trivially testable.
const KEY_SEEDS: (u64, u64, u64, u64) = (
    0x5bd1_e995_a4e3_1c27,
    0x9e37_79b9_7f4a_7c15,
    0xc2b2_ae3d_27d4_eb4f,
    0x1656_67b1_9e37_79f9,
);

/// `hash(source, options)`, the compilation key from spec.md §3/§4.2.
pub fn pattern_key(source: &[u8], options: &PatternOptions) -> u64 {
    let build = ahash::RandomState::with_seeds(KEY_SEEDS.0, KEY_SEEDS.1, KEY_SEEDS.2, KEY_SEEDS.3);
    let mut hasher = build.build_hasher();
    source.hash(&mut hasher);
    options.options_hash().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_hash_is_memoized_and_stable() {
        let opts = PatternOptions::default();
        let h1 = opts.options_hash();
        let h2 = opts.options_hash();
        assert_eq!(h1, h2);
        assert_ne!(h1, 0);
    }

    #[test]
    fn distinct_options_yield_distinct_keys() {
        let a = PatternOptions::default();
        let mut b = PatternOptions::default();
        b.case_sensitive = false;
        assert_ne!(pattern_key(b"abc", &a), pattern_key(b"abc", &b));
    }

    #[test]
    fn same_source_and_options_yield_same_key() {
        let a = PatternOptions::default();
        let b = PatternOptions::default();
        assert_eq!(pattern_key(b"abc", &a), pattern_key(b"abc", &b));
    }
}

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

//! The concrete Engine Interface (EI) implementation, over the real
//! `regex` crate's byte-oriented, RE2-style (linear-time,
//! non-backtracking) engine. `regex::bytes::Regex` is treated as the
//! black box spec.md §1 describes: this module only adapts its API
//! shape to the one spec.md §4.1 names.

use rezex_common::{EngineError, Encoding, PatternOptions};

use crate::artifact::CompiledArtifact;
use crate::byte_range::{ByteRange, MatchMode};

/// `compile(source, options) -> Ok((artifact, approx_bytes)) | Err(..)`.
///
/// `literal` and `never_capture` are honored by rewriting the source
/// before handing it to `RegexBuilder`, since the underlying crate has
/// no direct equivalent flags for either. `posix_syntax`'s
/// `perl_classes`/`word_boundary` gating is *not* enforced: the
/// underlying engine has no POSIX mode switch, so `\d \s \w \b \B`
/// remain available regardless of those two flags when `posix_syntax`
/// is set. `longest_match` is accepted but has no effect at this layer
/// for the same reason (`regex::bytes::Regex` only offers
/// leftmost-first semantics; leftmost-longest lives one layer down, in
/// `regex-automata`, which this adapter does not reach into).
pub fn compile(
    source: &[u8],
    options: &PatternOptions,
) -> Result<(CompiledArtifact, u64), EngineError> {
    let text = String::from_utf8(source.to_vec())
        .map_err(|e| EngineError::Unexpected(format!("pattern source is not valid UTF-8: {e}")))?;

    let pattern = if options.literal {
        regex::escape(&text)
    } else if options.never_capture {
        strip_capturing_groups(&text)
    } else {
        text
    };

    let mut builder = regex::bytes::RegexBuilder::new(&pattern);
    builder
        .case_insensitive(!options.case_sensitive)
        .multi_line(!options.one_line)
        .dot_matches_new_line(options.dot_matches_newline)
        .unicode(!matches!(options.encoding, Encoding::Latin1))
        .size_limit(options.max_memory_bytes as usize)
        .dfa_size_limit(options.max_memory_bytes as usize);

    if options.never_newline {
        // Best-effort: the crate has no switch for "negated classes
        // never match newline" independent of `.`; this only covers the
        // `.` case. TODO: rewrite negated character classes via
        // `regex-syntax`'s `Ast` to exclude `\n` for full fidelity.
        builder.dot_matches_new_line(false);
    }

    let regex = builder.build().map_err(|e| EngineError::CompilationRejected {
        message: e.to_string(),
        offending_fragment: offending_fragment(&pattern),
    })?;

    let artifact = CompiledArtifact::new(regex, source.to_vec().into_boxed_slice());
    let approx_bytes = artifact.approx_bytes();
    Ok((artifact, approx_bytes))
}

/// Independently re-parses `pattern` with `regex-syntax` to recover a
/// byte span for the failure, since `regex::Error`'s `Display` embeds a
/// formatted diagnostic but exposes no structured span of its own. Only
/// syntax/translation failures carry a span this way; a builder-only
/// failure (e.g. a size-limit rejection on an otherwise-valid pattern)
/// re-parses successfully here and yields `None`.
fn offending_fragment(pattern: &str) -> Option<String> {
    let err = regex_syntax::Parser::new().parse(pattern).err()?;
    let span = match &err {
        regex_syntax::Error::Parse(e) => e.span(),
        regex_syntax::Error::Translate(e) => e.span(),
        _ => return None,
    };
    pattern
        .get(span.start.offset..span.end.offset)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Rewrites unescaped, non-`(?...)` opening parens into `(?:`. Scans
/// byte-by-byte tracking escape and character-class state so that
/// `\(` and `[(]` are left untouched.
fn strip_capturing_groups(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut in_class = false;
    let mut escaped = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let c = b as char;
        if escaped {
            out.push(c);
            escaped = false;
            i += 1;
            continue;
        }
        match b {
            b'\\' => {
                escaped = true;
                out.push(c);
            }
            b'[' if !in_class => {
                in_class = true;
                out.push(c);
            }
            b']' if in_class => {
                in_class = false;
                out.push(c);
            }
            b'(' if !in_class => {
                if bytes.get(i + 1) == Some(&b'?') {
                    out.push(c);
                } else {
                    out.push_str("(?:");
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

pub fn full_match(artifact: &CompiledArtifact, view: &[u8]) -> bool {
    match artifact.regex().find(view) {
        Some(m) => m.start() == 0 && m.end() == view.len(),
        None => false,
    }
}

pub fn partial_match(artifact: &CompiledArtifact, view: &[u8]) -> bool {
    artifact.regex().is_match(view)
}

pub fn match_with_captures(
    artifact: &CompiledArtifact,
    view: &[u8],
    mode: MatchMode,
) -> Option<Vec<ByteRange>> {
    let captures = artifact.regex().captures(view)?;
    if mode == MatchMode::Anchored && captures.get(0).map(|m| m.start()) != Some(0) {
        return None;
    }
    Some(captures_to_ranges(&captures))
}

fn captures_to_ranges(captures: &regex::bytes::Captures<'_>) -> Vec<ByteRange> {
    (0..captures.len())
        .map(|i| match captures.get(i) {
            Some(m) => ByteRange::new(m.start(), m.end()),
            None => ByteRange::ABSENT,
        })
        .collect()
}

/// Lazily walks every non-overlapping leftmost match in `view`. Finite
/// and restartable: calling this again from scratch re-walks from the
/// start, it carries no state of its own.
pub fn find_all<'v>(
    artifact: &'v CompiledArtifact,
    view: &'v [u8],
) -> impl Iterator<Item = Vec<ByteRange>> + 'v {
    artifact
        .regex()
        .captures_iter(view)
        .map(|captures| captures_to_ranges(&captures))
}

pub fn replace_first(artifact: &CompiledArtifact, view: &[u8], rewrite: &[u8]) -> (Vec<u8>, bool) {
    let Some(captures) = artifact.regex().captures(view) else {
        return (view.to_vec(), false);
    };
    let ranges = captures_to_ranges(&captures);
    let whole = ranges[0];
    let rewritten = apply_rewrite(rewrite, view, &ranges).unwrap_or_else(|_| rewrite.to_vec());

    let mut out = Vec::with_capacity(view.len());
    out.extend_from_slice(&view[..whole.start]);
    out.extend_from_slice(&rewritten);
    out.extend_from_slice(&view[whole.end..]);
    (out, true)
}

pub fn replace_all(artifact: &CompiledArtifact, view: &[u8], rewrite: &[u8]) -> (Vec<u8>, usize) {
    let mut out = Vec::with_capacity(view.len());
    let mut last_end = 0usize;
    let mut count = 0usize;
    for captures in artifact.regex().captures_iter(view) {
        let ranges = captures_to_ranges(&captures);
        let whole = ranges[0];
        out.extend_from_slice(&view[last_end..whole.start]);
        let rewritten = apply_rewrite(rewrite, view, &ranges).unwrap_or_else(|_| rewrite.to_vec());
        out.extend_from_slice(&rewritten);
        last_end = whole.end;
        count += 1;
    }
    out.extend_from_slice(&view[last_end..]);
    (out, count)
}

/// Byte-wise literal quoting, independent of UTF-8 validity (spec.md
/// §4.1's `quote_literal` operates on arbitrary byte sequences, not
/// necessarily text, so this does not go through `regex::escape`, which
/// is `&str`-only).
const REGEX_METACHARACTERS: &[u8] = b"\\.+*?()|[]{}^$";

pub fn quote_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for &b in bytes {
        if REGEX_METACHARACTERS.contains(&b) {
            out.push(b'\\');
        }
        out.push(b);
    }
    out
}

/// Applies a rewrite template using supplied capture byte ranges.
/// `\0` is the whole match, `\N` the N-th group, `\\` an escaped
/// backslash. Fails if the template references a group index the
/// pattern does not have.
pub fn rewrite(
    rewrite_template: &[u8],
    view: &[u8],
    captures: &[ByteRange],
) -> Result<Vec<u8>, EngineError> {
    apply_rewrite(rewrite_template, view, captures)
}

/// Parses a run of ASCII-digit bytes (as matched by the `\N` scan
/// above, so the bytes are always valid UTF-8) into a group index. A
/// digit run that overflows `usize` cannot name any real capture group,
/// so it is folded into `usize::MAX` rather than panicking - the
/// out-of-range check downstream (`captures.get(index)` /
/// `index >= group_count`) then rejects it the same way any other
/// out-of-range reference is rejected.
fn parse_group_index(digits: &[u8]) -> usize {
    std::str::from_utf8(digits)
        .expect("digit run is always valid UTF-8")
        .parse()
        .unwrap_or(usize::MAX)
}

fn apply_rewrite(
    rewrite_template: &[u8],
    view: &[u8],
    captures: &[ByteRange],
) -> Result<Vec<u8>, EngineError> {
    let mut out = Vec::with_capacity(rewrite_template.len());
    let mut i = 0;
    while i < rewrite_template.len() {
        let b = rewrite_template[i];
        if b == b'\\' && i + 1 < rewrite_template.len() {
            let next = rewrite_template[i + 1];
            if next.is_ascii_digit() {
                let start = i + 1;
                let mut j = start;
                while j < rewrite_template.len() && rewrite_template[j].is_ascii_digit() {
                    j += 1;
                }
                let index = parse_group_index(&rewrite_template[start..j]);
                let range = captures
                    .get(index)
                    .ok_or(EngineError::InvalidRewriteGroup { index })?;
                if let Some(slice) = range.slice(view) {
                    out.extend_from_slice(slice);
                }
                i = j;
                continue;
            } else if next == b'\\' {
                out.push(b'\\');
                i += 2;
                continue;
            }
        }
        out.push(b);
        i += 1;
    }
    Ok(out)
}

/// `validate_rewrite(artifact, rewrite) -> Ok | Err`: checks every
/// `\N` reference against the pattern's group count without needing an
/// actual match.
pub fn validate_rewrite(artifact: &CompiledArtifact, rewrite_template: &[u8]) -> Result<(), EngineError> {
    let group_count = artifact.regex().captures_len();
    let mut i = 0;
    while i < rewrite_template.len() {
        let b = rewrite_template[i];
        if b == b'\\' && i + 1 < rewrite_template.len() {
            let next = rewrite_template[i + 1];
            if next.is_ascii_digit() {
                let start = i + 1;
                let mut j = start;
                while j < rewrite_template.len() && rewrite_template[j].is_ascii_digit() {
                    j += 1;
                }
                let index = parse_group_index(&rewrite_template[start..j]);
                if index >= group_count {
                    return Err(EngineError::InvalidRewriteGroup { index });
                }
                i = j;
                continue;
            } else if next == b'\\' {
                i += 2;
                continue;
            }
        }
        i += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_default(source: &str) -> CompiledArtifact {
        compile(source.as_bytes(), &PatternOptions::default()).unwrap().0
    }

    #[test]
    fn full_and_partial_match() {
        let artifact = compile_default(r"\d+");
        assert!(full_match(&artifact, b"12345"));
        assert!(!full_match(&artifact, b"12a45"));
        assert!(partial_match(&artifact, b"abc 42"));
    }

    #[test]
    fn capture_order() {
        let artifact = compile_default(r"([a-z]+)@([a-z]+)\.([a-z]+)");
        let ranges = match_with_captures(&artifact, b"user@example.com", MatchMode::Unanchored).unwrap();
        let strs: Vec<&str> = ranges
            .iter()
            .map(|r| std::str::from_utf8(r.slice(b"user@example.com").unwrap()).unwrap())
            .collect();
        assert_eq!(strs, vec!["user@example.com", "user", "example", "com"]);
    }

    #[test]
    fn named_groups_round_trip() {
        let artifact = compile_default(r"(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})");
        let info = artifact.introspect();
        assert_eq!(info.named_groups.get("y"), Some(&1));
        assert_eq!(info.named_groups.get("q"), None);
    }

    #[test]
    fn replace_all_counts_matches() {
        let artifact = compile_default(r"\d+");
        let (out, count) = replace_all(&artifact, b"Item 123 costs $456", b"XXX");
        assert_eq!(out, b"Item XXX costs $XXX");
        assert_eq!(count, 2);
    }

    #[test]
    fn replace_all_with_backreferences() {
        let artifact = compile_default(r"(\d{3})-(\d{4})");
        let (out, count) = replace_all(&artifact, b"Call 555-1234 or 555-5678", b"(\\1) \\2");
        assert_eq!(out, &b"Call (555) 1234 or (555) 5678"[..]);
        assert_eq!(count, 2);
    }

    #[test]
    fn quote_literal_round_trips() {
        let literal = b"a.b*c(d)";
        let quoted = quote_literal(literal);
        let (artifact, _) = compile(&quoted, &PatternOptions::default()).unwrap();
        assert!(full_match(&artifact, literal));
    }

    #[test]
    fn rewrite_rejects_out_of_range_group() {
        let artifact = compile_default(r"(a)(b)");
        let err = validate_rewrite(&artifact, b"\\5").unwrap_err();
        assert!(matches!(err, EngineError::InvalidRewriteGroup { index: 5 }));
    }

    #[test]
    fn rewrite_group_digit_overflow_is_rejected_not_a_panic() {
        let artifact = compile_default(r"(a)(b)");
        let huge: &[u8] = b"\\99999999999999999999";
        assert!(validate_rewrite(&artifact, huge).is_err());

        let captures = match_with_captures(&artifact, b"ab", MatchMode::Unanchored).unwrap();
        let err = rewrite(huge, b"ab", &captures).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRewriteGroup { .. }));
    }

    #[test]
    fn invalid_pattern_carries_offending_fragment() {
        let err = compile(br"a(b", &PatternOptions::default()).unwrap_err();
        match err {
            EngineError::CompilationRejected {
                message,
                offending_fragment,
            } => {
                assert!(!message.is_empty());
                let fragment = offending_fragment.expect("unclosed group has a span");
                assert!(!fragment.is_empty());
                assert!(r"a(b".contains(&fragment));
            }
            other => panic!("expected CompilationRejected, got {other:?}"),
        }
    }

    #[test]
    fn never_capture_disables_groups() {
        let mut options = PatternOptions::default();
        options.never_capture = true;
        let (artifact, _) = compile(br"(a)(b)", &options).unwrap();
        // group 0 only; the two parens became non-capturing.
        assert_eq!(artifact.regex().captures_len(), 1);
    }
}

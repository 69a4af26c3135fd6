//! Loose dotted-decimal candidate extraction.
//!
//! Each component is pre-filtered to `0..=255` with an optional leading `0` or
//! `1`, so `"010.1.1.1"` is a candidate even though it fails the strict
//! grammar. Matching is leftmost-first, non-overlapping, in order of
//! appearance.

use std::sync::OnceLock;

use regex::bytes::Regex;

/// The fixed candidate pattern.
pub const CANDIDATE_PATTERN: &str =
    r"(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)";

fn candidate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CANDIDATE_PATTERN).expect("candidate pattern must compile"))
}

/// All candidate substrings of `haystack`, in order.
#[must_use]
pub fn find_candidates(haystack: &[u8]) -> Vec<&[u8]> {
    candidate_regex()
        .find_iter(haystack)
        .map(|m| m.as_bytes())
        .collect()
}

/// Candidates of `key` followed by candidates of `value`.
#[must_use]
pub fn candidates_in<'a>(key: &'a [u8], value: &'a [u8]) -> Vec<&'a [u8]> {
    let mut found = find_candidates(key);
    found.extend(find_candidates(value));
    found
}

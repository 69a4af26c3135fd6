//! Dotted-decimal IPv4 handling for the scanner.
//!
//! Two halves with deliberately different strictness:
//! - [`find_candidates`] pulls every loosely address-shaped substring out of
//!   arbitrary bytes (leading zeros allowed);
//! - [`is_strict_ipv4`] applies the grammar of Go 1.17+ `net.ParseIP`, which
//!   rejects any multi-digit component starting with `0`.

pub mod extract;
pub mod grammar;

pub use extract::{CANDIDATE_PATTERN, candidates_in, find_candidates};
pub use grammar::{IPV4_LEN, is_strict_ipv4, parse_strict_ipv4};

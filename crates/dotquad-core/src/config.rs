//! Scan configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dotquad_bolt::{DEFAULT_LOCK_TIMEOUT, OpenOptions};
use dotquad_error::{DotquadError, Result};

/// Bucket holding etcd's MVCC revision records.
pub const DEFAULT_BUCKET: &str = "key";

/// Iteration order over the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    /// Newest revision first.
    #[default]
    Descending,
    /// Oldest revision first.
    Ascending,
}

/// Everything a scan needs to know, passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Bucket to walk.
    pub bucket: String,
    /// Maximum number of records to visit; 0 visits all of them.
    pub limit: u64,
    /// Decode values as `mvccpb.KeyValue` and scan the logical key/value.
    pub decode: bool,
    /// Report every record containing a candidate, valid or not.
    pub match_all: bool,
    /// Dump every record visited.
    pub debug: bool,
    pub direction: Direction,
    /// How long to wait for the store lock; zero waits forever.
    pub lock_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_owned(),
            limit: 0,
            decode: true,
            match_all: false,
            debug: false,
            direction: Direction::Descending,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl ScanConfig {
    /// Options for opening the store.
    #[must_use]
    pub const fn open_options(&self) -> OpenOptions {
        OpenOptions {
            lock_timeout: self.lock_timeout,
        }
    }

    /// Whether `visited` records exhaust the limit.
    #[must_use]
    pub const fn limit_reached(&self, visited: u64) -> bool {
        self.limit != 0 && visited >= self.limit
    }
}

/// Resolve a user-supplied path to a store file.
///
/// A path whose name does not end in `db` is an etcd data directory; its
/// store lives at `member/snap/db` below it.
pub fn resolve_store_path(path: &Path) -> Result<PathBuf> {
    let resolved = if path.as_os_str().as_encoded_bytes().ends_with(b"db") {
        path.to_path_buf()
    } else {
        path.join("member").join("snap").join("db")
    };
    if !resolved.exists() {
        return Err(DotquadError::StoreNotFound { path: resolved });
    }
    Ok(resolved)
}

/// Largest duration component accepted by [`parse_duration`], in nanoseconds.
const MAX_NANOS: f64 = 1.8e19;

/// Parse a duration such as `10s`, `500ms`, `1m30s` or `0`.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. Components may carry a
/// decimal fraction (`1.5s`). A bare number is only accepted for zero.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".to_owned());
    }

    let invalid = || format!("invalid duration {input:?}");
    let mut rest = s;
    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid());
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let nanos_per_unit = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {input:?}")),
            other => return Err(format!("unknown unit {other:?} in duration {input:?}")),
        };
        let nanos = (value * nanos_per_unit).round();
        if !nanos.is_finite() || nanos >= MAX_NANOS {
            return Err(invalid());
        }
        let part = Duration::from_nanos(nanos as u64);
        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = tail;
    }
    Ok(total)
}

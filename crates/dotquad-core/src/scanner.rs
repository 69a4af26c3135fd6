//! Bucket walk and address validation.

use std::io::Write;
use std::path::Path;

use dotquad_bolt::{Bucket, Cursor, Db, Entry};
use dotquad_error::{DotquadError, Result};
use dotquad_ipv4::{candidates_in, is_strict_ipv4};
use dotquad_mvcc::{Revision, decode_record};
use tracing::{debug, info};

use crate::config::{Direction, ScanConfig};
use crate::report;

/// One record whose key or value held addresses failing the strict grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Working key (logical key when decoding, raw key otherwise).
    pub key: Vec<u8>,
    /// Offending candidates, in match order.
    pub invalid: Vec<String>,
}

/// Summary of a completed walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub records_visited: u64,
    pub candidates_seen: u64,
    pub findings: Vec<Finding>,
}

impl ScanOutcome {
    /// No invalid address was seen.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    /// Total number of invalid candidates across all findings.
    #[must_use]
    pub fn invalid_count(&self) -> usize {
        self.findings.iter().map(|f| f.invalid.len()).sum()
    }

    /// Turn findings into the scan verdict.
    pub fn into_result(self) -> Result<Self> {
        if self.is_clean() {
            Ok(self)
        } else {
            Err(DotquadError::InvalidAddressesFound {
                count: self.invalid_count(),
            })
        }
    }
}

/// Walks one bucket, reporting to a writer.
#[derive(Debug, Clone, Copy)]
pub struct BucketScanner<'a> {
    config: &'a ScanConfig,
}

impl<'a> BucketScanner<'a> {
    #[must_use]
    pub const fn new(config: &'a ScanConfig) -> Self {
        Self { config }
    }

    /// Visit records in the configured order until the bucket or the limit
    /// is exhausted.
    ///
    /// Decode failures abort the walk and are returned as errors. Invalid
    /// addresses never abort it; they accumulate in the outcome.
    pub fn scan(&self, bucket: &Bucket<'_>, out: &mut impl Write) -> Result<ScanOutcome> {
        let mut outcome = ScanOutcome::default();
        let mut cursor = bucket.cursor();
        let mut entry = self.start(&mut cursor)?;
        while let Some(current) = entry {
            self.visit(current, &mut outcome, out)?;
            outcome.records_visited += 1;
            if self.config.limit_reached(outcome.records_visited) {
                debug!(limit = self.config.limit, "record limit reached");
                break;
            }
            entry = self.advance(&mut cursor)?;
        }
        Ok(outcome)
    }

    fn start(&self, cursor: &mut Cursor<'_>) -> Result<Option<Entry>> {
        match self.config.direction {
            Direction::Descending => cursor.last(),
            Direction::Ascending => cursor.first(),
        }
    }

    fn advance(&self, cursor: &mut Cursor<'_>) -> Result<Option<Entry>> {
        match self.config.direction {
            Direction::Descending => cursor.prev(),
            Direction::Ascending => cursor.next(),
        }
    }

    fn visit(&self, entry: Entry, outcome: &mut ScanOutcome, out: &mut impl Write) -> Result<()> {
        let (key, value) = if self.config.decode {
            let revision = Revision::from_key(&entry.key)?;
            let kv = decode_record(&entry.value)?;
            if self.config.debug {
                writeln!(out, "{}", report::decoded_line(revision, &kv))?;
            }
            (kv.key, kv.value)
        } else {
            if self.config.debug {
                writeln!(out, "{}", report::raw_line(&entry.key, &entry.value))?;
            }
            (entry.key, entry.value)
        };

        let candidates = candidates_in(&key, &value);
        outcome.candidates_seen += candidates.len() as u64;
        if self.config.match_all && !candidates.is_empty() {
            writeln!(out, "{}", report::found_line(&candidates, &key))?;
        }

        let invalid: Vec<String> = candidates
            .iter()
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .filter(|c| !is_strict_ipv4(c))
            .collect();
        if !invalid.is_empty() {
            writeln!(out, "{}", report::warning_line(&invalid, &key))?;
            debug!(
                key = %String::from_utf8_lossy(&key),
                invalid = invalid.len(),
                "invalid addresses in record"
            );
            outcome.findings.push(Finding { key, invalid });
        }
        Ok(())
    }
}

/// Open the store at `path`, walk the configured bucket and return the
/// verdict.
///
/// A clean walk yields the outcome; any invalid address yields
/// [`DotquadError::InvalidAddressesFound`] after the walk completes.
pub fn scan_store(path: &Path, config: &ScanConfig, out: &mut impl Write) -> Result<ScanOutcome> {
    let db = Db::open(path, &config.open_options())?;
    let tx = db.begin();
    let bucket = tx.bucket(config.bucket.as_bytes())?;
    let outcome = BucketScanner::new(config).scan(&bucket, out)?;
    out.flush()?;
    info!(
        path = %path.display(),
        txid = tx.id(),
        records = outcome.records_visited,
        candidates = outcome.candidates_seen,
        findings = outcome.findings.len(),
        "scan complete"
    );
    outcome.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(key: &str, invalid: &[&str]) -> Finding {
        Finding {
            key: key.as_bytes().to_vec(),
            invalid: invalid.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    #[test]
    fn test_clean_outcome_is_ok() {
        let outcome = ScanOutcome {
            records_visited: 4,
            candidates_seen: 2,
            findings: Vec::new(),
        };
        assert!(outcome.is_clean());
        assert_eq!(outcome.clone().into_result().unwrap(), outcome);
    }

    #[test]
    fn test_findings_become_error() {
        let outcome = ScanOutcome {
            records_visited: 2,
            candidates_seen: 3,
            findings: vec![finding("/a", &["01.1.1.1"]), finding("/b", &["1.01.1.1", "1.1.01.1"])],
        };
        assert_eq!(outcome.invalid_count(), 3);
        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, DotquadError::InvalidAddressesFound { count: 3 }));
        assert_eq!(err.to_string(), "Invalid IPv4 addresses found");
        assert!(!err.is_fatal());
    }
}

//! Scan an etcd store for IPv4 addresses that strict parsers reject.
//!
//! The scanner walks the revision bucket of a bbolt store, optionally decodes
//! each value as an etcd `KeyValue`, extracts every dotted-quad-shaped
//! substring from the key and value, and flags the ones with leading zeros or
//! out-of-range components. Report lines go to a caller-supplied writer.

pub mod config;
pub mod report;
pub mod scanner;

pub use config::{DEFAULT_BUCKET, Direction, ScanConfig, parse_duration, resolve_store_path};
pub use scanner::{BucketScanner, Finding, ScanOutcome, scan_store};

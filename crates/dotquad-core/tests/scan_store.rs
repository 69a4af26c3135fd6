//! End-to-end scans over etcd-shaped fixture stores.

use std::path::{Path, PathBuf};

use dotquad_bolt::{Db, OpenOptions};
use dotquad_core::{BucketScanner, Direction, ScanConfig, ScanOutcome, scan_store};
use dotquad_error::{DotquadError, ErrorKind};
use dotquad_harness::{StoreBuilder, etcd_entry, etcd_store};
use proptest::prelude::*;
use tempfile::TempDir;

// ─── Helpers ───────────────────────────────────────────────────────────

fn write_store(builder: &StoreBuilder) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db");
    builder.write_to(&path).expect("write fixture");
    (dir, path)
}

/// Run the scanner directly so the outcome survives findings.
fn scan_bucket(path: &Path, config: &ScanConfig) -> (dotquad_error::Result<ScanOutcome>, String) {
    let db = Db::open(path, &OpenOptions::default()).expect("open");
    let tx = db.begin();
    let bucket = tx.bucket(config.bucket.as_bytes()).expect("bucket");
    let mut out = Vec::new();
    let result = BucketScanner::new(config).scan(&bucket, &mut out);
    (result, String::from_utf8(out).expect("utf8 report"))
}

fn good_entries() -> Vec<(Vec<u8>, Vec<u8>)> {
    vec![
        etcd_entry(2, "/registry/services/specs/default/kubernetes", "clusterIP 10.96.0.1"),
        etcd_entry(3, "/registry/pods/kube-system/dns", "podIP 192.168.1.10"),
        etcd_entry(4, "/registry/configmaps/default/plain", "no addresses here"),
        etcd_entry(5, "/registry/nodes/0.0.0.0", "255.255.255.255"),
    ]
}

/// Revision prefixes of the `--debug` lines, in print order.
fn debug_revisions(report: &str) -> Vec<&str> {
    report
        .lines()
        .map(|line| line.split(',').next().expect("rev prefix"))
        .collect()
}

/// Render an address, padding flagged octets below 100 with a zero.
fn render_address(octets: &[(u8, bool)]) -> String {
    octets
        .iter()
        .map(|&(octet, pad)| {
            if pad && octet < 100 {
                format!("0{octet}")
            } else {
                octet.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn funny_entries() -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut entries = good_entries();
    entries.push(etcd_entry(6, "/registry/services/endpoints/x", "subset 10.010.0.1"));
    entries.push(etcd_entry(7, "/registry/services/specs/y", "ip 172.16.0.1"));
    entries
}

// ─── Verdict ───────────────────────────────────────────────────────────

#[test]
fn test_clean_store_passes() {
    let (_dir, path) = write_store(&etcd_store(good_entries()));
    let mut out = Vec::new();
    let outcome = scan_store(&path, &ScanConfig::default(), &mut out).expect("clean scan");
    assert!(out.is_empty(), "clean scan prints nothing by default");
    assert_eq!(outcome.records_visited, 4);
    assert_eq!(outcome.candidates_seen, 4);
    assert!(outcome.is_clean());
}

#[test]
fn test_funny_store_fails_and_names_the_address() {
    let (_dir, path) = write_store(&etcd_store(funny_entries()));
    let mut out = Vec::new();
    let err = scan_store(&path, &ScanConfig::default(), &mut out).unwrap_err();
    assert!(matches!(err, DotquadError::InvalidAddressesFound { count: 1 }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::InvalidAddress);
    let report = String::from_utf8(out).expect("utf8");
    assert_eq!(
        report,
        "WARNING Invalid IPv4 addresses [\"10.010.0.1\"] on key: \"/registry/services/endpoints/x\"\n"
    );
}

#[test]
fn test_findings_do_not_stop_the_walk() {
    let (_dir, path) = write_store(&etcd_store(funny_entries()));
    let (result, _) = scan_bucket(&path, &ScanConfig::default());
    let outcome = result.expect("findings are not scan errors");
    assert_eq!(outcome.records_visited, 6);
    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].key, b"/registry/services/endpoints/x");
    assert_eq!(outcome.findings[0].invalid, ["10.010.0.1"]);
}

#[test]
fn test_candidates_from_key_and_value_are_reported_together() {
    let entries = vec![etcd_entry(
        9,
        "/registry/nodes/010.1.1.1",
        "addr 10.1.1.1 and 1.2.3.04",
    )];
    let (_dir, path) = write_store(&etcd_store(entries));
    let config = ScanConfig {
        match_all: true,
        ..ScanConfig::default()
    };
    let (result, report) = scan_bucket(&path, &config);
    let outcome = result.expect("scan");
    assert_eq!(outcome.candidates_seen, 3);
    assert_eq!(
        report,
        concat!(
            "IPv4 addresses found [\"010.1.1.1\" \"10.1.1.1\" \"1.2.3.04\"] on key: \"/registry/nodes/010.1.1.1\"\n",
            "WARNING Invalid IPv4 addresses [\"010.1.1.1\" \"1.2.3.04\"] on key: \"/registry/nodes/010.1.1.1\"\n",
        )
    );
}

#[test]
fn test_missing_bucket() {
    let builder = StoreBuilder::new().inline_bucket("meta", [(b"k".to_vec(), b"v".to_vec())]);
    let (_dir, path) = write_store(&builder);
    let err = scan_store(&path, &ScanConfig::default(), &mut Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.is_fatal());
}

// ─── Order and limit ───────────────────────────────────────────────────

#[test]
fn test_limit_visits_newest_records_first() {
    let entries: Vec<_> = (1..=40)
        .map(|rev| etcd_entry(rev, &format!("/k/{rev}"), "v"))
        .collect();
    let builder = etcd_store(entries).max_leaf_entries(4).max_branch_entries(3);
    let (_dir, path) = write_store(&builder);

    for limit in [1_u64, 3, 40, 41] {
        let config = ScanConfig {
            limit,
            debug: true,
            ..ScanConfig::default()
        };
        let (result, report) = scan_bucket(&path, &config);
        let outcome = result.expect("scan");
        let expected = limit.min(40);
        assert_eq!(outcome.records_visited, expected, "limit {limit}");

        let revisions = debug_revisions(&report);
        let want: Vec<String> = (0..expected)
            .map(|i| format!("rev={{main:{} sub:0}}", 40 - i))
            .collect();
        assert_eq!(revisions, want, "limit {limit}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_limit_bounds_records_visited(total in 1_i64..60, limit in 0_u64..80) {
        let entries: Vec<_> = (1..=total)
            .map(|rev| etcd_entry(rev, &format!("/k/{rev}"), "v"))
            .collect();
        let builder = etcd_store(entries).max_leaf_entries(3).max_branch_entries(3);
        let (_dir, path) = write_store(&builder);
        let config = ScanConfig {
            limit,
            debug: true,
            ..ScanConfig::default()
        };
        let (result, report) = scan_bucket(&path, &config);
        let outcome = result.expect("scan");

        let total = total.unsigned_abs();
        let expected = if limit == 0 { total } else { limit.min(total) };
        prop_assert_eq!(outcome.records_visited, expected);
        let want: Vec<String> = (0..expected)
            .map(|i| format!("rev={{main:{} sub:0}}", total - i))
            .collect();
        prop_assert_eq!(debug_revisions(&report), want);
    }

    #[test]
    fn test_raw_and_decoded_modes_agree_on_invalid_addresses(
        addresses in prop::collection::vec(
            prop::array::uniform4((any::<u8>(), any::<bool>())),
            1..12,
        ),
    ) {
        let entries: Vec<_> = addresses
            .iter()
            .zip(1_i64..)
            .map(|(octets, rev)| {
                let value = format!("ip {} end", render_address(octets));
                etcd_entry(rev, &format!("/k/{rev}"), &value)
            })
            .collect();
        let (_dir, path) = write_store(&etcd_store(entries));

        let decoded = scan_bucket(&path, &ScanConfig::default()).0.expect("decoded");
        let raw_config = ScanConfig {
            decode: false,
            ..ScanConfig::default()
        };
        let raw = scan_bucket(&path, &raw_config).0.expect("raw");

        let expected: Vec<Vec<String>> = addresses
            .iter()
            .rev()
            .filter(|octets| octets.iter().any(|&(octet, pad)| pad && octet < 100))
            .map(|octets| vec![render_address(octets)])
            .collect();
        let invalid = |outcome: &ScanOutcome| -> Vec<Vec<String>> {
            outcome.findings.iter().map(|f| f.invalid.clone()).collect()
        };
        prop_assert_eq!(invalid(&decoded), expected.clone());
        prop_assert_eq!(invalid(&raw), expected);
        prop_assert_eq!(raw.candidates_seen, decoded.candidates_seen);
    }
}

#[test]
fn test_ascending_order() {
    let entries: Vec<_> = (1..=5)
        .map(|rev| etcd_entry(rev, &format!("/k/{rev}"), "v"))
        .collect();
    let (_dir, path) = write_store(&etcd_store(entries));
    let config = ScanConfig {
        direction: Direction::Ascending,
        limit: 2,
        debug: true,
        ..ScanConfig::default()
    };
    let (result, report) = scan_bucket(&path, &config);
    assert_eq!(result.expect("scan").records_visited, 2);
    assert_eq!(
        report,
        concat!(
            "rev={main:1 sub:0}, value=[key \"/k/1\" | val \"v\" | created 1 | mod 1 | ver 1]\n",
            "rev={main:2 sub:0}, value=[key \"/k/2\" | val \"v\" | created 2 | mod 2 | ver 1]\n",
        )
    );
}

// ─── Decode modes ──────────────────────────────────────────────────────

#[test]
fn test_raw_mode_finds_the_same_addresses() {
    let (_dir, path) = write_store(&etcd_store(funny_entries()));
    let decoded = scan_bucket(&path, &ScanConfig::default()).0.expect("decoded");
    let raw_config = ScanConfig {
        decode: false,
        ..ScanConfig::default()
    };
    let raw = scan_bucket(&path, &raw_config).0.expect("raw");

    assert_eq!(raw.records_visited, decoded.records_visited);
    assert_eq!(raw.candidates_seen, decoded.candidates_seen);
    assert_eq!(raw.findings.len(), 1);
    assert_eq!(raw.findings[0].invalid, decoded.findings[0].invalid);
    // Raw mode reports the revision key, not the logical key.
    assert_eq!(raw.findings[0].key, etcd_entry(6, "", "").0);
}

#[test]
fn test_raw_debug_dump_quotes_binary_keys() {
    let (key, value) = (b"\x00\x01_k".to_vec(), b"plain".to_vec());
    let builder = StoreBuilder::new().bucket("key", [(key, value)]);
    let (_dir, path) = write_store(&builder);
    let config = ScanConfig {
        decode: false,
        debug: true,
        ..ScanConfig::default()
    };
    let (result, report) = scan_bucket(&path, &config);
    result.expect("raw scan ignores record encoding");
    assert_eq!(report, "key \"\\x00\\x01_k\" | val \"plain\"\n");
}

#[test]
fn test_undecodable_value_aborts_the_scan() {
    let mut entries = good_entries();
    entries.push((etcd_entry(10, "", "").0, b"\x0a\x05ab".to_vec()));
    let (_dir, path) = write_store(&etcd_store(entries));
    let (result, report) = scan_bucket(&path, &ScanConfig::default());
    let err = result.unwrap_err();
    assert!(matches!(err, DotquadError::MalformedRecord { .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(report.is_empty());
}

#[test]
fn test_short_revision_key_aborts_the_scan() {
    let (_, value) = etcd_entry(1, "/k", "1.1.1.1");
    let builder = StoreBuilder::new().bucket("key", [(b"short".to_vec(), value)]);
    let (_dir, path) = write_store(&builder);
    let err = scan_store(&path, &ScanConfig::default(), &mut Vec::new()).unwrap_err();
    assert!(
        matches!(err, DotquadError::ShortRevisionKey { len: 5, need: 17 }),
        "{err:?}"
    );
}

#[test]
fn test_decode_error_wins_over_earlier_findings() {
    let mut entries = funny_entries();
    entries.push((etcd_entry(1, "", "").0, b"\xff".to_vec()));
    let (_dir, path) = write_store(&etcd_store(entries));
    let mut out = Vec::new();
    let err = scan_store(&path, &ScanConfig::default(), &mut out).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);
    // The finding at revision 6 was reported before the walk reached revision 1.
    assert!(String::from_utf8(out).expect("utf8").starts_with("WARNING"));
}

//! Runs the `dotquad` binary against fixture stores.

use std::path::Path;
use std::process::{Command, Output};

use dotquad_harness::{etcd_entry, etcd_store};

fn dotquad(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dotquad"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run dotquad")
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("utf8 stdout")
}

fn stderr(output: &Output) -> String {
    String::from_utf8(output.stderr.clone()).expect("utf8 stderr")
}

/// Lay out an etcd data dir with the store at `member/snap/db`.
fn data_dir(root: &Path, entries: Vec<(Vec<u8>, Vec<u8>)>) -> String {
    let snap = root.join("etcd").join("member").join("snap");
    std::fs::create_dir_all(&snap).expect("mkdir");
    etcd_store(entries).write_to(&snap.join("db")).expect("write fixture");
    root.join("etcd").display().to_string()
}

#[test]
fn test_clean_data_dir_exits_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = data_dir(dir.path(), vec![etcd_entry(1, "/svc/a", "10.0.0.1")]);
    let output = dotquad(&["find-ips", &path]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).is_empty());
}

#[test]
fn test_funny_db_file_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("snapshot.db");
    etcd_store(vec![
        etcd_entry(1, "/svc/a", "10.0.0.1"),
        etcd_entry(2, "/svc/b", "10.0.0.01"),
    ])
    .write_to(&file)
    .expect("write fixture");

    let output = dotquad(&["find-ips", file.to_str().expect("utf8 path"), "--match-all"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(
        stdout(&output),
        concat!(
            "IPv4 addresses found [\"10.0.0.01\"] on key: \"/svc/b\"\n",
            "WARNING Invalid IPv4 addresses [\"10.0.0.01\"] on key: \"/svc/b\"\n",
            "IPv4 addresses found [\"10.0.0.1\"] on key: \"/svc/a\"\n",
        )
    );
    assert!(stderr(&output).contains("Invalid IPv4 addresses found"));
}

#[test]
fn test_limit_and_debug() {
    let dir = tempfile::tempdir().expect("tempdir");
    let entries = (1..=3).map(|rev| etcd_entry(rev, "/k", "v")).collect();
    let path = data_dir(dir.path(), entries);
    let output = dotquad(&["find-ips", &path, "--limit", "1", "--debug"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "rev={main:3 sub:0}, value=[key \"/k\" | val \"v\" | created 3 | mod 3 | ver 1]\n"
    );
}

#[test]
fn test_missing_path_exits_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("nowhere");
    let output = dotquad(&["find-ips", missing.to_str().expect("utf8 path")]);
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("member/snap/db"), "stderr: {err}");
    assert!(err.contains("hint:"), "stderr: {err}");
}

#[test]
fn test_usage_error_exits_two() {
    let output = dotquad(&["find-ips"]);
    assert_eq!(output.status.code(), Some(2));
}

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn inputs() -> (tempfile::NamedTempFile, tempfile::NamedTempFile) {
    let mut accounts = tempfile::NamedTempFile::new().unwrap();
    writeln!(accounts, "account,balance").unwrap();
    writeln!(accounts, "alice,100.0").unwrap();

    let mut events = tempfile::NamedTempFile::new().unwrap();
    writeln!(events).unwrap();
    (accounts, events)
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let (accounts, events) = inputs();

    let mut cmd = Command::new(cargo_bin!("saga-pay"));
    cmd.arg(events.path())
        .arg("--accounts")
        .arg(accounts.path())
        .arg("--db-path")
        .arg("some_db");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("alice,100.0"))
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let (accounts, events) = inputs();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("saga-pay"));
    cmd.arg(events.path())
        .arg("--accounts")
        .arg(accounts.path())
        .arg("--db-path")
        .arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
}

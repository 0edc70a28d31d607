use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn config_file() -> tempfile::NamedTempFile {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "base_url = \"https://shop.example.com\"").unwrap();
    config
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let config = config_file();

    let mut cmd = Command::new(cargo_bin!("paygate"));
    cmd.arg("show")
        .arg("1")
        .arg("--config")
        .arg(config.path())
        .arg("--db-path")
        .arg("some_db");

    // The in-memory fallback is empty, so the lookup itself fails.
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let config = config_file();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("paygate"));
    cmd.arg("show")
        .arg("1")
        .arg("--config")
        .arg(config.path())
        .arg("--db-path")
        .arg(&db_path);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("WARNING").not());
}

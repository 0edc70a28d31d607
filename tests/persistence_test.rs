#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use paygate::domain::ports::TransactionStore;
use paygate::domain::transaction::{
    Amount, NewTransaction, PaymentRequest, ProviderKind, StatusUpdate, TransactionStatus,
};
use paygate::infrastructure::rocksdb::RocksDBStore;
use rust_decimal_macros::dec;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[tokio::test]
async fn test_rocksdb_rows_visible_to_cli() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. Seed an authorized row, then release the database lock.
    {
        let store = RocksDBStore::open(&db_path).unwrap();
        let row = store
            .insert(NewTransaction {
                provider: ProviderKind::Payir,
                request: PaymentRequest::new(Amount::new(dec!(50000)).unwrap()),
            })
            .await
            .unwrap();
        assert!(
            store
                .update_status(row.id, TransactionStatus::Init, StatusUpdate::authorized("pay-tok"))
                .await
                .unwrap()
        );
    }

    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "base_url = \"https://shop.example.com\"").unwrap();

    // 2. A separate process reads the row back.
    let output = Command::new(cargo_bin!("paygate"))
        .arg("show")
        .arg("1")
        .arg("--config")
        .arg(config.path())
        .arg("--db-path")
        .arg(&db_path)
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());

    let row: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(row["id"], 1);
    assert_eq!(row["provider"], "PAYIR");
    assert_eq!(row["status"], "AUTHORIZED");
    assert_eq!(row["ref_id"], "pay-tok");
    assert!(row["paid_at"].is_null());
}

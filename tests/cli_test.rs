mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn config_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", common::CONFIG).unwrap();
    file
}

#[test]
fn test_drivers_lists_active_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let config = config_file();
    let mut cmd = Command::new(cargo_bin!("paygate"));
    cmd.arg("drivers").arg("--config").arg(config.path());

    cmd.assert()
        .success()
        .stdout("irankish,Irankish\nsabapay,SabaPay\nnextpay,NextPay\n");

    Ok(())
}

#[test]
fn test_show_unknown_transaction_fails() {
    let config = config_file();
    let mut cmd = Command::new(cargo_bin!("paygate"));
    cmd.arg("show").arg("7").arg("--config").arg(config.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Transaction 7 not found"));
}

#[test]
fn test_invalid_config_is_reported() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "base_url = \"not a url\"").unwrap();

    let mut cmd = Command::new(cargo_bin!("paygate"));
    cmd.arg("drivers").arg("--config").arg(config.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

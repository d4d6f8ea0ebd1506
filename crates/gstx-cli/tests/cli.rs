use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const INVOICE: &str = "\
TAX INVOICE
Acme Traders
GSTIN 23ABCDE1234F1Z5
Mobile +91 9876543210 Email billing@acme.in
Invoice #: INV-1042
Invoice Date: 12 Mar 2024 Due Date: 26 Mar 2024 Customer Details:
Ravi Kumar
Place of Supply: 27-MAHARASHTRA
Taxable Amount ₹1,000.00
CGST 9.0% ₹90.00
SGST 9.0% ₹90.00
Total ₹1,180.00
";

/// `gstx` isolated from the host's config, `.env` and model credentials.
fn gstx(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gstx").unwrap();
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join("config"))
        .env("HOME", dir)
        .env_remove("GSTX_MODEL_ENDPOINT")
        .env_remove("GSTX_MODEL_API_KEY")
        .env_remove("GPT4V_ENDPOINT")
        .env_remove("GPT4V_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("invoice.txt"), INVOICE).unwrap();
    dir
}

#[test]
fn model_strategy_without_credentials_fails_before_processing() {
    let dir = workspace();

    gstx(dir.path())
        .args(["batch", "invoice.txt", "--strategy", "model", "--format", "csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API key or endpoint not found"));

    assert!(!dir.path().join("extracted_invoice_data.csv").exists());
}

#[test]
fn batch_writes_csv_and_metrics() {
    let dir = workspace();

    gstx(dir.path())
        .args(["batch", "invoice.txt", "--format", "csv", "--metrics", "-o", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 successful"))
        .stdout(predicate::str::contains("Accuracy rates:"));

    let csv = fs::read_to_string(dir.path().join("out/extracted_invoice_data.csv")).unwrap();
    let mut lines = csv.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("Document,Invoice No.,Date"));
    let row = lines.next().unwrap();
    assert!(row.starts_with("invoice.txt,INV-1042,"));
    assert!(row.contains("1180.00"));

    let metrics = fs::read_to_string(dir.path().join("out/extracted_invoice_data_metrics.csv")).unwrap();
    assert!(metrics.starts_with("Field,Correct,Total,Accuracy Rate"));
    assert!(metrics.contains("Email,1,1,100.00%"));
}

#[test]
fn batch_reports_failed_documents_and_continues() {
    let dir = workspace();
    fs::write(dir.path().join("blank.txt"), "   ").unwrap();

    gstx(dir.path())
        .args(["batch", "invoice.txt", "blank.txt", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 successful, 1 failed"))
        .stdout(predicate::str::contains("blank.txt"));

    let json = fs::read_to_string(dir.path().join("extracted_invoice_data.json")).unwrap();
    let records: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 1);
}

#[test]
fn unwritable_output_dir_still_prints_summary() {
    let dir = workspace();
    fs::write(dir.path().join("blocker"), "not a directory").unwrap();

    gstx(dir.path())
        .args(["batch", "invoice.txt", "--format", "csv", "-o", "blocker/sub"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 successful"))
        .stdout(predicate::str::contains("Accuracy rates:"))
        .stderr(predicate::str::contains("Failed to write exports to"));

    assert!(!dir.path().join("extracted_invoice_data.csv").exists());
}

#[test]
fn batch_without_matches_fails() {
    let dir = workspace();

    gstx(dir.path())
        .args(["batch", "*.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No matching files found"));
}

#[test]
fn process_prints_json_record() {
    let dir = workspace();

    gstx(dir.path())
        .args(["process", "invoice.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Invoice No.\": \"INV-1042\""))
        .stdout(predicate::str::contains("\"GSTIN Supplier\": \"23ABCDE1234F1Z5\""));
}

#[test]
fn config_set_and_get_round_trip() {
    let dir = workspace();

    gstx(dir.path())
        .args(["config", "set", "pdf.min_text_chars", "80"])
        .assert()
        .success();

    gstx(dir.path())
        .args(["config", "get", "pdf.min_text_chars"])
        .assert()
        .success()
        .stdout(predicate::str::contains("80"));

    gstx(dir.path())
        .args(["config", "set", "pdf.no_such_key", "1"])
        .assert()
        .failure();
}

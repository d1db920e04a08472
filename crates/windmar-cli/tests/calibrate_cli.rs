use std::io::Write;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::str::contains;
use tempfile::NamedTempFile;

fn fixture_reports() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../docs/fixtures/noon_reports.csv")
        .canonicalize()
        .expect("noon report fixture present")
}

fn cli() -> Command {
    let mut cmd = cargo_bin_cmd!("windmar-cli");
    cmd.env("RUST_LOG", "error").env_remove("WINDMAR_VESSEL_CATALOG");
    cmd
}

#[test]
fn calibration_recovers_fixture_factors() {
    let output = cli()
        .args(["--format", "json", "calibrate", "--reports"])
        .arg(fixture_reports())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let result: serde_json::Value = serde_json::from_slice(&output).expect("valid json");

    // The fixture was logged by a tanker running 8% heavy in calm water,
    // 10% light in wind and 25% heavy in waves.
    let factors = &result["factors"];
    assert!((factors["calm_water"].as_f64().unwrap() - 1.08).abs() < 0.01);
    assert!((factors["wind"].as_f64().unwrap() - 0.90).abs() < 0.02);
    assert!((factors["waves"].as_f64().unwrap() - 1.25).abs() < 0.02);
    assert_eq!(result["reports_used"].as_u64(), Some(8));
    assert!(result["rmse_mt"].as_f64().unwrap() < 0.01);
    assert!(result["rmse_before_mt"].as_f64().unwrap() > 1.0);
}

#[test]
fn calibration_text_lists_factors_and_error() {
    cli()
        .args(["calibrate", "--reports"])
        .arg(fixture_reports())
        .assert()
        .success()
        .stdout(contains("Calibration for MR Tanker (8 noon reports):"))
        .stdout(contains("Factors: calm water 1.080"))
        .stdout(contains("Fuel RMSE:"));
}

#[test]
fn too_few_reports_fail() {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "speed_kts,heading_deg,steaming_hours,fuel_mt").unwrap();
    writeln!(file, "14.0,90,24,24.5").unwrap();
    writeln!(file, "13.0,90,24,21.0").unwrap();
    cli()
        .args(["calibrate", "--reports"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(contains("need at least 3 noon reports"));
}

#[test]
fn missing_report_file_fails() {
    cli()
        .args(["calibrate", "--reports", "/nonexistent/noon_reports.csv"])
        .assert()
        .failure()
        .stderr(contains("failed to read noon reports"));
}

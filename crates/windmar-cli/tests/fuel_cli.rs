use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::str::contains;

fn fixture_catalog() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../docs/fixtures/vessels.csv")
        .canonicalize()
        .expect("vessel catalog fixture present")
}

fn cli() -> Command {
    let mut cmd = cargo_bin_cmd!("windmar-cli");
    cmd.env("RUST_LOG", "error").env_remove("WINDMAR_VESSEL_CATALOG");
    cmd
}

fn fuel_json(extra: &[&str]) -> serde_json::Value {
    let output = cli()
        .args(["--format", "json", "fuel"])
        .args(extra)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn calm_fuel_reports_breakdown() {
    cli()
        .args(["fuel", "--distance", "348"])
        .assert()
        .success()
        .stdout(contains("Voyage fuel for MR Tanker:"))
        .stdout(contains("over 24.0 h"))
        .stdout(contains("Fuel breakdown (t)"))
        .stdout(contains("Resistance (kN)"));
}

#[test]
fn head_wind_and_waves_cost_more_fuel() {
    let calm = fuel_json(&[]);
    let rough = fuel_json(&["--wind-speed", "12.5", "--wave-height", "3"]);
    let calm_fuel = calm["fuel_mt"].as_f64().unwrap();
    let rough_fuel = rough["fuel_mt"].as_f64().unwrap();
    assert!(rough_fuel > calm_fuel);
    assert!(rough["fuel_breakdown"]["waves"].as_f64().unwrap() > 0.0);
    assert_eq!(calm["fuel_breakdown"]["waves"].as_f64().unwrap(), 0.0);
}

#[test]
fn speed_at_or_above_maximum_fails() {
    cli()
        .args(["fuel", "--speed", "18"])
        .assert()
        .failure()
        .stderr(contains("invalid speed"));
}

#[test]
fn scenarios_list_all_four_conditions() {
    cli()
        .arg("scenarios")
        .assert()
        .success()
        .stdout(contains("Calm Weather (Laden)"))
        .stdout(contains("Head Wind 20 kts (Laden)"))
        .stdout(contains("Rough Seas (Laden)"))
        .stdout(contains("Calm Weather (Ballast)"));
}

#[test]
fn scenarios_use_catalog_vessel() {
    cli()
        .args(["scenarios", "--vessel", "Handysize Bulker", "--catalog"])
        .arg(fixture_catalog())
        .assert()
        .success()
        .stdout(contains("Fuel scenarios for Handysize Bulker:"));
}

#[test]
fn vessels_lists_builtin_tanker_by_default() {
    cli()
        .arg("vessels")
        .assert()
        .success()
        .stdout(contains("Available vessels (1):"))
        .stdout(contains("MR Tanker"))
        .stdout(contains("49000"));
}

#[test]
fn vessels_reads_catalog_from_environment() {
    cli()
        .env("WINDMAR_VESSEL_CATALOG", fixture_catalog())
        .arg("vessels")
        .assert()
        .success()
        .stdout(contains("Available vessels (3):"))
        .stdout(contains("Aframax"))
        .stdout(contains("Handysize Bulker"));
}

use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::{tempdir, TempDir};

fn fixture_catalog() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../docs/fixtures/vessels.csv")
        .canonicalize()
        .expect("vessel catalog fixture present")
}

fn prepare_command() -> (Command, TempDir) {
    let temp_dir = tempdir().expect("create temp dir");
    let mut cmd = cargo_bin_cmd!("windmar-cli");
    cmd.env("RUST_LOG", "error")
        .env_remove("WINDMAR_VESSEL_CATALOG")
        .arg("--store")
        .arg(temp_dir.path().join("forecast_cache.db"));
    (cmd, temp_dir)
}

const CROSSING: [&str; 5] = ["route", "--from", "40,-30", "--to", "40,-20"];

#[test]
fn calm_route_prints_totals_and_waypoints() {
    let (mut cmd, _temp) = prepare_command();
    cmd.args(CROSSING)
        .args(["--no-weather", "--departure", "2026-03-01T00:00:00Z"]);

    cmd.assert()
        .success()
        .stdout(contains("Route (astar, fuel, safety level 100%):"))
        .stdout(contains("weather: calm water"))
        .stdout(contains("departs 2026-03-01 00:00Z"))
        .stdout(contains("40.000"))
        .stdout(contains("-30.000"));
}

#[test]
fn empty_store_falls_back_to_calm_water() {
    let (mut cmd, _temp) = prepare_command();
    cmd.args(CROSSING).arg("--summary");

    cmd.assert()
        .success()
        .stdout(contains("weather: calm water"))
        .stdout(contains("ETA").not());
}

#[test]
fn require_weather_fails_without_forecasts() {
    let (mut cmd, _temp) = prepare_command();
    cmd.args(CROSSING).arg("--require-weather");

    cmd.assert()
        .failure()
        .stderr(contains("route optimization failed"));
}

#[test]
fn pareto_route_as_json_lists_three_levels() {
    let (mut cmd, _temp) = prepare_command();
    cmd.args(CROSSING)
        .args(["--no-weather", "--strategy", "pareto", "--format", "json"]);

    let output = cmd.assert().success().get_output().stdout.clone();
    let report: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    let itineraries = report["itineraries"].as_array().expect("itineraries");
    assert_eq!(itineraries.len(), 3);
    let levels: Vec<f64> = itineraries
        .iter()
        .map(|it| it["safety_level"].as_f64().unwrap())
        .collect();
    assert_eq!(levels, vec![0.0, 0.5, 1.0]);
    assert_eq!(report["non_dominated"].as_array().unwrap().len(), 3);
    assert_eq!(itineraries[0]["strategy"], "pareto");
}

#[test]
fn time_expanded_engine_runs_in_calm_water() {
    let (mut cmd, _temp) = prepare_command();
    cmd.args(CROSSING)
        .args(["--no-weather", "--engine", "time-expanded", "--summary"]);

    cmd.assert()
        .success()
        .stdout(contains("Route (time-expanded, fuel"));
}

#[test]
fn catalog_vessel_is_used_for_routing() {
    let (mut cmd, _temp) = prepare_command();
    cmd.args(CROSSING)
        .args(["--no-weather", "--summary", "--vessel", "aframax", "--catalog"])
        .arg(fixture_catalog());

    cmd.assert().success().stdout(contains("t fuel"));
}

#[test]
fn unknown_vessel_lists_alternatives() {
    let (mut cmd, _temp) = prepare_command();
    cmd.args(CROSSING)
        .args(["--no-weather", "--vessel", "Titanic", "--catalog"])
        .arg(fixture_catalog());

    cmd.assert()
        .failure()
        .stderr(contains("unknown vessel 'Titanic'"))
        .stderr(contains("Aframax"));
}

#[test]
fn invalid_speed_is_rejected() {
    let (mut cmd, _temp) = prepare_command();
    cmd.args(CROSSING).args(["--no-weather", "--speed", "40"]);

    cmd.assert().failure().stderr(contains("speed"));
}

#[test]
fn malformed_position_is_a_usage_error() {
    let (mut cmd, _temp) = prepare_command();
    cmd.args(["route", "--from", "40", "--to", "40,-20"]);

    cmd.assert()
        .failure()
        .code(2)
        .stderr(contains("expected 2 comma-separated numbers"));
}

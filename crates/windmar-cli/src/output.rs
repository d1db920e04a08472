//! Output formatting for command results.
//!
//! Every command renders either a human-readable text view or pretty JSON of
//! the library types, selected with `--format`.

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

use windmar_lib::{
    CalibrationResult, ForecastFrames, ForecastRun, ForecastStatus, FuelScenario, Itinerary,
    VesselSpecs, VoyageFuel,
};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print any serializable value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// JSON shape of a route result.
#[derive(Debug, Serialize)]
pub struct RouteReport<'a> {
    pub itineraries: &'a [Itinerary],
    /// Parallel to `itineraries`; false for results another one dominates.
    pub non_dominated: Vec<bool>,
}

/// Render one or more itineraries, flagging those off the Pareto front.
pub fn render_itineraries(itineraries: &[Itinerary], non_dominated: &[bool], show_waypoints: bool) {
    for (index, itinerary) in itineraries.iter().enumerate() {
        if index > 0 {
            println!();
        }
        let flag = match non_dominated.get(index) {
            Some(false) => " [dominated]",
            _ => "",
        };
        render_itinerary(itinerary, flag, show_waypoints);
    }
}

fn render_itinerary(itinerary: &Itinerary, flag: &str, show_waypoints: bool) {
    println!(
        "Route ({}, {}, safety level {:.0}%){}:",
        itinerary.engine,
        itinerary.strategy,
        itinerary.safety_level * 100.0,
        flag
    );
    println!(
        "  {:.1} nm, {:.1} h, {:.2} t fuel ({:.4} t/nm)",
        itinerary.total_distance_nm,
        itinerary.total_hours,
        itinerary.total_fuel_mt,
        itinerary.fuel_per_nm()
    );
    println!(
        "  departs {}, arrives {}",
        itinerary.departure.format("%Y-%m-%d %H:%MZ"),
        itinerary.arrival.format("%Y-%m-%d %H:%MZ")
    );
    if itinerary.weather_used {
        let runs: Vec<String> = itinerary
            .forecast_run_ids
            .iter()
            .map(|id| id.to_string())
            .collect();
        println!("  weather: forecast runs {}", runs.join(", "));
    } else {
        println!("  weather: calm water");
    }

    if show_waypoints {
        println!("  {:>4} {:>9} {:>10}  {}", "#", "Lat", "Lon", "ETA");
        for (index, waypoint) in itinerary.waypoints.iter().enumerate() {
            println!(
                "  {:>4} {:>9.3} {:>10.3}  {}",
                index,
                waypoint.position.lat,
                waypoint.position.lon,
                waypoint.eta.format("%Y-%m-%d %H:%MZ")
            );
        }
    }
}

pub fn render_voyage_fuel(vessel: &VesselSpecs, result: &VoyageFuel) {
    println!("Voyage fuel for {}:", vessel.name);
    println!("  Fuel:  {:.2} t over {:.1} h", result.fuel_mt, result.time_hours);
    println!("  Power: {:.0} kW", result.power_kw);
    let fuel = &result.fuel_breakdown;
    println!(
        "  Fuel breakdown (t): calm water {:.2}, wind {:.2}, waves {:.2}",
        fuel.calm_water, fuel.wind, fuel.waves
    );
    let resistance = &result.resistance_breakdown_kn;
    println!(
        "  Resistance (kN): calm water {:.1}, wind {:.1}, waves {:.1}, total {:.1}",
        resistance.calm_water, resistance.wind, resistance.waves, resistance.total
    );
}

pub fn render_scenarios(vessel: &VesselSpecs, scenarios: &[FuelScenario]) {
    println!("Fuel scenarios for {}:", vessel.name);
    println!("{:<26} {:<34} {:>10} {:>10}", "Scenario", "Conditions", "Fuel (t)", "Power (kW)");
    for scenario in scenarios {
        println!(
            "{:<26} {:<34} {:>10.2} {:>10.0}",
            scenario.name, scenario.conditions, scenario.fuel_mt, scenario.power_kw
        );
    }
}

pub fn render_calibration(vessel: &VesselSpecs, result: &CalibrationResult) {
    println!("Calibration for {} ({} noon reports):", vessel.name, result.reports_used);
    let factors = &result.factors;
    println!(
        "  Factors: calm water {:.3}, wind {:.3}, waves {:.3}",
        factors.calm_water, factors.wind, factors.waves
    );
    println!(
        "  Fuel RMSE: {:.3} t before, {:.3} t after ({:.2}% MAPE)",
        result.rmse_before_mt, result.rmse_mt, result.mape_pct
    );
}

pub fn render_vessels(vessels: &[&VesselSpecs]) {
    if vessels.is_empty() {
        println!("No vessels available in catalog.");
        return;
    }

    println!("Available vessels ({}):", vessels.len());
    println!(
        "{:<20} {:>9} {:>7} {:>6} {:>13} {:>8} {:>14}",
        "Name", "DWT (t)", "LOA (m)", "Beam", "Draft L/B (m)", "MCR (kW)", "Speed L/B (kn)"
    );
    for vessel in vessels {
        println!(
            "{:<20} {:>9.0} {:>7.1} {:>6.1} {:>13} {:>8.0} {:>14}",
            vessel.name,
            vessel.dwt,
            vessel.loa,
            vessel.beam,
            format!("{:.1}/{:.1}", vessel.draft_laden, vessel.draft_ballast),
            vessel.mcr_kw,
            format!("{:.1}/{:.1}", vessel.service_speed_laden, vessel.service_speed_ballast),
        );
    }
}

pub fn render_status(status: &ForecastStatus) {
    let cycle = match (&status.run_date, &status.run_hour) {
        (Some(date), Some(hour)) => format!("{date} {hour}z"),
        _ => "none".to_string(),
    };
    let state = if status.complete { "complete" } else { "not ready" };
    println!(
        "{:<9} {:<12} {:>3}/{:<3} hours  {}",
        status.source, cycle, status.cached_hours, status.total_hours, state
    );
}

pub fn render_runs(runs: &[ForecastRun]) {
    for run in runs {
        println!(
            "  run {:>4}  {} {}z  {:<10} {} hours",
            run.id,
            run.run_date(),
            run.run_hour(),
            run.status.as_str(),
            run.forecast_hours.len()
        );
    }
}

pub fn render_frames(frames: &ForecastFrames) {
    println!(
        "{} run {} ({} {}z): {} frames on a {}x{} grid",
        frames.source,
        frames.run_id,
        frames.run_date,
        frames.run_hour,
        frames.frames.len(),
        frames.lats.len(),
        frames.lons.len()
    );
    let hours: Vec<String> = frames.frames.keys().map(|hour| format!("+{hour}h")).collect();
    println!("  hours: {}", hours.join(" "));
}

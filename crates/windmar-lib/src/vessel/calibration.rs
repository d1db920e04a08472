//! Fitting the cost model to noon reports.
//!
//! Each report's fuel is turned back into the resistance the engine
//! overcame, and the uncalibrated model supplies the calm-water, wind and
//! wave resistance for the reported conditions. Factors scaling those three
//! components are then fitted by least squares. A component that no report
//! exercises (no wind in any report, say) keeps its factor of 1.0.

use std::fs;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::weather::MetOcean;

use super::cost::CostModel;

/// Fewest reports a calibration accepts.
pub const MIN_NOON_REPORTS: usize = 3;

const COMPONENTS: [&str; 3] = ["calm_water", "wind", "waves"];

/// Multipliers applied to each resistance component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFactors {
    pub calm_water: f64,
    pub wind: f64,
    pub waves: f64,
}

impl Default for CalibrationFactors {
    fn default() -> Self {
        Self {
            calm_water: 1.0,
            wind: 1.0,
            waves: 1.0,
        }
    }
}

impl CalibrationFactors {
    fn from_array(values: [f64; 3]) -> Self {
        Self {
            calm_water: values[0],
            wind: values[1],
            waves: values[2],
        }
    }

    fn as_array(&self) -> [f64; 3] {
        [self.calm_water, self.wind, self.waves]
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in COMPONENTS.iter().zip(self.as_array()) {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Calibration {
                    message: format!("{name} factor must be positive, got {value}"),
                });
            }
        }
        Ok(())
    }
}

fn laden() -> bool {
    true
}

/// One day's log entry: what the vessel burned and the weather it met.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoonReport {
    /// Average speed through the water, knots.
    pub speed_kts: f64,
    pub heading_deg: f64,
    #[serde(default = "laden")]
    pub is_laden: bool,
    pub steaming_hours: f64,
    pub fuel_mt: f64,
    #[serde(default)]
    pub wind_speed_ms: f64,
    /// Direction the wind blew from, degrees.
    #[serde(default)]
    pub wind_dir_deg: f64,
    #[serde(default)]
    pub wave_hs_m: f64,
    #[serde(default)]
    pub wave_dir_deg: f64,
}

impl NoonReport {
    pub fn weather(&self) -> MetOcean {
        MetOcean::from_wind(self.wind_speed_ms, self.wind_dir_deg)
            .with_waves(self.wave_hs_m, self.wave_dir_deg)
    }

    fn validate(&self, index: usize) -> Result<()> {
        let fields = [
            (self.steaming_hours, "steaming_hours"),
            (self.fuel_mt, "fuel_mt"),
        ];
        for (value, field) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Calibration {
                    message: format!("noon report {index}: {field} must be positive, got {value}"),
                });
            }
        }
        let conditions = [
            self.heading_deg,
            self.wind_speed_ms,
            self.wind_dir_deg,
            self.wave_hs_m,
            self.wave_dir_deg,
        ];
        if conditions.iter().any(|value| !value.is_finite())
            || self.wind_speed_ms < 0.0
            || self.wave_hs_m < 0.0
        {
            return Err(Error::Calibration {
                message: format!("noon report {index}: invalid heading or weather"),
            });
        }
        Ok(())
    }
}

/// Read noon reports from a CSV file with a header row.
pub fn read_noon_reports(path: &Path) -> Result<Vec<NoonReport>> {
    let file = fs::File::open(path)?;
    noon_reports_from_reader(file)
}

pub fn noon_reports_from_reader<R: Read>(reader: R) -> Result<Vec<NoonReport>> {
    let mut csv_reader = ReaderBuilder::new().trim(Trim::Fields).from_reader(reader);
    csv_reader
        .deserialize::<NoonReport>()
        .enumerate()
        .map(|(index, record)| {
            record.map_err(|err| Error::Calibration {
                message: format!("noon report {index}: {err}"),
            })
        })
        .collect()
}

/// Fitted factors and how well they reproduce the reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub factors: CalibrationFactors,
    pub reports_used: usize,
    /// Root mean square fuel error of the uncalibrated model, tonnes.
    pub rmse_before_mt: f64,
    /// Root mean square fuel error after calibration, tonnes.
    pub rmse_mt: f64,
    /// Mean absolute percentage fuel error after calibration.
    pub mape_pct: f64,
}

/// Fit calibration factors for `model`'s vessel to `reports`.
///
/// Factors are absolute: any calibration already on `model` is ignored.
pub fn calibrate(model: &CostModel, reports: &[NoonReport]) -> Result<CalibrationResult> {
    if reports.len() < MIN_NOON_REPORTS {
        return Err(Error::Calibration {
            message: format!(
                "need at least {MIN_NOON_REPORTS} noon reports, got {}",
                reports.len()
            ),
        });
    }
    let base = CostModel::new(model.specs().clone())?;

    let mut rows = Vec::with_capacity(reports.len());
    for (index, report) in reports.iter().enumerate() {
        report.validate(index)?;
        let components = base.raw_components_n(
            report.speed_kts,
            report.heading_deg,
            report.is_laden,
            &report.weather(),
        )?;
        let observed = base
            .resistance_for_fuel_rate_n(report.fuel_mt / report.steaming_hours, report.speed_kts);
        rows.push((components, observed));
    }

    // Components no report exercises stay at 1.0.
    let energy: Vec<f64> = (0..3)
        .map(|c| rows.iter().map(|(x, _)| x[c] * x[c]).sum::<f64>())
        .collect();
    let active: Vec<usize> = (0..3).filter(|&c| energy[c] > energy[0] * 1e-10).collect();

    let n = active.len();
    let mut normal = vec![vec![0.0; n]; n];
    let mut rhs = vec![0.0; n];
    for (x, observed) in &rows {
        let fixed: f64 = (0..3).filter(|c| !active.contains(c)).map(|c| x[c]).sum();
        let target = observed - fixed;
        for (i, &ci) in active.iter().enumerate() {
            rhs[i] += x[ci] * target;
            for (j, &cj) in active.iter().enumerate() {
                normal[i][j] += x[ci] * x[cj];
            }
        }
    }
    let solution = solve(normal, rhs).ok_or_else(|| Error::Calibration {
        message: "noon reports cannot separate the resistance components".to_string(),
    })?;

    let mut values = [1.0; 3];
    for (i, &c) in active.iter().enumerate() {
        values[c] = solution[i];
    }
    let factors = CalibrationFactors::from_array(values);
    factors.validate().map_err(|err| match err {
        Error::Calibration { message } => Error::Calibration {
            message: format!("fitted {message}"),
        },
        other => other,
    })?;
    let calibrated = base.clone().with_calibration(factors)?;

    let rmse_before_mt = fuel_rmse(&base, reports)?;
    let mut squared = 0.0;
    let mut percent = 0.0;
    for report in reports {
        let predicted = predicted_fuel(&calibrated, report)?;
        let error = predicted - report.fuel_mt;
        squared += error * error;
        percent += (error / report.fuel_mt).abs() * 100.0;
    }
    let count = reports.len() as f64;
    let result = CalibrationResult {
        factors,
        reports_used: reports.len(),
        rmse_before_mt,
        rmse_mt: (squared / count).sqrt(),
        mape_pct: percent / count,
    };
    info!(
        vessel = %model.specs().name,
        reports = result.reports_used,
        calm_water = factors.calm_water,
        wind = factors.wind,
        waves = factors.waves,
        rmse_mt = result.rmse_mt,
        mape_pct = result.mape_pct,
        "calibrated cost model"
    );
    Ok(result)
}

fn predicted_fuel(model: &CostModel, report: &NoonReport) -> Result<f64> {
    let cost = model.edge_cost(
        report.speed_kts,
        report.heading_deg,
        report.is_laden,
        &report.weather(),
    )?;
    Ok(cost.fuel_mt_per_hour * report.steaming_hours)
}

fn fuel_rmse(model: &CostModel, reports: &[NoonReport]) -> Result<f64> {
    let mut squared = 0.0;
    for report in reports {
        let error = predicted_fuel(model, report)? - report.fuel_mt;
        squared += error * error;
    }
    Ok((squared / reports.len() as f64).sqrt())
}

/// Gaussian elimination with partial pivoting; `None` when singular.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let scale = (0..n).map(|i| a[i][i].abs()).fold(0.0, f64::max);
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() <= scale * 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let ratio = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= ratio * a[col][k];
            }
            b[row] -= ratio * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vessel::VesselSpecs;

    fn model() -> CostModel {
        CostModel::new(VesselSpecs::default()).expect("valid specs")
    }

    fn truth() -> CalibrationFactors {
        CalibrationFactors {
            calm_water: 1.12,
            wind: 0.85,
            waves: 1.3,
        }
    }

    /// Reports a vessel with `factors` would log, one per day.
    fn reports_from(factors: CalibrationFactors) -> Vec<NoonReport> {
        let vessel = model().with_calibration(factors).unwrap();
        let conditions = [
            (14.5, 0.0, true, 12.0, 20.0, 3.0, 10.0),
            (13.0, 90.0, true, 8.0, 60.0, 1.5, 120.0),
            (12.0, 180.0, false, 15.0, 200.0, 4.0, 170.0),
            (11.0, 270.0, true, 5.0, 300.0, 2.5, 250.0),
            (14.0, 45.0, false, 18.0, 90.0, 1.0, 60.0),
            (10.5, 135.0, true, 10.0, 135.0, 5.0, 150.0),
            (13.5, 315.0, true, 0.0, 0.0, 0.0, 0.0),
        ];
        conditions
            .iter()
            .map(|&(speed, heading, laden, wind, wind_dir, hs, wave_dir)| {
                let mut report = NoonReport {
                    speed_kts: speed,
                    heading_deg: heading,
                    is_laden: laden,
                    steaming_hours: 24.0,
                    fuel_mt: 0.0,
                    wind_speed_ms: wind,
                    wind_dir_deg: wind_dir,
                    wave_hs_m: hs,
                    wave_dir_deg: wave_dir,
                };
                report.fuel_mt = predicted_fuel(&vessel, &report).unwrap();
                report
            })
            .collect()
    }

    #[test]
    fn recovers_known_factors() {
        let result = calibrate(&model(), &reports_from(truth())).unwrap();
        let f = result.factors;
        assert!((f.calm_water - 1.12).abs() < 1e-6, "calm water {}", f.calm_water);
        assert!((f.wind - 0.85).abs() < 1e-6, "wind {}", f.wind);
        assert!((f.waves - 1.3).abs() < 1e-6, "waves {}", f.waves);
        assert_eq!(result.reports_used, 7);
        assert!(result.rmse_mt < 1e-5);
        assert!(result.mape_pct < 1e-4);
        assert!(result.rmse_before_mt > 1.0);
    }

    #[test]
    fn existing_calibration_does_not_bias_the_fit() {
        let skewed = model()
            .with_calibration(CalibrationFactors {
                calm_water: 2.0,
                wind: 2.0,
                waves: 2.0,
            })
            .unwrap();
        let result = calibrate(&skewed, &reports_from(truth())).unwrap();
        assert!((result.factors.calm_water - 1.12).abs() < 1e-6);
    }

    #[test]
    fn calm_reports_fit_only_the_calm_water_factor() {
        let vessel = model()
            .with_calibration(CalibrationFactors {
                calm_water: 0.9,
                ..CalibrationFactors::default()
            })
            .unwrap();
        let reports: Vec<NoonReport> = [10.0, 12.0, 14.0]
            .iter()
            .map(|&speed| {
                let mut report = NoonReport {
                    speed_kts: speed,
                    heading_deg: 0.0,
                    is_laden: true,
                    steaming_hours: 23.5,
                    fuel_mt: 0.0,
                    wind_speed_ms: 0.0,
                    wind_dir_deg: 0.0,
                    wave_hs_m: 0.0,
                    wave_dir_deg: 0.0,
                };
                report.fuel_mt = predicted_fuel(&vessel, &report).unwrap();
                report
            })
            .collect();
        let result = calibrate(&model(), &reports).unwrap();
        assert!((result.factors.calm_water - 0.9).abs() < 1e-6);
        assert_eq!(result.factors.wind, 1.0);
        assert_eq!(result.factors.waves, 1.0);
    }

    #[test]
    fn too_few_reports_are_rejected() {
        let reports = reports_from(truth());
        let err = calibrate(&model(), &reports[..2]).unwrap_err();
        assert!(matches!(err, Error::Calibration { .. }));
        assert!(err.to_string().contains("at least 3"));
    }

    #[test]
    fn report_without_steaming_hours_is_rejected() {
        let mut reports = reports_from(truth());
        reports[4].steaming_hours = 0.0;
        let err = calibrate(&model(), &reports).unwrap_err();
        assert!(err.to_string().contains("noon report 4: steaming_hours"));
    }

    #[test]
    fn reports_parse_from_csv_with_defaults() {
        let data = "speed_kts,heading_deg,steaming_hours,fuel_mt,wind_speed_ms\n\
                    14.5, 90, 24, 28.4, 7.5\n\
                    12.0, 270, 23.5, 19.1, 0\n";
        let reports = noon_reports_from_reader(data.as_bytes()).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].is_laden);
        assert_eq!(reports[0].wind_speed_ms, 7.5);
        assert_eq!(reports[1].wave_hs_m, 0.0);
        assert_eq!(reports[1].steaming_hours, 23.5);
    }

    #[test]
    fn malformed_csv_row_names_the_report() {
        let data = "speed_kts,heading_deg,steaming_hours,fuel_mt\n14.5,90,24,lots\n";
        let err = noon_reports_from_reader(data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("noon report 0"));
    }

    #[test]
    fn collinear_components_are_rejected() {
        let solution = solve(vec![vec![1.0, 2.0], vec![2.0, 4.0]], vec![1.0, 2.0]);
        assert!(solution.is_none());
        let solution = solve(vec![vec![2.0, 1.0], vec![1.0, 3.0]], vec![3.0, 5.0]).unwrap();
        assert!((solution[0] - 0.8).abs() < 1e-12);
        assert!((solution[1] - 1.4).abs() < 1e-12);
    }
}

//! Resistance-based fuel model.
//!
//! Calm-water resistance follows the ITTC-1957 friction line with a form
//! factor, plus wind (frontal and lateral) and wave (STAWAVE-1) added
//! resistance as a function of encounter angle. Current never adds resistance;
//! it changes speed over ground only.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geo::{angle_between, KTS_TO_MS};
use crate::weather::MetOcean;

use super::calibration::CalibrationFactors;
use super::specs::VesselSpecs;

const SEAWATER_DENSITY: f64 = 1025.0;
const AIR_DENSITY: f64 = 1.225;
const GRAVITY: f64 = 9.81;
const KINEMATIC_VISCOSITY: f64 = 1.188e-6;
const FORM_FACTOR: f64 = 1.2;
const RESIDUAL_COEFFICIENT: f64 = 0.0004;
const PROPULSIVE_EFFICIENCY: f64 = 0.7;
const BLOCK_COEFFICIENT_LADEN: f64 = 0.82;
const BLOCK_COEFFICIENT_BALLAST: f64 = 0.75;
const FRONTAL_DRAG_COEFFICIENT: f64 = 0.8;
const LATERAL_DRIFT_COEFFICIENT: f64 = 0.05;
/// Height of hull and superstructure above the laden waterline, m.
const WINDAGE_HEIGHT_M: f64 = 15.0;
/// Depth of accommodation block used for the lateral windage area, m.
const LATERAL_WINDAGE_HEIGHT_M: f64 = 8.0;

/// Total resistance never drops below this share of calm-water resistance,
/// however favourable the wind.
pub const MIN_RESISTANCE_FRACTION: f64 = 0.5;

/// Slowest speed over ground treated as making way, knots.
pub const MIN_SPEED_OVER_GROUND_KTS: f64 = 0.5;

/// Resistance components in kN.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResistanceBreakdown {
    pub calm_water: f64,
    pub wind: f64,
    pub waves: f64,
    pub total: f64,
}

/// Instantaneous cost of steaming at a speed and heading in given weather.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeCost {
    pub fuel_mt_per_hour: f64,
    pub power_kw: f64,
    pub speed_over_ground_kts: f64,
    pub resistance_kn: ResistanceBreakdown,
}

/// Cost of covering a known distance at a fixed [`EdgeCost`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegCost {
    pub distance_nm: f64,
    pub hours: f64,
    pub fuel_mt: f64,
}

impl EdgeCost {
    /// Integrate the fuel rate over the time needed to cover `distance_nm`.
    ///
    /// Returns `None` when the current holds the vessel below
    /// [`MIN_SPEED_OVER_GROUND_KTS`].
    pub fn leg(&self, distance_nm: f64) -> Option<LegCost> {
        if self.speed_over_ground_kts < MIN_SPEED_OVER_GROUND_KTS {
            return None;
        }
        let hours = distance_nm / self.speed_over_ground_kts;
        Some(LegCost {
            distance_nm,
            hours,
            fuel_mt: self.fuel_mt_per_hour * hours,
        })
    }
}

/// Fuel split by resistance share, tonnes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FuelBreakdown {
    pub calm_water: f64,
    pub wind: f64,
    pub waves: f64,
}

/// Result of a single-condition voyage fuel calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoyageFuel {
    pub fuel_mt: f64,
    pub power_kw: f64,
    pub time_hours: f64,
    pub fuel_breakdown: FuelBreakdown,
    pub resistance_breakdown_kn: ResistanceBreakdown,
}

#[derive(Debug, Clone, Copy)]
struct HullForm {
    length: f64,
    beam: f64,
    wetted_surface: f64,
    frontal_area: f64,
    lateral_area: f64,
}

/// Vessel cost model bound to one specification snapshot.
#[derive(Debug, Clone)]
pub struct CostModel {
    specs: VesselSpecs,
    factors: CalibrationFactors,
}

impl CostModel {
    pub fn new(specs: VesselSpecs) -> Result<Self> {
        specs.validate()?;
        Ok(Self {
            specs,
            factors: CalibrationFactors::default(),
        })
    }

    /// Scale the resistance components by factors fitted to noon reports.
    pub fn with_calibration(mut self, factors: CalibrationFactors) -> Result<Self> {
        factors.validate()?;
        self.factors = factors;
        Ok(self)
    }

    pub fn calibration(&self) -> CalibrationFactors {
        self.factors
    }

    pub fn specs(&self) -> &VesselSpecs {
        &self.specs
    }

    pub fn max_speed_kts(&self) -> f64 {
        self.specs.max_speed_kts
    }

    fn check_speed(&self, speed_kts: f64) -> Result<()> {
        if !speed_kts.is_finite() || speed_kts <= 0.0 || speed_kts >= self.specs.max_speed_kts {
            return Err(Error::InvalidSpeed {
                speed_kts,
                max_kts: self.specs.max_speed_kts,
            });
        }
        Ok(())
    }

    fn hull(&self, is_laden: bool) -> HullForm {
        let s = &self.specs;
        let draft = s.draft(is_laden);
        let cb = if is_laden {
            BLOCK_COEFFICIENT_LADEN
        } else {
            BLOCK_COEFFICIENT_BALLAST
        };
        let volume = cb * s.loa * s.beam * draft;
        // Denny-Mumford wetted surface.
        let wetted_surface = 1.7 * s.loa * draft + volume / draft;
        let extra_freeboard = s.draft_laden - draft;
        HullForm {
            length: s.loa,
            beam: s.beam,
            wetted_surface,
            frontal_area: s.beam * (WINDAGE_HEIGHT_M + extra_freeboard),
            lateral_area: s.loa * (LATERAL_WINDAGE_HEIGHT_M + extra_freeboard),
        }
    }

    fn calm_resistance_n(hull: &HullForm, speed_ms: f64) -> f64 {
        let reynolds = speed_ms * hull.length / KINEMATIC_VISCOSITY;
        let cf = 0.075 / (reynolds.log10() - 2.0).powi(2);
        let ct = cf * FORM_FACTOR + RESIDUAL_COEFFICIENT;
        0.5 * SEAWATER_DENSITY * hull.wetted_surface * speed_ms * speed_ms * ct
    }

    fn wind_resistance_n(hull: &HullForm, speed_ms: f64, heading_deg: f64, weather: &MetOcean) -> f64 {
        let wind = weather.wind_speed_ms();
        if wind <= 0.0 {
            return 0.0;
        }
        // 0 = wind on the bow.
        let angle = angle_between(heading_deg, weather.wind_from_deg()).to_radians();
        let apparent = speed_ms + wind * angle.cos();
        let frontal = 0.5
            * AIR_DENSITY
            * hull.frontal_area
            * FRONTAL_DRAG_COEFFICIENT
            * (apparent * apparent.abs() - speed_ms * speed_ms);
        let lateral = 0.5
            * AIR_DENSITY
            * hull.lateral_area
            * LATERAL_DRIFT_COEFFICIENT
            * wind
            * wind
            * angle.sin().abs();
        frontal + lateral
    }

    fn wave_resistance_n(hull: &HullForm, heading_deg: f64, weather: &MetOcean) -> f64 {
        let hs = weather.wave_hs.max(0.0);
        if hs == 0.0 {
            return 0.0;
        }
        let angle = angle_between(heading_deg, weather.wave_dir).to_radians();
        let direction_factor = (0.55 + 0.45 * angle.cos()).max(0.1);
        (1.0 / 16.0)
            * SEAWATER_DENSITY
            * GRAVITY
            * hs
            * hs
            * hull.beam
            * (hull.beam / hull.length).sqrt()
            * direction_factor
    }

    /// Brake power in kW to overcome `resistance_n` at `speed_ms`.
    fn power_kw(resistance_n: f64, speed_ms: f64) -> f64 {
        resistance_n * speed_ms / PROPULSIVE_EFFICIENCY / 1000.0
    }

    /// Fuel rate in t/h. SFOC rises away from the 80% MCR sweet spot.
    fn fuel_rate(&self, power_kw: f64) -> f64 {
        let load = power_kw / self.specs.mcr_kw;
        let sfoc = self.specs.sfoc_at_mcr * (1.0 + 0.1 * (load - 0.8).powi(2));
        power_kw * sfoc / 1.0e6
    }

    fn resistance(
        &self,
        hull: &HullForm,
        speed_ms: f64,
        heading_deg: f64,
        weather: &MetOcean,
    ) -> ResistanceBreakdown {
        let calm = Self::calm_resistance_n(hull, speed_ms) * self.factors.calm_water;
        let wind = Self::wind_resistance_n(hull, speed_ms, heading_deg, weather) * self.factors.wind;
        let waves = Self::wave_resistance_n(hull, heading_deg, weather) * self.factors.waves;
        let total = (calm + wind + waves).max(calm * MIN_RESISTANCE_FRACTION);
        ResistanceBreakdown {
            calm_water: calm / 1000.0,
            wind: wind / 1000.0,
            waves: waves / 1000.0,
            total: total / 1000.0,
        }
    }

    /// Fuel rate, power and speed over ground for steaming at `speed_kts`
    /// through the water on `heading_deg`.
    pub fn edge_cost(
        &self,
        speed_kts: f64,
        heading_deg: f64,
        is_laden: bool,
        weather: &MetOcean,
    ) -> Result<EdgeCost> {
        self.check_speed(speed_kts)?;
        let hull = self.hull(is_laden);
        let speed_ms = speed_kts * KTS_TO_MS;
        let resistance = self.resistance(&hull, speed_ms, heading_deg, weather);
        let power_kw = Self::power_kw(resistance.total * 1000.0, speed_ms);

        let current_along = weather.current_speed_kts()
            * angle_between(heading_deg, weather.current_toward_deg())
                .to_radians()
                .cos();

        Ok(EdgeCost {
            fuel_mt_per_hour: self.fuel_rate(power_kw),
            power_kw,
            speed_over_ground_kts: speed_kts + current_along,
            resistance_kn: resistance,
        })
    }

    /// Lowest fuel rate achievable at `speed_kts` in any weather.
    ///
    /// Used by admissible search heuristics.
    pub fn min_fuel_rate(&self, speed_kts: f64, is_laden: bool) -> Result<f64> {
        self.check_speed(speed_kts)?;
        let hull = self.hull(is_laden);
        let speed_ms = speed_kts * KTS_TO_MS;
        let floor =
            Self::calm_resistance_n(&hull, speed_ms) * self.factors.calm_water * MIN_RESISTANCE_FRACTION;
        Ok(self.fuel_rate(Self::power_kw(floor, speed_ms)))
    }

    /// Uncalibrated calm-water, wind and wave resistance in newtons, before
    /// the resistance floor.
    pub(crate) fn raw_components_n(
        &self,
        speed_kts: f64,
        heading_deg: f64,
        is_laden: bool,
        weather: &MetOcean,
    ) -> Result<[f64; 3]> {
        self.check_speed(speed_kts)?;
        let hull = self.hull(is_laden);
        let speed_ms = speed_kts * KTS_TO_MS;
        Ok([
            Self::calm_resistance_n(&hull, speed_ms),
            Self::wind_resistance_n(&hull, speed_ms, heading_deg, weather),
            Self::wave_resistance_n(&hull, heading_deg, weather),
        ])
    }

    /// Resistance in newtons that burns `fuel_mt_per_hour` at `speed_kts`.
    ///
    /// Inverts the fuel curve, which is strictly increasing in power.
    pub(crate) fn resistance_for_fuel_rate_n(&self, fuel_mt_per_hour: f64, speed_kts: f64) -> f64 {
        let mut low = 0.0;
        let mut high = self.specs.mcr_kw;
        while self.fuel_rate(high) < fuel_mt_per_hour && high.is_finite() {
            high *= 2.0;
        }
        for _ in 0..100 {
            let mid = 0.5 * (low + high);
            if self.fuel_rate(mid) < fuel_mt_per_hour {
                low = mid;
            } else {
                high = mid;
            }
        }
        let power_kw = 0.5 * (low + high);
        power_kw * 1000.0 * PROPULSIVE_EFFICIENCY / (speed_kts * KTS_TO_MS)
    }

    /// Fuel for a voyage of `distance_nm` under a single set of conditions.
    ///
    /// `weather` of `None` is calm water. Time uses speed through the water so
    /// the result is comparable across weather scenarios.
    pub fn voyage_fuel(
        &self,
        speed_kts: f64,
        is_laden: bool,
        weather: Option<&MetOcean>,
        heading_deg: f64,
        distance_nm: f64,
    ) -> Result<VoyageFuel> {
        let conditions = weather.copied().unwrap_or_default();
        let cost = self.edge_cost(speed_kts, heading_deg, is_laden, &conditions)?;
        let time_hours = distance_nm / speed_kts;
        let fuel_mt = cost.fuel_mt_per_hour * time_hours;

        let r = cost.resistance_kn;
        let components = r.calm_water + r.wind.max(0.0) + r.waves;
        let share = |value: f64| {
            if components > 0.0 {
                fuel_mt * value / components
            } else {
                0.0
            }
        };

        Ok(VoyageFuel {
            fuel_mt,
            power_kw: cost.power_kw,
            time_hours,
            fuel_breakdown: FuelBreakdown {
                calm_water: share(r.calm_water),
                wind: share(r.wind.max(0.0)),
                waves: share(r.waves),
            },
            resistance_breakdown_kn: r,
        })
    }
}

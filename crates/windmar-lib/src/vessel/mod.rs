//! Vessel particulars, catalog, the fuel cost model and its calibration.

pub mod calibration;
pub mod catalog;
pub mod cost;
pub mod scenarios;
pub mod specs;

pub use calibration::{
    calibrate, noon_reports_from_reader, read_noon_reports, CalibrationFactors, CalibrationResult,
    NoonReport, MIN_NOON_REPORTS,
};
pub use catalog::VesselCatalog;
pub use cost::{
    CostModel, EdgeCost, FuelBreakdown, LegCost, ResistanceBreakdown, VoyageFuel,
    MIN_RESISTANCE_FRACTION, MIN_SPEED_OVER_GROUND_KTS,
};
pub use scenarios::{fuel_scenarios, FuelScenario};
pub use specs::VesselSpecs;

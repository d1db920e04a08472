//! Canned fuel comparisons over a reference day's steaming.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::weather::MetOcean;

use super::cost::CostModel;

/// One evaluated scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelScenario {
    pub name: String,
    pub conditions: String,
    pub fuel_mt: f64,
    pub power_kw: f64,
}

struct ScenarioDef {
    name: &'static str,
    conditions: &'static str,
    speed_kts: f64,
    is_laden: bool,
    distance_nm: f64,
    weather: Option<MetOcean>,
}

fn definitions() -> [ScenarioDef; 4] {
    [
        ScenarioDef {
            name: "Calm Weather (Laden)",
            conditions: "14.5 kts, no wind/waves",
            speed_kts: 14.5,
            is_laden: true,
            distance_nm: 348.0,
            weather: None,
        },
        ScenarioDef {
            name: "Head Wind 20 kts (Laden)",
            conditions: "14.5 kts, 20 kt head wind",
            speed_kts: 14.5,
            is_laden: true,
            distance_nm: 348.0,
            weather: Some(MetOcean::from_wind(10.0, 0.0)),
        },
        ScenarioDef {
            name: "Rough Seas (Laden)",
            conditions: "14.5 kts, 25 kt wind + 3m waves",
            speed_kts: 14.5,
            is_laden: true,
            distance_nm: 348.0,
            weather: Some(MetOcean::from_wind(12.5, 0.0).with_waves(3.0, 0.0)),
        },
        ScenarioDef {
            name: "Calm Weather (Ballast)",
            conditions: "15 kts, no wind/waves",
            speed_kts: 15.0,
            is_laden: false,
            distance_nm: 360.0,
            weather: None,
        },
    ]
}

/// Evaluate the four reference scenarios for a vessel, heading north.
pub fn fuel_scenarios(model: &CostModel) -> Result<Vec<FuelScenario>> {
    definitions()
        .into_iter()
        .map(|def| {
            let result = model.voyage_fuel(
                def.speed_kts,
                def.is_laden,
                def.weather.as_ref(),
                0.0,
                def.distance_nm,
            )?;
            Ok(FuelScenario {
                name: def.name.to_string(),
                conditions: def.conditions.to_string(),
                fuel_mt: result.fuel_mt,
                power_kw: result.power_kw,
            })
        })
        .collect()
}

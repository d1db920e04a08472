//! Vessel hull and engine particulars.
//!
//! A [`VesselSpecs`] value is a configuration snapshot: the planner receives one
//! per request and never caches it across evaluations.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Hull and engine parameters consumed by the cost model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselSpecs {
    pub name: String,
    /// Deadweight in tonnes.
    pub dwt: f64,
    /// Length overall in metres.
    pub loa: f64,
    /// Moulded beam in metres.
    pub beam: f64,
    pub draft_laden: f64,
    pub draft_ballast: f64,
    /// Maximum continuous rating of the main engine in kW.
    pub mcr_kw: f64,
    /// Specific fuel oil consumption at MCR in g/kWh.
    pub sfoc_at_mcr: f64,
    pub service_speed_laden: f64,
    pub service_speed_ballast: f64,
    /// Upper bound on speed through water in knots; speeds must stay below it.
    #[serde(default = "default_max_speed")]
    pub max_speed_kts: f64,
}

fn default_max_speed() -> f64 {
    18.0
}

impl Default for VesselSpecs {
    /// MR product tanker used when no vessel catalog is supplied.
    fn default() -> Self {
        Self {
            name: "MR Tanker".to_string(),
            dwt: 49_000.0,
            loa: 183.0,
            beam: 32.0,
            draft_laden: 11.8,
            draft_ballast: 6.5,
            mcr_kw: 8_840.0,
            sfoc_at_mcr: 171.0,
            service_speed_laden: 14.5,
            service_speed_ballast: 15.0,
            max_speed_kts: default_max_speed(),
        }
    }
}

impl VesselSpecs {
    /// Validate vessel particulars for correctness.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::VesselDataValidation {
                message: "vessel name must not be empty".to_string(),
            });
        }

        let fields = [
            (self.dwt, "dwt"),
            (self.loa, "loa"),
            (self.beam, "beam"),
            (self.draft_laden, "draft_laden"),
            (self.draft_ballast, "draft_ballast"),
            (self.mcr_kw, "mcr_kw"),
            (self.sfoc_at_mcr, "sfoc_at_mcr"),
            (self.service_speed_laden, "service_speed_laden"),
            (self.service_speed_ballast, "service_speed_ballast"),
            (self.max_speed_kts, "max_speed_kts"),
        ];

        for (value, field) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::VesselDataValidation {
                    message: format!("{field} must be a finite positive number"),
                });
            }
        }

        if self.draft_ballast > self.draft_laden {
            return Err(Error::VesselDataValidation {
                message: "draft_ballast must not exceed draft_laden".to_string(),
            });
        }

        if self.service_speed_laden >= self.max_speed_kts
            || self.service_speed_ballast >= self.max_speed_kts
        {
            return Err(Error::VesselDataValidation {
                message: "service speeds must be below max_speed_kts".to_string(),
            });
        }

        Ok(())
    }

    pub fn draft(&self, is_laden: bool) -> f64 {
        if is_laden {
            self.draft_laden
        } else {
            self.draft_ballast
        }
    }

    pub fn service_speed(&self, is_laden: bool) -> f64 {
        if is_laden {
            self.service_speed_laden
        } else {
            self.service_speed_ballast
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_specs_are_valid() {
        VesselSpecs::default().validate().expect("default vessel valid");
    }

    #[test]
    fn rejects_non_positive_fields() {
        let specs = VesselSpecs {
            mcr_kw: 0.0,
            ..VesselSpecs::default()
        };
        let err = specs.validate().expect_err("zero mcr rejected");
        assert!(err.to_string().contains("mcr_kw"));
    }

    #[test]
    fn rejects_service_speed_above_max() {
        let specs = VesselSpecs {
            service_speed_ballast: 19.0,
            ..VesselSpecs::default()
        };
        assert!(specs.validate().is_err());
    }
}

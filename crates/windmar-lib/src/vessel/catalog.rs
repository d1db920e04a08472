//! Vessel catalog loading and lookup.
//!
//! The catalog is the read side of the vessel-specification provider: a CSV
//! file with one row per vessel, validated on load.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};

use crate::error::{Error, Result};

use super::specs::VesselSpecs;

/// Collection of vessel definitions loaded from a CSV file.
#[derive(Debug, Clone, Default)]
pub struct VesselCatalog {
    vessels: HashMap<String, VesselSpecs>,
    source: Option<PathBuf>,
}

impl VesselCatalog {
    /// Load a catalog from a file path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let mut catalog = Self::from_reader(file)?;
        catalog.source = Some(path.to_path_buf());
        Ok(catalog)
    }

    /// Load a catalog from a reader (e.g., file or in-memory buffer).
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new().trim(Trim::Fields).from_reader(reader);
        let mut vessels = HashMap::new();

        for record in csv_reader.deserialize::<VesselSpecs>() {
            let mut vessel: VesselSpecs = record.map_err(|err| Error::VesselDataValidation {
                message: err.to_string(),
            })?;
            vessel.name = vessel.name.trim().to_string();
            vessel.validate()?;

            let key = normalize_name(&vessel.name);
            if vessels.contains_key(&key) {
                return Err(Error::DuplicateVesselName { name: vessel.name });
            }
            vessels.insert(key, vessel);
        }

        Ok(Self {
            vessels,
            source: None,
        })
    }

    /// Catalog containing only the built-in default vessel.
    pub fn builtin() -> Self {
        let vessel = VesselSpecs::default();
        let mut vessels = HashMap::new();
        vessels.insert(normalize_name(&vessel.name), vessel);
        Self {
            vessels,
            source: None,
        }
    }

    /// Case-insensitive lookup by vessel name.
    pub fn get(&self, name: &str) -> Option<&VesselSpecs> {
        self.vessels.get(&normalize_name(name))
    }

    pub fn vessels_sorted(&self) -> Vec<&VesselSpecs> {
        let mut vessels: Vec<&VesselSpecs> = self.vessels.values().collect();
        vessels.sort_by(|a, b| a.name.cmp(&b.name));
        vessels
    }

    pub fn len(&self) -> usize {
        self.vessels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vessels.is_empty()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

//! Vessel catalog loading and the `vessels` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use windmar_lib::{VesselCatalog, VesselSpecs};

use crate::output::{print_json, render_vessels, OutputFormat};

/// Environment variable naming a vessel catalog CSV.
pub const CATALOG_ENV: &str = "WINDMAR_VESSEL_CATALOG";

/// Arguments selecting a vessel from a catalog.
#[derive(Debug, Clone, Default, Args)]
pub struct VesselArgs {
    /// Vessel catalog CSV (defaults to $WINDMAR_VESSEL_CATALOG, else the built-in tanker).
    #[arg(long)]
    pub catalog: Option<PathBuf>,
    /// Vessel name in the catalog (case-insensitive).
    #[arg(long)]
    pub vessel: Option<String>,
}

impl VesselArgs {
    /// Resolve the requested vessel, or the built-in default when no name is given.
    pub fn resolve(&self) -> Result<VesselSpecs> {
        let Some(name) = self.vessel.as_deref() else {
            return Ok(VesselSpecs::default());
        };
        let catalog = load_catalog(self.catalog.as_deref())?;
        catalog.get(name).cloned().ok_or_else(|| {
            let known: Vec<&str> = catalog
                .vessels_sorted()
                .into_iter()
                .map(|vessel| vessel.name.as_str())
                .collect();
            anyhow::anyhow!("unknown vessel '{}'; available: {}", name, known.join(", "))
        })
    }
}

/// Load the vessel catalog.
///
/// Searches in order:
/// 1. The explicit `--catalog` path
/// 2. `WINDMAR_VESSEL_CATALOG`
/// 3. The built-in catalog holding only the default tanker
pub fn load_catalog(explicit: Option<&Path>) -> Result<VesselCatalog> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CATALOG_ENV).map(PathBuf::from));

    match path {
        Some(path) => VesselCatalog::from_path(&path)
            .with_context(|| format!("failed to load vessel catalog from {}", path.display())),
        None => Ok(VesselCatalog::builtin()),
    }
}

/// Handle the `vessels` subcommand.
pub fn handle_list_vessels(catalog: Option<&Path>, format: OutputFormat) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    let vessels = catalog.vessels_sorted();
    match format {
        OutputFormat::Text => {
            render_vessels(&vessels);
            Ok(())
        }
        OutputFormat::Json => print_json(&vessels),
    }
}

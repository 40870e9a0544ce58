//! JSON report export

use crate::error::{JsProbeError, Result};
use crate::models::ScanRun;
use std::path::Path;
use tracing::info;

/// Exports a run as a JSON file
pub fn export(run: &ScanRun, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(run)?;
    std::fs::write(output_path, json)?;
    info!("JSON report saved to {}", output_path.display());
    Ok(())
}

/// Loads a run exported by [`export`]. Errors name the offending file.
pub fn load(input_path: &Path) -> Result<ScanRun> {
    let content = std::fs::read_to_string(input_path).map_err(|e| {
        JsProbeError::InvalidInput(format!("cannot read {}: {e}", input_path.display()))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        JsProbeError::InvalidInput(format!(
            "{} is not a jsprobe JSON export: {e}",
            input_path.display()
        ))
    })
}

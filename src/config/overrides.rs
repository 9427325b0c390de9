//! Command-line overrides (Layer 3).
//!
//! Values given on the command line for a single run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Overrides for a single run.
///
/// These beat both the plan file and the application config.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlanOverrides {
    /// Override the visibility dataset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<PathBuf>,

    /// Override the output directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Override the CASA executable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub casa: Option<PathBuf>,

    /// Override the reference antenna.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_antenna: Option<String>,

    /// Comma-separated solution intervals, replacing the plan's list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solution_intervals: Option<String>,

    /// Override the cycle timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_timeout_secs: Option<u64>,
}

impl PlanOverrides {
    /// Check if any overrides are set.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_none()
            && self.output_dir.is_none()
            && self.casa.is_none()
            && self.reference_antenna.is_none()
            && self.solution_intervals.is_none()
            && self.cycle_timeout_secs.is_none()
    }
}

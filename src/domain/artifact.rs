//! Per-cycle artifacts
//!
//! Images and correction tables are opaque engine outputs identified by
//! path. They are created once per cycle and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::naming;

/// Names and solution interval for one cycle, derived before it runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleContext {
    /// 0-based cycle index
    pub index: usize,
    /// Solution interval used by this cycle's gain solve
    pub solution_interval: String,
    /// Image name prefix for this cycle
    pub image_prefix: PathBuf,
    /// Correction table produced by this cycle
    pub gain_table: PathBuf,
    /// Directory all artifacts are written to
    pub output_dir: PathBuf,
}

impl CycleContext {
    pub fn new(output_dir: &Path, index: usize, solution_interval: &str) -> Self {
        Self {
            index,
            solution_interval: solution_interval.to_string(),
            image_prefix: naming::image_prefix(output_dir, index),
            gain_table: naming::gain_table(output_dir, index),
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// 1-based cycle number, as used in file names and log messages
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// Output of imaging one cycle: a model and a residual component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArtifact {
    pub cycle: usize,
    pub prefix: PathBuf,
    pub model: PathBuf,
    pub residual: PathBuf,
}

impl ImageArtifact {
    /// Artifact for the conventional FITS exports of `prefix`
    pub fn from_prefix(cycle: usize, prefix: &Path) -> Self {
        Self {
            cycle,
            prefix: prefix.to_path_buf(),
            model: naming::model_fits(prefix),
            residual: naming::residual_fits(prefix),
        }
    }
}

/// Gain solution produced by one calibration step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionTable {
    pub cycle: usize,
    pub solution_interval: String,
    pub path: PathBuf,
}

impl CorrectionTable {
    pub fn for_cycle(cycle: &CycleContext) -> Self {
        Self {
            cycle: cycle.index,
            solution_interval: cycle.solution_interval.clone(),
            path: cycle.gain_table.clone(),
        }
    }
}

/// Result of comparing two successive residuals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementMetric {
    /// Whether the residual noise dropped meaningfully
    pub improved: bool,
    pub previous_rms: Option<f64>,
    pub current_rms: Option<f64>,
    pub detail: String,
}

impl ImprovementMetric {
    /// The cycle improved on its predecessor
    pub fn improved(detail: impl Into<String>) -> Self {
        Self {
            improved: true,
            previous_rms: None,
            current_rms: None,
            detail: detail.into(),
        }
    }

    /// The cycle did not improve on its predecessor
    pub fn stalled(detail: impl Into<String>) -> Self {
        Self {
            improved: false,
            previous_rms: None,
            current_rms: None,
            detail: detail.into(),
        }
    }

    /// Attach the residual RMS values the decision was based on
    pub fn with_rms(mut self, previous: f64, current: f64) -> Self {
        self.previous_rms = Some(previous);
        self.current_rms = Some(current);
        self
    }

    /// Fractional drop in RMS, if both values are known
    pub fn fractional_improvement(&self) -> Option<f64> {
        match (self.previous_rms, self.current_rms) {
            (Some(prev), Some(curr)) if prev > 0.0 => Some((prev - curr) / prev),
            _ => None,
        }
    }
}

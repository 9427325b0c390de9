//! Cycle parameters
//!
//! Configuration that applies to every self-calibration cycle. Paths are
//! made absolute once before the first cycle; nothing changes afterwards.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SelfcalError};

/// Imaging configuration handed to the engine's imager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingParams {
    /// Image size in pixels
    pub imsize: [u32; 2],
    /// Pixel scale, as an engine quantity (e.g. "0.075arcsec")
    pub cell: String,
    /// Weighting scheme (e.g. "briggs")
    pub weighting: String,
    /// Briggs robustness, typically -1 to +1
    pub robust: f64,
    /// CLEAN stopping threshold (e.g. "1.0mJy")
    pub threshold: String,
    /// Masking threshold
    pub mask: String,
    /// Minor cycle limit
    pub niter: u64,
    /// Major cycle limit
    pub nmiter: u32,
    /// Number of output channels
    pub nchan: u32,
    /// Spectral mode (e.g. "mfs")
    pub specmode: String,
    /// Padding factor
    pub padding: f64,
    /// Run the imager interactively
    pub interactive: bool,
    /// Seed the imager with the previous cycle's model
    #[serde(default)]
    pub use_start_model: bool,
}

impl ImagingParams {
    /// Check the imaging parameters for values the engine would reject
    pub fn validate(&self) -> Result<()> {
        if self.imsize[0] == 0 || self.imsize[1] == 0 {
            return Err(SelfcalError::config(format!(
                "imsize must be positive, got {:?}",
                self.imsize
            )));
        }
        if self.cell.trim().is_empty() {
            return Err(SelfcalError::config("cell must not be empty"));
        }
        if self.weighting.trim().is_empty() {
            return Err(SelfcalError::config("weighting must not be empty"));
        }
        if self.specmode.trim().is_empty() {
            return Err(SelfcalError::config("specmode must not be empty"));
        }
        if self.nchan == 0 {
            return Err(SelfcalError::config("nchan must be at least 1"));
        }
        if !(self.padding >= 1.0) {
            return Err(SelfcalError::config(format!(
                "padding must be >= 1.0, got {}",
                self.padding
            )));
        }
        Ok(())
    }
}

/// Which correction tables are applied at each cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPolicy {
    /// Apply only the table solved in the current cycle (phase-only selfcal)
    #[default]
    CurrentOnly,
    /// Apply every table solved so far plus the current one (amplitude+phase)
    Accumulate,
}

/// Gain solve settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Gain type passed to gaincal
    pub gaintype: String,
    /// "p", "a" or "ap"
    pub calmode: String,
    /// Table application policy
    pub apply_policy: ApplyPolicy,
    /// Recalibrate data weights when applying
    pub calwt: bool,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            gaintype: "G".to_string(),
            calmode: "p".to_string(),
            apply_policy: ApplyPolicy::CurrentOnly,
            calwt: false,
        }
    }
}

impl CalibrationParams {
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.calmode.as_str(), "p" | "a" | "ap") {
            return Err(SelfcalError::config(format!(
                "calmode must be one of p, a, ap; got '{}'",
                self.calmode
            )));
        }
        if self.gaintype.trim().is_empty() {
            return Err(SelfcalError::config("gaintype must not be empty"));
        }
        Ok(())
    }
}

/// How successive cycles are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum ConvergenceParams {
    /// Log the residuals being compared, never stop early
    #[default]
    LogOnly,
    /// Stop when residual RMS fails to drop by at least `min_improvement`
    /// (a fraction of the previous RMS)
    ResidualRms { min_improvement: f64 },
}

impl ConvergenceParams {
    pub fn validate(&self) -> Result<()> {
        if let ConvergenceParams::ResidualRms { min_improvement } = self {
            if !(0.0..1.0).contains(min_improvement) {
                return Err(SelfcalError::config(format!(
                    "min_improvement must be in [0, 1), got {}",
                    min_improvement
                )));
            }
        }
        Ok(())
    }
}

/// Ordered, non-empty sequence of solution intervals, coarsest first.
///
/// Its length is the maximum number of cycles a run performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SolutionIntervals(Vec<String>);

impl SolutionIntervals {
    pub fn new(intervals: Vec<String>) -> Result<Self> {
        if intervals.is_empty() {
            return Err(SelfcalError::config("solution interval sequence must not be empty"));
        }
        if let Some(pos) = intervals.iter().position(|s| s.trim().is_empty()) {
            return Err(SelfcalError::config(format!(
                "solution interval {} is blank",
                pos + 1
            )));
        }
        Ok(Self(intervals.into_iter().map(|s| s.trim().to_string()).collect()))
    }

    /// Parse a comma separated list such as "inf,1min,30s"
    pub fn parse_list(list: &str) -> Result<Self> {
        Self::new(list.split(',').map(str::to_string).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a constructed sequence
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, cycle: usize) -> Option<&str> {
        self.0.get(cycle).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl TryFrom<Vec<String>> for SolutionIntervals {
    type Error = SelfcalError;

    fn try_from(value: Vec<String>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SolutionIntervals> for Vec<String> {
    fn from(value: SolutionIntervals) -> Self {
        value.0
    }
}

/// Configuration shared by every cycle of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleParameters {
    /// Visibility dataset corrected in place across cycles
    pub dataset: PathBuf,
    /// Directory receiving scripts, images and tables
    pub output_dir: PathBuf,
    /// Antenna whose phase is held at zero
    pub reference_antenna: String,
    pub imaging: ImagingParams,
    pub calibration: CalibrationParams,
    pub convergence: ConvergenceParams,
}

impl CycleParameters {
    /// Validate parameters that do not touch the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.reference_antenna.trim().is_empty() {
            return Err(SelfcalError::config("reference antenna must not be empty"));
        }
        self.imaging.validate()?;
        self.calibration.validate()?;
        self.convergence.validate()?;
        Ok(())
    }

    /// Make `dataset` and `output_dir` absolute, check the dataset exists
    /// and the output directory is usable, creating it if needed.
    ///
    /// Relative paths are taken against the current directory.
    pub fn prepare(&mut self) -> Result<()> {
        self.validate()?;

        self.dataset = absolute(&self.dataset)?;
        self.output_dir = absolute(&self.output_dir)?;

        if !self.dataset.exists() {
            return Err(SelfcalError::config(format!(
                "dataset {} does not exist",
                self.dataset.display()
            )));
        }

        prepare_output_dir(&self.output_dir)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .map_err(|e| SelfcalError::config(format!("cannot resolve {}: {}", path.display(), e)))
}

/// Scratch file used to check the output directory accepts writes
const WRITE_CHECK_FILE: &str = ".selfcal-write-check";

/// Create the output directory and check that it is writable
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        SelfcalError::config(format!("cannot create output directory {}: {}", dir.display(), e))
    })?;

    let meta = fs::metadata(dir).map_err(|e| {
        SelfcalError::config(format!("cannot stat output directory {}: {}", dir.display(), e))
    })?;
    if !meta.is_dir() {
        return Err(SelfcalError::config(format!("{} is not a directory", dir.display())));
    }

    let check = dir.join(WRITE_CHECK_FILE);
    fs::write(&check, b"").map_err(|e| {
        SelfcalError::config(format!("output directory {} is not writable: {}", dir.display(), e))
    })?;
    fs::remove_file(&check).map_err(|e| {
        SelfcalError::config(format!("cannot clean up {}: {}", check.display(), e))
    })?;
    Ok(())
}

//! Plan resolution (3-layer merge).
//!
//! Resolves the effective run from:
//! 1. Config (engine defaults)
//! 2. RunPlan (the plan file)
//! 3. PlanOverrides (command line)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Config, PlanOverrides};
use crate::domain::{
    CalibrationParams, ConvergenceParams, CycleContext, CycleParameters, ImagingParams, SolutionIntervals,
};
use crate::error::{Result, SelfcalError};
use crate::runner::RunnerConfig;

/// Contents of a run plan file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    pub dataset: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub casa_path: Option<PathBuf>,
    pub reference_antenna: String,
    pub solution_intervals: SolutionIntervals,
    pub imaging: ImagingParams,
    #[serde(default)]
    pub calibration: CalibrationParams,
    #[serde(default)]
    pub convergence: ConvergenceParams,
}

impl RunPlan {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| SelfcalError::config(format!("cannot read plan {}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| SelfcalError::config(format!("invalid plan {}: {}", path.display(), e)))
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Everything needed to start a run
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRun {
    pub params: CycleParameters,
    pub intervals: SolutionIntervals,
    pub executable: PathBuf,
    pub extra_args: Vec<String>,
    pub cycle_timeout: Option<Duration>,
}

impl ResolvedRun {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            cycle_timeout: self.cycle_timeout,
        }
    }

    /// Artifact names of every cycle the run may perform
    pub fn cycles(&self) -> Vec<CycleContext> {
        self.intervals
            .iter()
            .enumerate()
            .map(|(i, solint)| CycleContext::new(&self.params.output_dir, i, solint))
            .collect()
    }
}

/// Merges the application config, a plan and command-line overrides.
#[derive(Debug)]
pub struct PlanResolver {
    config: Config,
}

impl PlanResolver {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Resolve the effective run.
    ///
    /// Resolution order, later wins:
    /// 1. Application config
    /// 2. Plan file
    /// 3. Overrides
    pub fn resolve(&self, plan: RunPlan, overrides: &PlanOverrides) -> Result<ResolvedRun> {
        let intervals = match &overrides.solution_intervals {
            Some(list) => SolutionIntervals::parse_list(list)?,
            None => plan.solution_intervals,
        };

        let executable = overrides
            .casa
            .clone()
            .or(plan.casa_path)
            .or_else(|| self.config.casa.executable.clone())
            .ok_or_else(|| {
                SelfcalError::config(
                    "no CASA executable configured: set casa_path in the plan, casa.executable in the config, or pass --casa",
                )
            })?;

        let cycle_timeout = match overrides.cycle_timeout_secs.or(self.config.casa.cycle_timeout_secs) {
            Some(0) => return Err(SelfcalError::config("cycle timeout must be at least 1 second")),
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let params = CycleParameters {
            dataset: overrides.dataset.clone().unwrap_or(plan.dataset),
            output_dir: overrides.output_dir.clone().unwrap_or(plan.output_dir),
            reference_antenna: overrides
                .reference_antenna
                .clone()
                .unwrap_or(plan.reference_antenna),
            imaging: plan.imaging,
            calibration: plan.calibration,
            convergence: plan.convergence,
        };
        params.validate()?;

        Ok(ResolvedRun {
            params,
            intervals,
            executable,
            extra_args: self.config.casa.extra_args.clone(),
            cycle_timeout,
        })
    }
}

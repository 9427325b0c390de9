//! Run outcome and report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::artifact::{CorrectionTable, ImprovementMetric};
use super::state::RunState;

/// Successful end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// Stopped early because a cycle did not improve on its predecessor
    Converged,
    /// Every solution interval was used
    Exhausted,
}

/// What happened in one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// 0-based cycle index
    pub cycle: usize,
    pub solution_interval: String,
    pub image_prefix: PathBuf,
    /// Set once calibration succeeded
    pub gain_table: Option<PathBuf>,
    /// Set for every cycle after the first
    pub improvement: Option<ImprovementMetric>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CycleRecord {
    pub fn start(cycle: usize, solution_interval: &str, image_prefix: PathBuf) -> Self {
        Self {
            cycle,
            solution_interval: solution_interval.to_string(),
            image_prefix,
            gain_table: None,
            improvement: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Summary of a run, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub state: RunState,
    pub cycles: Vec<CycleRecord>,
    /// Every table produced, in cycle order
    pub correction_tables: Vec<CorrectionTable>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn outcome(&self) -> Option<RunOutcome> {
        match self.state {
            RunState::Converged { .. } => Some(RunOutcome::Converged),
            RunState::Exhausted { .. } => Some(RunOutcome::Exhausted),
            _ => None,
        }
    }

    /// Number of cycles that ran to completion
    pub fn completed_cycles(&self) -> usize {
        self.cycles.iter().filter(|c| c.is_finished()).count()
    }
}

//! Run state machine and per-cycle carried state.
//!
//! `NotStarted -> Running(cycle) -> {Converged | Exhausted | Failed(cycle, phase)}`

use serde::{Deserialize, Serialize};
use std::fmt;

use super::artifact::{CorrectionTable, ImageArtifact};
use super::params::ApplyPolicy;

/// Step of a cycle that talks to the external engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Image,
    Calibrate,
    Evaluate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Image => "image",
            Phase::Calibrate => "calibrate",
            Phase::Evaluate => "evaluate",
        };
        f.write_str(s)
    }
}

/// State of a self-calibration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// Parameters not yet checked, no cycle started
    NotStarted,
    /// Cycle `cycle` (0-based) in progress
    Running { cycle: usize },
    /// Stopped early: a cycle failed to improve on its predecessor
    Converged { cycles: usize },
    /// Ran every solution interval
    Exhausted { cycles: usize },
    /// An engine step failed
    Failed { cycle: usize, phase: Phase },
}

impl RunState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Converged { .. } | RunState::Exhausted { .. } | RunState::Failed { .. }
        )
    }

    /// Returns true for the two successful terminal states
    pub fn is_success(&self) -> bool {
        matches!(self, RunState::Converged { .. } | RunState::Exhausted { .. })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not started"),
            RunState::Running { cycle } => write!(f, "running cycle {}", cycle + 1),
            RunState::Converged { cycles } => write!(f, "converged after {} cycles", cycles),
            RunState::Exhausted { cycles } => {
                write!(f, "all {} solution intervals completed", cycles)
            }
            RunState::Failed { cycle, phase } => {
                write!(f, "failed in cycle {} ({})", cycle + 1, phase)
            }
        }
    }
}

/// Mutable state carried from one cycle to the next
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleState {
    /// Index of the next cycle to run
    pub index: usize,
    /// Tables re-applied in addition to the current cycle's table.
    /// Append-only, and only grows under `ApplyPolicy::Accumulate`.
    applied: Vec<CorrectionTable>,
    /// Image produced by the previous cycle
    previous: Option<ImageArtifact>,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables to apply alongside the current cycle's solution
    pub fn prior_tables(&self) -> &[CorrectionTable] {
        &self.applied
    }

    pub fn previous_image(&self) -> Option<&ImageArtifact> {
        self.previous.as_ref()
    }

    /// Record a finished cycle and move on to the next index
    pub fn advance(&mut self, image: ImageArtifact, table: CorrectionTable, policy: ApplyPolicy) {
        if policy == ApplyPolicy::Accumulate {
            self.applied.push(table);
        }
        self.previous = Some(image);
        self.index += 1;
    }
}

//! Domain types for selfcal
//!
//! This module contains the core domain types:
//! - CycleParameters: immutable per-run configuration
//! - SolutionIntervals: ordered solution intervals, one per cycle
//! - ImageArtifact / CorrectionTable: per-cycle engine outputs
//! - RunState / CycleState: the run state machine and carried cycle state
//! - RunReport: the summary written at the end of a run

pub mod artifact;
pub mod outcome;
pub mod params;
pub mod state;

pub use artifact::{CorrectionTable, CycleContext, ImageArtifact, ImprovementMetric};
pub use outcome::{CycleRecord, RunOutcome, RunReport};
pub use params::{
    ApplyPolicy, CalibrationParams, ConvergenceParams, CycleParameters, ImagingParams, SolutionIntervals,
    prepare_output_dir,
};
pub use state::{CycleState, Phase, RunState};

//! Runner module - the self-calibration refinement loop.
//!
//! This module provides the core cycle execution logic:
//! - SelfcalRunner for executing one run over the solution intervals
//! - RunnerConfig for caller-level limits such as the cycle timeout

mod selfcal_runner;

pub use selfcal_runner::{RunnerConfig, SelfcalRunner};

//! Selfcal - iterative self-calibration of radio interferometric data
//!
//! Selfcal alternates imaging and gain calibration over a sequence of
//! progressively shorter solution intervals, driving an external engine
//! (CASA) one generated script at a time, and stops early once a cycle no
//! longer improves the residuals.

pub mod casa;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod naming;
pub mod report;
pub mod runner;

pub use error::{Result, SelfcalError};

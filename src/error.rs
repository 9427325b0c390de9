//! Error types for selfcal
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::domain::Phase;

/// All error types that can occur during a self-calibration run
#[derive(Debug, Error)]
pub enum SelfcalError {
    /// Bad paths or parameters, detected before any cycle runs
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An external engine step failed; the run is aborted
    #[error("Cycle {} failed during {phase}: {reason}", .cycle + 1)]
    CycleExecution {
        /// 0-based index of the failed cycle
        cycle: usize,
        /// Which step of the cycle failed
        phase: Phase,
        /// Underlying failure
        reason: String,
    },

    /// Engine invocation error (launch failure, non-zero exit, missing output)
    #[error("Engine error: {0}")]
    Engine(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SelfcalError {
    /// Build a configuration error from anything displayable
    pub fn config(msg: impl Into<String>) -> Self {
        SelfcalError::Configuration(msg.into())
    }

    /// True for errors raised before the first cycle started
    pub fn is_configuration(&self) -> bool {
        matches!(self, SelfcalError::Configuration(_))
    }
}

/// Result type alias for selfcal operations
pub type Result<T> = std::result::Result<T, SelfcalError>;

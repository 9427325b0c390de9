//! CASA engine
//!
//! Realises the engine traits by writing one script per step and running
//! it through the CASA executable:
//! - `casa_tclean_cycle_N.py`: imaging plus FITS export
//! - `casa_gaincal_cycle_N.py`: prediction, gain solve and apply
//! - `casa_imstat_cycle_N.py`: residual statistics for convergence checks

pub mod calibrator;
pub mod imager;
pub mod process;
pub mod script;
pub mod stats;

pub use calibrator::CasaCalibrator;
pub use imager::CasaImager;
pub use process::{CasaProcess, CasaProcessConfig};
pub use script::{CasaScript, PyValue, TaskCall};
pub use stats::{CasaImstat, ImageSummary};

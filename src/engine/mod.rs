// External engine interface
// Imaging, calibration and residual comparison, as seen by the runner

pub mod traits;

pub use traits::{Calibrator, Evaluator, Imager};

// External engine seam
// The refinement loop only sees these three operations

use async_trait::async_trait;

use crate::domain::{CorrectionTable, CycleContext, CycleParameters, ImageArtifact, ImprovementMetric};
use crate::error::Result;

/// Produces a sky model and residual from the current state of the dataset
#[async_trait]
pub trait Imager: Send + Sync {
    /// Image the dataset for one cycle
    ///
    /// # Arguments
    /// * `params` - Run-wide parameters (dataset, imaging configuration)
    /// * `cycle` - Names and solution interval for this cycle
    /// * `prior` - Image from the previous cycle, `None` on the first cycle
    async fn image(
        &self,
        params: &CycleParameters,
        cycle: &CycleContext,
        prior: Option<&ImageArtifact>,
    ) -> Result<ImageArtifact>;

    /// Get a description of this imager
    fn description(&self) -> &str {
        "imager"
    }
}

/// Solves for gains against an image and applies them to the dataset in place
#[async_trait]
pub trait Calibrator: Send + Sync {
    /// Solve this cycle's table, then apply `prior_tables` plus the new
    /// table to the dataset.
    async fn calibrate(
        &self,
        params: &CycleParameters,
        cycle: &CycleContext,
        image: &ImageArtifact,
        prior_tables: &[CorrectionTable],
    ) -> Result<CorrectionTable>;

    fn description(&self) -> &str {
        "calibrator"
    }
}

/// Compares the residuals of two successive cycles
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        params: &CycleParameters,
        previous: &ImageArtifact,
        current: &ImageArtifact,
    ) -> Result<ImprovementMetric>;

    fn description(&self) -> &str {
        "evaluator"
    }
}

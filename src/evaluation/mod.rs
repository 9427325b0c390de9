// Convergence evaluation
// Decides whether a cycle improved on its predecessor

pub mod residual;

pub use residual::{ResidualRmsEvaluator, ResidualStats};

use async_trait::async_trait;
use log::info;

use crate::domain::{CycleParameters, ImageArtifact, ImprovementMetric};
use crate::engine::Evaluator;
use crate::error::Result;

/// Logs which residuals would be compared and always reports improvement,
/// so the run uses every solution interval.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyEvaluator;

#[async_trait]
impl Evaluator for LogOnlyEvaluator {
    async fn evaluate(
        &self,
        _params: &CycleParameters,
        previous: &ImageArtifact,
        current: &ImageArtifact,
    ) -> Result<ImprovementMetric> {
        info!(
            "Compare {} with {}",
            current.residual.display(),
            previous.residual.display()
        );
        Ok(ImprovementMetric::improved("not measured"))
    }

    fn description(&self) -> &str {
        "log only"
    }
}

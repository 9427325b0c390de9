//! Residual-RMS convergence metric.

use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::domain::{CycleParameters, ImageArtifact, ImprovementMetric};
use crate::engine::Evaluator;
use crate::error::{Result, SelfcalError};

/// Source of residual noise measurements
#[async_trait]
pub trait ResidualStats: Send + Sync {
    /// RMS of the residual component of `image`
    async fn rms(&self, params: &CycleParameters, image: &ImageArtifact) -> Result<f64>;
}

/// Reports improvement when the residual RMS drops by at least
/// `min_improvement` (a fraction of the previous RMS).
pub struct ResidualRmsEvaluator<S: ResidualStats> {
    stats: Arc<S>,
    min_improvement: f64,
}

impl<S: ResidualStats> ResidualRmsEvaluator<S> {
    pub fn new(stats: Arc<S>, min_improvement: f64) -> Self {
        Self { stats, min_improvement }
    }

    /// Decide from two RMS values
    pub fn compare(&self, previous: f64, current: f64) -> ImprovementMetric {
        let target = previous * (1.0 - self.min_improvement);
        let metric = if current < target {
            ImprovementMetric::improved(format!(
                "residual rms {:.4e} -> {:.4e} (needed < {:.4e})",
                previous, current, target
            ))
        } else {
            ImprovementMetric::stalled(format!(
                "residual rms {:.4e} -> {:.4e}, not below {:.4e}",
                previous, current, target
            ))
        };
        metric.with_rms(previous, current)
    }
}

#[async_trait]
impl<S: ResidualStats> Evaluator for ResidualRmsEvaluator<S> {
    async fn evaluate(
        &self,
        params: &CycleParameters,
        previous: &ImageArtifact,
        current: &ImageArtifact,
    ) -> Result<ImprovementMetric> {
        let prev_rms = self.stats.rms(params, previous).await?;
        let curr_rms = self.stats.rms(params, current).await?;

        if !prev_rms.is_finite() || !curr_rms.is_finite() {
            return Err(SelfcalError::Engine(format!(
                "non-finite residual rms ({} -> {})",
                prev_rms, curr_rms
            )));
        }

        let metric = self.compare(prev_rms, curr_rms);
        info!(
            "Compared {} with {}: {}",
            current.residual.display(),
            previous.residual.display(),
            metric.detail
        );
        Ok(metric)
    }

    fn description(&self) -> &str {
        "residual rms"
    }
}

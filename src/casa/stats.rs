//! Residual image statistics via imstat.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::process::CasaProcess;
use super::script::{CasaScript, TaskCall};
use crate::domain::{CycleParameters, ImageArtifact};
use crate::error::{Result, SelfcalError};
use crate::evaluation::ResidualStats;
use crate::naming::{self, ScriptKind};

/// Summary statistics written by the imstat script
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub rms: f64,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
}

impl ImageSummary {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SelfcalError::Engine(format!("cannot read statistics {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Measures residual RMS by running imstat through CASA.
///
/// Each cycle's residual is measured at most once per run; the previous
/// cycle's summary is remembered for the next comparison.
pub struct CasaImstat {
    process: Arc<CasaProcess>,
    measured: Mutex<HashMap<usize, ImageSummary>>,
}

impl CasaImstat {
    pub fn new(process: Arc<CasaProcess>) -> Self {
        Self {
            process,
            measured: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, cycle: usize) -> Option<ImageSummary> {
        self.measured.lock().ok().and_then(|m| m.get(&cycle).copied())
    }

    pub fn script(image: &ImageArtifact, stats_path: &Path) -> CasaScript {
        CasaScript::new()
            .import("casatasks", &["imstat"])
            .import("json", &[])
            .comment(format!("Residual statistics for cycle {}", image.cycle + 1))
            .assign("stats", TaskCall::new("imstat").arg("imagename", &image.residual))
            .write_stats("stats", stats_path)
    }

    pub async fn summary(&self, output_dir: &Path, image: &ImageArtifact) -> Result<ImageSummary> {
        if let Some(summary) = self.cached(image.cycle) {
            return Ok(summary);
        }

        let stats_path = naming::residual_stats(output_dir, image.cycle);
        // A stats file left by an earlier run describes a different image
        if stats_path.exists() {
            tokio::fs::remove_file(&stats_path).await?;
        }
        let script = Self::script(image, &stats_path);
        let path = naming::script_path(output_dir, ScriptKind::Imstat, image.cycle);
        self.process.run(&script, &path).await?;

        let summary = ImageSummary::load(&stats_path)?;
        if let Ok(mut measured) = self.measured.lock() {
            measured.insert(image.cycle, summary);
        }
        Ok(summary)
    }
}

#[async_trait]
impl ResidualStats for CasaImstat {
    async fn rms(&self, params: &CycleParameters, image: &ImageArtifact) -> Result<f64> {
        Ok(self.summary(&params.output_dir, image).await?.rms)
    }
}

//! tclean-based imaging step.

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

use super::process::CasaProcess;
use super::script::{CasaScript, TaskCall};
use crate::domain::{CycleContext, CycleParameters, ImageArtifact};
use crate::engine::Imager;
use crate::error::Result;
use crate::naming::{self, ScriptKind};

/// Images the dataset with tclean and exports model and residual to FITS
pub struct CasaImager {
    process: Arc<CasaProcess>,
}

impl CasaImager {
    pub fn new(process: Arc<CasaProcess>) -> Self {
        Self { process }
    }

    /// Build the imaging script for one cycle
    pub fn script(params: &CycleParameters, cycle: &CycleContext, prior: Option<&ImageArtifact>) -> CasaScript {
        let img = &params.imaging;
        let prefix = &cycle.image_prefix;

        let start_model = if img.use_start_model {
            prior.map(|p| p.model.as_path())
        } else {
            None
        };

        let tclean = TaskCall::new("tclean")
            .arg("vis", &params.dataset)
            .arg("imagename", prefix)
            .arg("imsize", img.imsize)
            .arg("cell", &img.cell)
            .arg("weighting", &img.weighting)
            .arg("robust", img.robust)
            .arg("threshold", &img.threshold)
            .arg("mask", &img.mask)
            .arg("niter", img.niter)
            .arg("nmiter", img.nmiter)
            .arg("nchan", img.nchan)
            .arg("specmode", &img.specmode)
            .arg("padding", img.padding)
            .arg("interactive", img.interactive)
            .arg_opt("startmodel", start_model);

        let export = |product: &str, fits: std::path::PathBuf| {
            TaskCall::new("exportfits")
                .arg("imagename", naming::tclean_product(prefix, product))
                .arg("fitsimage", fits)
                .arg("overwrite", true)
        };

        CasaScript::new()
            .import("casatasks", &["tclean", "exportfits"])
            .comment(format!(
                "Self-calibration cycle {}: imaging (solint={})",
                cycle.number(),
                cycle.solution_interval
            ))
            .call(tclean)
            .call(export("model", naming::model_fits(prefix)))
            .call(export("residual", naming::residual_fits(prefix)))
    }
}

#[async_trait]
impl Imager for CasaImager {
    async fn image(
        &self,
        params: &CycleParameters,
        cycle: &CycleContext,
        prior: Option<&ImageArtifact>,
    ) -> Result<ImageArtifact> {
        let script = Self::script(params, cycle, prior);
        let path = naming::script_path(&cycle.output_dir, ScriptKind::Tclean, cycle.index);
        debug!("Imaging cycle {} into {}", cycle.number(), cycle.image_prefix.display());

        self.process.run(&script, &path).await?;

        Ok(ImageArtifact::from_prefix(cycle.index, &cycle.image_prefix))
    }

    fn description(&self) -> &str {
        "casa tclean"
    }
}

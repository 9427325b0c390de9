//! Gain solve and apply step.
//!
//! Imports the cycle's model FITS, predicts model visibilities into the
//! dataset, solves for gains over the cycle's solution interval and applies
//! the resulting table (plus any prior tables) in place.

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

use super::process::CasaProcess;
use super::script::{CasaScript, PyValue, TaskCall};
use crate::domain::{CorrectionTable, CycleContext, CycleParameters, ImageArtifact};
use crate::engine::Calibrator;
use crate::error::Result;
use crate::naming::{self, ScriptKind};

pub struct CasaCalibrator {
    process: Arc<CasaProcess>,
}

impl CasaCalibrator {
    pub fn new(process: Arc<CasaProcess>) -> Self {
        Self { process }
    }

    /// Build the calibration script for one cycle
    pub fn script(
        params: &CycleParameters,
        cycle: &CycleContext,
        image: &ImageArtifact,
        prior_tables: &[CorrectionTable],
    ) -> CasaScript {
        let cal = &params.calibration;
        let model_image = naming::model_casa_image(&image.prefix);

        let gaintable: Vec<PyValue> = prior_tables
            .iter()
            .map(|t| PyValue::from(&t.path))
            .chain(std::iter::once(PyValue::from(&cycle.gain_table)))
            .collect();

        CasaScript::new()
            .import("casatasks", &["importfits", "ft", "gaincal", "applycal"])
            .comment(format!(
                "Self-calibration cycle {}: gain solve (solint={})",
                cycle.number(),
                cycle.solution_interval
            ))
            .call(
                TaskCall::new("importfits")
                    .arg("fitsimage", &image.model)
                    .arg("imagename", &model_image)
                    .arg("overwrite", true),
            )
            .call(
                TaskCall::new("ft")
                    .arg("vis", &params.dataset)
                    .arg("model", &model_image)
                    .arg("usescratch", true),
            )
            .call(
                TaskCall::new("gaincal")
                    .arg("vis", &params.dataset)
                    .arg("caltable", &cycle.gain_table)
                    .arg("solint", &cycle.solution_interval)
                    .arg("refant", &params.reference_antenna)
                    .arg("gaintype", &cal.gaintype)
                    .arg("calmode", &cal.calmode),
            )
            .call(
                TaskCall::new("applycal")
                    .arg("vis", &params.dataset)
                    .arg("gaintable", PyValue::List(gaintable))
                    .arg("calwt", cal.calwt),
            )
    }
}

#[async_trait]
impl Calibrator for CasaCalibrator {
    async fn calibrate(
        &self,
        params: &CycleParameters,
        cycle: &CycleContext,
        image: &ImageArtifact,
        prior_tables: &[CorrectionTable],
    ) -> Result<CorrectionTable> {
        let script = Self::script(params, cycle, image, prior_tables);
        let path = naming::script_path(&cycle.output_dir, ScriptKind::Gaincal, cycle.index);
        debug!(
            "Calibrating cycle {} against {} ({} prior tables)",
            cycle.number(),
            image.model.display(),
            prior_tables.len()
        );

        self.process.run(&script, &path).await?;

        Ok(CorrectionTable::for_cycle(cycle))
    }

    fn description(&self) -> &str {
        "casa gaincal/applycal"
    }
}

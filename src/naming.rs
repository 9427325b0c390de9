//! Artifact naming for self-calibration cycles
//!
//! Every name is a pure function of the output directory and the 0-based
//! cycle index. Names on disk are 1-based (`selfcal_cycle_1`, ...) so that
//! postprocessing tooling can find them.

use std::path::{Path, PathBuf};

/// Kind of generated engine script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    /// Imaging (tclean + exportfits)
    Tclean,
    /// Prediction, gain solve and apply
    Gaincal,
    /// Residual statistics
    Imstat,
}

impl ScriptKind {
    fn stem(&self) -> &'static str {
        match self {
            ScriptKind::Tclean => "casa_tclean",
            ScriptKind::Gaincal => "casa_gaincal",
            ScriptKind::Imstat => "casa_imstat",
        }
    }
}

/// Summary file written at the end of every run
pub const SUMMARY_FILE: &str = "selfcal_summary.json";

/// Image name prefix: `{output_dir}/selfcal_cycle_{i+1}`
pub fn image_prefix(output_dir: &Path, cycle: usize) -> PathBuf {
    output_dir.join(format!("selfcal_cycle_{}", cycle + 1))
}

/// Gain table: `{output_dir}/gains_cycle_{i+1}.cal`
pub fn gain_table(output_dir: &Path, cycle: usize) -> PathBuf {
    output_dir.join(format!("gains_cycle_{}.cal", cycle + 1))
}

/// Generated script: `{output_dir}/casa_{kind}_cycle_{i+1}.py`
pub fn script_path(output_dir: &Path, kind: ScriptKind, cycle: usize) -> PathBuf {
    output_dir.join(format!("{}_cycle_{}.py", kind.stem(), cycle + 1))
}

/// Residual statistics written by the imstat script
pub fn residual_stats(output_dir: &Path, cycle: usize) -> PathBuf {
    output_dir.join(format!("residual_stats_cycle_{}.json", cycle + 1))
}

/// FITS export of the model image for a prefix
pub fn model_fits(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "-model.fits")
}

/// FITS export of the residual image for a prefix
pub fn residual_fits(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "-residual.fits")
}

/// CASA image imported from the model FITS before prediction
pub fn model_casa_image(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "-model.casaim")
}

/// Native image product written by tclean (e.g. `.model`, `.residual`)
pub fn tclean_product(prefix: &Path, product: &str) -> PathBuf {
    with_suffix(prefix, &format!(".{}", product))
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

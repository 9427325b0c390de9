//! Run summary and postmortem artifact listing.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::RunReport;
use crate::error::{Result, SelfcalError};
use crate::naming::SUMMARY_FILE;

/// Write `selfcal_summary.json` into the output directory
pub fn write_summary(output_dir: &Path, report: &RunReport) -> Result<PathBuf> {
    let path = output_dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(report)?;
    fs::write(&path, json)?;
    info!("Wrote run summary to {}", path.display());
    Ok(path)
}

/// Read back a summary written by `write_summary`
pub fn read_summary(output_dir: &Path) -> Result<RunReport> {
    let content = fs::read_to_string(output_dir.join(SUMMARY_FILE))?;
    Ok(serde_json::from_str(&content)?)
}

/// Files found on disk for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleArtifacts {
    /// 1-based cycle number as used in file names
    pub number: usize,
    pub paths: Vec<PathBuf>,
}

/// List everything named `*_cycle_<n>*` in the output directory, grouped
/// by cycle number and sorted by name within each cycle.
pub fn list_artifacts(output_dir: &Path) -> Result<Vec<CycleArtifacts>> {
    if !output_dir.is_dir() {
        return Err(SelfcalError::config(format!(
            "{} is not a directory",
            output_dir.display()
        )));
    }

    let pattern = output_dir.join("*_cycle_*");
    let pattern = pattern
        .to_str()
        .ok_or_else(|| SelfcalError::config(format!("non UTF-8 path {}", output_dir.display())))?;
    let entries = glob::glob(pattern).map_err(|e| SelfcalError::config(format!("bad pattern: {}", e)))?;

    let mut by_cycle: BTreeMap<usize, Vec<PathBuf>> = BTreeMap::new();
    for entry in entries {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if let Some(number) = path.file_name().and_then(|n| n.to_str()).and_then(cycle_number) {
            by_cycle.entry(number).or_default().push(path);
        }
    }

    Ok(by_cycle
        .into_iter()
        .map(|(number, mut paths)| {
            paths.sort();
            CycleArtifacts { number, paths }
        })
        .collect())
}

/// Extract `<n>` from a name containing `_cycle_<n>`
fn cycle_number(name: &str) -> Option<usize> {
    let (_, rest) = name.split_once("_cycle_")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

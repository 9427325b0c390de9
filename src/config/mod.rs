//! Configuration system for selfcal.
//!
//! Three-layer configuration hierarchy:
//! 1. Application config (~/.config/selfcal/selfcal.yml or ./selfcal.yml)
//! 2. Run plan file (dataset, imaging and calibration parameters)
//! 3. Command-line overrides

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use self::overrides::PlanOverrides;
pub use self::resolution::{PlanResolver, ResolvedRun, RunPlan};

mod overrides;
mod resolution;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub casa: CasaConfig,
}

/// Engine settings shared by every run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CasaConfig {
    /// CASA executable; a plan's `casa_path` takes precedence
    pub executable: Option<PathBuf>,
    /// Extra arguments placed after `--nogui`
    pub extra_args: Vec<String>,
    /// Wall-clock limit for one cycle
    pub cycle_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            casa: CasaConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Log filter used when RUST_LOG is not set
    pub fn log_filter(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_filter(), "info");
        assert!(config.casa.executable.is_none());
        assert!(config.casa.extra_args.is_empty());
        assert!(config.casa.cycle_timeout_secs.is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("selfcal.yml");
        fs::write(
            &path,
            "log_level: debug\ncasa:\n  executable: /opt/casa/bin/casa\n  extra_args: [--nologger]\n  cycle_timeout_secs: 7200\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_filter(), "debug");
        assert_eq!(config.casa.executable, Some(PathBuf::from("/opt/casa/bin/casa")));
        assert_eq!(config.casa.extra_args, vec!["--nologger"]);
        assert_eq!(config.casa.cycle_timeout_secs, Some(7200));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("selfcal.yml");
        fs::write(&path, "casa:\n  executable: casa\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.casa.executable, Some(PathBuf::from("casa")));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(Config::load(Some(&tmp.path().join("missing.yml"))).is_err());
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("selfcal.yml");
        fs::write(&path, "casa: [not, a, map]\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}

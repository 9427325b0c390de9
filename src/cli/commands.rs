//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: execute a self-calibration plan
//! - show-plan: print the resolved plan and per-cycle artifact names
//! - artifacts: list the per-cycle artifacts in an output directory

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use selfcal::config::PlanOverrides;

/// Selfcal - iterative self-calibration of radio interferometric data
#[derive(Parser, Debug)]
#[command(name = "selfcal")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to stderr instead of the log file
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run self-calibration from a plan file
    Run {
        /// Run plan (YAML)
        plan: PathBuf,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Show the resolved plan without running the engine
    ShowPlan {
        /// Run plan (YAML)
        plan: PathBuf,

        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// List per-cycle artifacts in an output directory
    Artifacts {
        /// Output directory of a previous run
        output_dir: PathBuf,
    },
}

/// Values that replace those in the plan file
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Visibility dataset
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Output directory for scripts, images and tables
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// CASA executable
    #[arg(long)]
    pub casa: Option<PathBuf>,

    /// Reference antenna
    #[arg(long)]
    pub refant: Option<String>,

    /// Comma-separated solution intervals, coarsest first (e.g. inf,1min,30s)
    #[arg(long)]
    pub solint: Option<String>,

    /// Per-cycle timeout in seconds
    #[arg(long)]
    pub cycle_timeout: Option<u64>,
}

impl From<&OverrideArgs> for PlanOverrides {
    fn from(args: &OverrideArgs) -> Self {
        PlanOverrides {
            dataset: args.dataset.clone(),
            output_dir: args.output_dir.clone(),
            casa: args.casa.clone(),
            reference_antenna: args.refant.clone(),
            solution_intervals: args.solint.clone(),
            cycle_timeout_secs: args.cycle_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["selfcal"]).is_err());
    }

    #[test]
    fn test_cli_verbose_flag() {
        let cli = Cli::try_parse_from(["selfcal", "-v", "artifacts", "out"]).unwrap();
        assert!(cli.is_verbose());
        assert!(!cli.log_stderr);
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["selfcal", "-c", "/path/to/selfcal.yml", "artifacts", "out"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/selfcal.yml")));
    }

    #[test]
    fn test_run_plan_only() {
        let cli = Cli::try_parse_from(["selfcal", "run", "plan.yml"]).unwrap();
        match cli.command {
            Commands::Run { plan, overrides } => {
                assert_eq!(plan, PathBuf::from("plan.yml"));
                assert!(PlanOverrides::from(&overrides).is_empty());
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "selfcal",
            "run",
            "plan.yml",
            "--dataset",
            "/data/obs.ms",
            "-o",
            "/data/out",
            "--casa",
            "/opt/casa/bin/casa",
            "--refant",
            "ea10",
            "--solint",
            "inf,30s",
            "--cycle-timeout",
            "900",
            "--log-stderr",
        ])
        .unwrap();
        assert!(cli.log_stderr);
        match cli.command {
            Commands::Run { overrides, .. } => {
                let o = PlanOverrides::from(&overrides);
                assert_eq!(o.dataset, Some(PathBuf::from("/data/obs.ms")));
                assert_eq!(o.output_dir, Some(PathBuf::from("/data/out")));
                assert_eq!(o.casa, Some(PathBuf::from("/opt/casa/bin/casa")));
                assert_eq!(o.reference_antenna.as_deref(), Some("ea10"));
                assert_eq!(o.solution_intervals.as_deref(), Some("inf,30s"));
                assert_eq!(o.cycle_timeout_secs, Some(900));
            }
            _ => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_run_rejects_bad_timeout() {
        assert!(Cli::try_parse_from(["selfcal", "run", "plan.yml", "--cycle-timeout", "soon"]).is_err());
    }

    #[test]
    fn test_show_plan() {
        let cli = Cli::try_parse_from(["selfcal", "show-plan", "plan.yml", "--solint", "inf"]).unwrap();
        match cli.command {
            Commands::ShowPlan { plan, overrides } => {
                assert_eq!(plan, PathBuf::from("plan.yml"));
                assert_eq!(overrides.solint.as_deref(), Some("inf"));
            }
            _ => panic!("Expected show-plan command"),
        }
    }

    #[test]
    fn test_artifacts() {
        let cli = Cli::try_parse_from(["selfcal", "artifacts", "/data/out"]).unwrap();
        match cli.command {
            Commands::Artifacts { output_dir } => assert_eq!(output_dir, PathBuf::from("/data/out")),
            _ => panic!("Expected artifacts command"),
        }
    }

    #[test]
    fn test_cli_debug_assert() {
        Cli::command().debug_assert();
    }
}

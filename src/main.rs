use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::{Commands, OverrideArgs};
use selfcal::casa::{CasaCalibrator, CasaImager, CasaImstat, CasaProcess, CasaProcessConfig};
use selfcal::config::{Config, PlanOverrides, PlanResolver, ResolvedRun, RunPlan};
use selfcal::domain::{ConvergenceParams, RunReport, RunState};
use selfcal::engine::Evaluator;
use selfcal::evaluation::{LogOnlyEvaluator, ResidualRmsEvaluator};
use selfcal::report;
use selfcal::runner::SelfcalRunner;

fn setup_logging(to_stderr: bool, default_filter: &str) -> Result<()> {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let mut builder = env_logger::Builder::from_env(env);

    if to_stderr {
        builder.target(env_logger::Target::Stderr).init();
        return Ok(());
    }

    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("selfcal")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("selfcal.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn resolve(plan: &Path, overrides: &OverrideArgs, config: &Config) -> Result<ResolvedRun> {
    let run_plan = RunPlan::load(plan)?;
    let overrides = PlanOverrides::from(overrides);
    if !overrides.is_empty() {
        info!("Applying command-line overrides: {:?}", overrides);
    }
    let resolved = PlanResolver::new(config.clone())
        .resolve(run_plan, &overrides)
        .context(format!("Failed to resolve plan {}", plan.display()))?;
    Ok(resolved)
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run { plan, overrides } => handle_run_command(plan, overrides, config).await,
        Commands::ShowPlan { plan, overrides } => handle_show_plan_command(plan, overrides, config),
        Commands::Artifacts { output_dir } => handle_artifacts_command(output_dir),
    }
}

async fn handle_run_command(plan: &Path, overrides: &OverrideArgs, config: &Config) -> Result<()> {
    let resolved = resolve(plan, overrides, config)?;
    info!("Running plan {} with {}", plan.display(), resolved.executable.display());

    let mut casa = CasaProcessConfig::new(&resolved.executable);
    for arg in &resolved.extra_args {
        casa = casa.arg(arg);
    }
    let process = Arc::new(CasaProcess::new(casa));

    let imager = Arc::new(CasaImager::new(process.clone()));
    let calibrator = Arc::new(CasaCalibrator::new(process.clone()));
    let evaluator: Arc<dyn Evaluator> = match resolved.params.convergence {
        ConvergenceParams::LogOnly => Arc::new(LogOnlyEvaluator),
        ConvergenceParams::ResidualRms { min_improvement } => Arc::new(ResidualRmsEvaluator::new(
            Arc::new(CasaImstat::new(process.clone())),
            min_improvement,
        )),
    };

    let output_dir = resolved.params.output_dir.clone();
    let mut runner = SelfcalRunner::with_config(
        resolved.params.clone(),
        resolved.intervals.clone(),
        imager,
        calibrator,
        evaluator,
        resolved.runner_config(),
    );

    println!(
        "{} {} ({} solution intervals)",
        "Self-calibrating:".green(),
        resolved.params.dataset.display(),
        resolved.intervals.len()
    );

    let result = runner.run().await;
    let summary = runner.report();

    // Nothing to summarise if the output directory was never prepared
    if summary.state != RunState::NotStarted {
        if let Err(e) = report::write_summary(&output_dir, &summary) {
            warn!("Failed to write run summary: {}", e);
        }
    }
    print_report(&summary);

    match result {
        Ok(_) => Ok(()),
        Err(e) => {
            println!("{} {}", "Failed:".red(), e);
            Err(e).context("Self-calibration failed")
        }
    }
}

fn print_report(report: &RunReport) {
    for cycle in &report.cycles {
        let status = if cycle.is_finished() {
            "done".green()
        } else {
            "failed".red()
        };
        let table = cycle
            .gain_table
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let detail = match &cycle.improvement {
            Some(m) => match m.fractional_improvement() {
                Some(frac) => format!("{} (rms {:+.1}%)", m.detail, -frac * 100.0),
                None => m.detail.clone(),
            },
            None => String::new(),
        };
        println!(
            "  cycle {:>2}  solint={:<6} {:<6} {} {}",
            cycle.cycle + 1,
            cycle.solution_interval,
            status,
            table,
            detail.as_str().dimmed()
        );
    }

    if report.state.is_success() {
        println!("{} {}", "Completed:".green(), report.state);
    } else if matches!(report.state, RunState::Failed { .. }) {
        println!("{} {}", "Stopped:".red(), report.state);
    }
}

fn handle_show_plan_command(plan: &Path, overrides: &OverrideArgs, config: &Config) -> Result<()> {
    let resolved = resolve(plan, overrides, config)?;
    let params = &resolved.params;

    println!("{} {}", "Plan:".green(), plan.display());
    println!("  dataset:           {}", params.dataset.display());
    println!("  output directory:  {}", params.output_dir.display());
    println!("  casa:              {}", resolved.executable.display());
    println!("  reference antenna: {}", params.reference_antenna);
    println!(
        "  calibration:       gaintype={} calmode={} apply={:?}",
        params.calibration.gaintype, params.calibration.calmode, params.calibration.apply_policy
    );
    println!("  convergence:       {:?}", params.convergence);
    if let Some(t) = resolved.cycle_timeout {
        println!("  cycle timeout:     {}s", t.as_secs());
    }

    for cycle in resolved.cycles() {
        println!(
            "{} {} solint={}",
            "Cycle".cyan(),
            cycle.number(),
            cycle.solution_interval
        );
        println!("    image:  {}", cycle.image_prefix.display());
        println!("    table:  {}", cycle.gain_table.display());
    }
    Ok(())
}

fn handle_artifacts_command(output_dir: &Path) -> Result<()> {
    let cycles = report::list_artifacts(output_dir)
        .context(format!("Failed to list artifacts in {}", output_dir.display()))?;

    if cycles.is_empty() {
        println!("{}", "No cycle artifacts found".yellow());
    }
    for cycle in cycles {
        println!("{} {}", "Cycle".cyan(), cycle.number);
        for path in cycle.paths {
            println!("    {}", path.display());
        }
    }

    match report::read_summary(output_dir) {
        Ok(summary) => println!("{} {}", "Last run:".green(), summary.state),
        Err(e) => info!("No readable run summary in {}: {}", output_dir.display(), e),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(cli.log_stderr, config.log_filter()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}

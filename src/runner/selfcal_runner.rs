//! Self-calibration runner - the convergence-driven refinement loop.
//!
//! The SelfcalRunner executes one run: for each solution interval it images,
//! calibrates, and compares against the previous cycle, stopping early when a
//! cycle fails to improve. A run never exceeds one cycle per interval.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{error, info};
use tokio::time::Instant;

use crate::domain::{
    CorrectionTable, CycleContext, CycleParameters, CycleRecord, CycleState, Phase, RunReport, RunState,
    SolutionIntervals,
};
use crate::engine::{Calibrator, Evaluator, Imager};
use crate::error::{Result, SelfcalError};

/// Configuration for the SelfcalRunner.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Deadline shared by all steps of one cycle; expiry fails the run
    pub cycle_timeout: Option<Duration>,
}

/// SelfcalRunner drives one self-calibration run.
///
/// Each cycle:
/// 1. Derives the cycle's artifact names
/// 2. Images the dataset (seeded with the previous image if configured)
/// 3. Solves and applies gains for the cycle's solution interval
/// 4. From the second cycle on, compares residuals with the previous cycle
///    and stops as converged when there is no improvement
/// 5. Advances the carried cycle state
pub struct SelfcalRunner<I, C, E>
where
    I: Imager + ?Sized,
    C: Calibrator + ?Sized,
    E: Evaluator + ?Sized,
{
    params: CycleParameters,
    intervals: SolutionIntervals,
    imager: Arc<I>,
    calibrator: Arc<C>,
    evaluator: Arc<E>,
    config: RunnerConfig,

    state: RunState,
    cycle_state: CycleState,
    records: Vec<CycleRecord>,
    tables: Vec<CorrectionTable>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl<I, C, E> SelfcalRunner<I, C, E>
where
    I: Imager + ?Sized,
    C: Calibrator + ?Sized,
    E: Evaluator + ?Sized,
{
    /// Create a new SelfcalRunner with the given parameters and engine steps.
    pub fn new(
        params: CycleParameters,
        intervals: SolutionIntervals,
        imager: Arc<I>,
        calibrator: Arc<C>,
        evaluator: Arc<E>,
    ) -> Self {
        Self::with_config(params, intervals, imager, calibrator, evaluator, RunnerConfig::default())
    }

    /// Create a new SelfcalRunner with custom configuration.
    pub fn with_config(
        params: CycleParameters,
        intervals: SolutionIntervals,
        imager: Arc<I>,
        calibrator: Arc<C>,
        evaluator: Arc<E>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            params,
            intervals,
            imager,
            calibrator,
            evaluator,
            config,
            state: RunState::NotStarted,
            cycle_state: CycleState::new(),
            records: Vec::new(),
            tables: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Snapshot of the run so far
    pub fn report(&self) -> RunReport {
        RunReport {
            state: self.state,
            cycles: self.records.clone(),
            correction_tables: self.tables.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    /// Run until convergence, exhaustion of the solution intervals, or failure.
    ///
    /// Parameters are checked (and the output directory created) once, before
    /// the first cycle. Any engine failure aborts the remaining cycles.
    pub async fn run(&mut self) -> Result<RunReport> {
        if self.state != RunState::NotStarted {
            return Err(SelfcalError::config(format!("run already {}", self.state)));
        }
        if let Err(e) = self.params.prepare() {
            error!("Cannot start self-calibration: {}", e);
            return Err(e);
        }
        self.started_at = Some(Utc::now());

        info!(
            "Starting self-calibration of {} with {} solution intervals ({}, {})",
            self.params.dataset.display(),
            self.intervals.len(),
            self.imager.description(),
            self.evaluator.description()
        );

        let total = self.intervals.len();
        for index in 0..total {
            let solint = match self.intervals.get(index) {
                Some(s) => s.to_string(),
                None => break,
            };
            let cycle = CycleContext::new(&self.params.output_dir, index, &solint);
            debug_assert_eq!(cycle.index, self.cycle_state.index);

            self.transition(RunState::Running { cycle: index });
            info!(
                "Starting self-calibration cycle {}/{} with solint={}",
                cycle.number(),
                total,
                solint
            );
            self.records
                .push(CycleRecord::start(index, &solint, cycle.image_prefix.clone()));

            let deadline = self.config.cycle_timeout.map(|t| (Instant::now() + t, t));

            // Image
            let prior = self.cycle_state.previous_image().cloned();
            let imaged = guarded(deadline, self.imager.image(&self.params, &cycle, prior.as_ref())).await;
            let image = match imaged {
                Ok(image) => image,
                Err(reason) => return Err(self.fail(&cycle, Phase::Image, reason)),
            };

            // Calibrate and apply
            let calibrated = guarded(
                deadline,
                self.calibrator
                    .calibrate(&self.params, &cycle, &image, self.cycle_state.prior_tables()),
            )
            .await;
            let table = match calibrated {
                Ok(table) => table,
                Err(reason) => return Err(self.fail(&cycle, Phase::Calibrate, reason)),
            };
            self.tables.push(table.clone());
            if let Some(record) = self.records.last_mut() {
                record.gain_table = Some(table.path.clone());
            }

            // Compare with the previous cycle
            let mut converged = false;
            if let Some(previous) = prior {
                let evaluated = guarded(deadline, self.evaluator.evaluate(&self.params, &previous, &image)).await;
                let metric = match evaluated {
                    Ok(metric) => metric,
                    Err(reason) => return Err(self.fail(&cycle, Phase::Evaluate, reason)),
                };
                converged = !metric.improved;
                if let Some(record) = self.records.last_mut() {
                    record.improvement = Some(metric);
                }
            }

            // Prepare for next cycle
            self.cycle_state
                .advance(image, table, self.params.calibration.apply_policy);
            if let Some(record) = self.records.last_mut() {
                record.finish();
            }
            info!("Finished self-calibration cycle {}/{}", cycle.number(), total);

            if converged {
                info!(
                    "No significant improvement in cycle {}, stopping after {} cycles",
                    cycle.number(),
                    cycle.number()
                );
                self.transition(RunState::Converged { cycles: cycle.number() });
                return Ok(self.finish());
            }
        }

        self.transition(RunState::Exhausted { cycles: self.cycle_state.index });
        info!("Self-calibration completed successfully!");
        Ok(self.finish())
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(!self.state.is_terminal(), "transition out of terminal state {:?}", self.state);
        self.state = next;
    }

    fn finish(&mut self) -> RunReport {
        self.finished_at = Some(Utc::now());
        self.report()
    }

    /// Move to the failed state and build the error surfaced to the caller
    fn fail(&mut self, cycle: &CycleContext, phase: Phase, reason: String) -> SelfcalError {
        error!(
            "Self-calibration cycle {} failed during {} (solint={}): {}",
            cycle.number(),
            phase,
            cycle.solution_interval,
            reason
        );
        self.transition(RunState::Failed {
            cycle: cycle.index,
            phase,
        });
        self.finished_at = Some(Utc::now());
        SelfcalError::CycleExecution {
            cycle: cycle.index,
            phase,
            reason,
        }
    }
}

/// Await an engine step, bounded by the cycle deadline if there is one
async fn guarded<T, F>(deadline: Option<(Instant, Duration)>, step: F) -> std::result::Result<T, String>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some((at, limit)) => match tokio::time::timeout_at(at, step).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("cycle timed out after {:?}", limit)),
        },
        None => step.await.map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params::tests::params;
    use crate::domain::{ApplyPolicy, ImageArtifact, ImprovementMetric, RunOutcome};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Mock imager that records the prior image it was given.
    #[derive(Default)]
    struct MockImager {
        calls: AtomicUsize,
        fail_at: Option<usize>,
        delay: Option<Duration>,
        priors: Mutex<Vec<Option<usize>>>,
    }

    #[async_trait]
    impl Imager for MockImager {
        async fn image(
            &self,
            _params: &CycleParameters,
            cycle: &CycleContext,
            prior: Option<&ImageArtifact>,
        ) -> Result<ImageArtifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.priors.lock().unwrap().push(prior.map(|p| p.cycle));
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            if self.fail_at == Some(cycle.index) {
                return Err(SelfcalError::Engine("tclean exited with status 1".into()));
            }
            Ok(ImageArtifact::from_prefix(cycle.index, &cycle.image_prefix))
        }
    }

    /// Mock calibrator that records how many prior tables it was asked to apply.
    #[derive(Default)]
    struct MockCalibrator {
        calls: AtomicUsize,
        fail_at: Option<usize>,
        prior_counts: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Calibrator for MockCalibrator {
        async fn calibrate(
            &self,
            _params: &CycleParameters,
            cycle: &CycleContext,
            _image: &ImageArtifact,
            prior_tables: &[CorrectionTable],
        ) -> Result<CorrectionTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prior_counts.lock().unwrap().push(prior_tables.len());
            if self.fail_at == Some(cycle.index) {
                return Err(SelfcalError::Engine("gaincal exited with status 1".into()));
            }
            Ok(CorrectionTable::for_cycle(cycle))
        }
    }

    /// Evaluator that improves until `stall_from` cycles have been compared.
    struct CountingEvaluator {
        calls: AtomicUsize,
        stall_after: usize,
        error: bool,
    }

    impl CountingEvaluator {
        fn always_improved() -> Self {
            Self::stall_after(usize::MAX)
        }

        fn never_improved() -> Self {
            Self::stall_after(0)
        }

        fn stall_after(n: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                stall_after: n,
                error: false,
            }
        }
    }

    #[async_trait]
    impl Evaluator for CountingEvaluator {
        async fn evaluate(
            &self,
            _params: &CycleParameters,
            _previous: &ImageArtifact,
            _current: &ImageArtifact,
        ) -> Result<ImprovementMetric> {
            let count = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.error {
                return Err(SelfcalError::Engine("imstat failed".into()));
            }
            if count >= self.stall_after {
                Ok(ImprovementMetric::stalled("flat"))
            } else {
                Ok(ImprovementMetric::improved("better"))
            }
        }
    }

    struct Fixture {
        _tmp: TempDir,
        params: CycleParameters,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let dataset = tmp.path().join("obs.ms");
        std::fs::create_dir(&dataset).unwrap();
        let params = params(&dataset, &tmp.path().join("out"));
        Fixture { _tmp: tmp, params }
    }

    fn intervals(n: usize) -> SolutionIntervals {
        let all = ["inf", "1min", "30s", "10s", "int", "5s", "2s", "1s"];
        SolutionIntervals::new(all.iter().cycle().take(n).map(|s| s.to_string()).collect()).unwrap()
    }

    fn runner(
        params: CycleParameters,
        n: usize,
        imager: &Arc<MockImager>,
        calibrator: &Arc<MockCalibrator>,
        evaluator: &Arc<CountingEvaluator>,
    ) -> SelfcalRunner<MockImager, MockCalibrator, CountingEvaluator> {
        SelfcalRunner::new(
            params,
            intervals(n),
            imager.clone(),
            calibrator.clone(),
            evaluator.clone(),
        )
    }

    #[test]
    fn test_runner_config_default() {
        let config = RunnerConfig::default();
        assert!(config.cycle_timeout.is_none());
    }

    #[tokio::test]
    async fn test_never_improved_stops_after_two_cycles() {
        for n in 2..=6 {
            let f = fixture();
            let imager = Arc::new(MockImager::default());
            let calibrator = Arc::new(MockCalibrator::default());
            let evaluator = Arc::new(CountingEvaluator::never_improved());

            let mut r = runner(f.params.clone(), n, &imager, &calibrator, &evaluator);
            let report = r.run().await.unwrap();

            assert_eq!(report.state, RunState::Converged { cycles: 2 });
            assert_eq!(report.outcome(), Some(RunOutcome::Converged));
            assert_eq!(imager.calls.load(Ordering::SeqCst), 2);
            assert_eq!(calibrator.calls.load(Ordering::SeqCst), 2);
            assert_eq!(evaluator.calls.load(Ordering::SeqCst), 1);
            assert_eq!(report.completed_cycles(), 2);
        }
    }

    #[tokio::test]
    async fn test_always_improved_runs_every_interval() {
        for n in 1..=6 {
            let f = fixture();
            let imager = Arc::new(MockImager::default());
            let calibrator = Arc::new(MockCalibrator::default());
            let evaluator = Arc::new(CountingEvaluator::always_improved());

            let mut r = runner(f.params.clone(), n, &imager, &calibrator, &evaluator);
            let report = r.run().await.unwrap();

            assert_eq!(report.state, RunState::Exhausted { cycles: n });
            assert_eq!(imager.calls.load(Ordering::SeqCst), n);
            assert_eq!(calibrator.calls.load(Ordering::SeqCst), n);
            assert_eq!(evaluator.calls.load(Ordering::SeqCst), n - 1);
        }
    }

    #[tokio::test]
    async fn test_single_interval_never_evaluates() {
        let f = fixture();
        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator::never_improved());

        let mut r = runner(f.params.clone(), 1, &imager, &calibrator, &evaluator);
        let report = r.run().await.unwrap();

        assert_eq!(report.state, RunState::Exhausted { cycles: 1 });
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), 0);
        assert!(report.cycles[0].improvement.is_none());
    }

    #[tokio::test]
    async fn test_stops_at_first_stall() {
        let f = fixture();
        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator::stall_after(2));

        let mut r = runner(f.params.clone(), 5, &imager, &calibrator, &evaluator);
        let report = r.run().await.unwrap();

        // comparisons at cycles 2 and 3 improve, cycle 4 stalls
        assert_eq!(report.state, RunState::Converged { cycles: 4 });
        assert_eq!(imager.calls.load(Ordering::SeqCst), 4);
        assert!(!report.cycles[3].improvement.as_ref().unwrap().improved);
    }

    #[tokio::test]
    async fn test_five_intervals_example() {
        let f = fixture();
        let out = f.params.output_dir.clone();
        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator::always_improved());

        let mut r = runner(f.params.clone(), 5, &imager, &calibrator, &evaluator);
        let report = r.run().await.unwrap();

        assert_eq!(report.state, RunState::Exhausted { cycles: 5 });
        let tables: Vec<PathBuf> = report.correction_tables.iter().map(|t| t.path.clone()).collect();
        let expected: Vec<PathBuf> = (1..=5).map(|i| out.join(format!("gains_cycle_{}.cal", i))).collect();
        assert_eq!(tables, expected);

        let solints: Vec<&str> = report.cycles.iter().map(|c| c.solution_interval.as_str()).collect();
        assert_eq!(solints, vec!["inf", "1min", "30s", "10s", "int"]);
        assert!(report.started_at.is_some());
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_imager_gets_previous_image() {
        let f = fixture();
        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator::always_improved());

        let mut r = runner(f.params.clone(), 3, &imager, &calibrator, &evaluator);
        r.run().await.unwrap();

        assert_eq!(*imager.priors.lock().unwrap(), vec![None, Some(0), Some(1)]);
    }

    #[tokio::test]
    async fn test_image_failure_aborts_run() {
        for k in 0..4 {
            let f = fixture();
            let imager = Arc::new(MockImager {
                fail_at: Some(k),
                ..Default::default()
            });
            let calibrator = Arc::new(MockCalibrator::default());
            let evaluator = Arc::new(CountingEvaluator::always_improved());

            let mut r = runner(f.params.clone(), 5, &imager, &calibrator, &evaluator);
            let err = r.run().await.unwrap_err();

            match err {
                SelfcalError::CycleExecution { cycle, phase, .. } => {
                    assert_eq!(cycle, k);
                    assert_eq!(phase, Phase::Image);
                }
                other => panic!("Expected cycle execution error, got {:?}", other),
            }
            assert_eq!(r.state(), RunState::Failed { cycle: k, phase: Phase::Image });
            assert_eq!(imager.calls.load(Ordering::SeqCst), k + 1);
            assert_eq!(calibrator.calls.load(Ordering::SeqCst), k);
            assert_eq!(r.report().correction_tables.len(), k);
        }
    }

    #[tokio::test]
    async fn test_calibrate_failure_aborts_run() {
        let k = 2;
        let f = fixture();
        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator {
            fail_at: Some(k),
            ..Default::default()
        });
        let evaluator = Arc::new(CountingEvaluator::always_improved());

        let mut r = runner(f.params.clone(), 5, &imager, &calibrator, &evaluator);
        let err = r.run().await.unwrap_err();

        assert!(err.to_string().starts_with("Cycle 3 failed during calibrate"));
        assert_eq!(r.state(), RunState::Failed { cycle: k, phase: Phase::Calibrate });
        // no imaging for cycle k+1
        assert_eq!(imager.calls.load(Ordering::SeqCst), k + 1);
        assert_eq!(evaluator.calls.load(Ordering::SeqCst), k - 1);

        let report = r.report();
        assert_eq!(report.completed_cycles(), k);
        assert!(report.cycles[k].gain_table.is_none());
    }

    #[tokio::test]
    async fn test_evaluate_failure_aborts_run() {
        let f = fixture();
        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator {
            calls: AtomicUsize::new(0),
            stall_after: usize::MAX,
            error: true,
        });

        let mut r = runner(f.params.clone(), 5, &imager, &calibrator, &evaluator);
        assert!(r.run().await.is_err());
        assert_eq!(r.state(), RunState::Failed { cycle: 1, phase: Phase::Evaluate });
        assert_eq!(imager.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_configuration_error_runs_nothing() {
        let f = fixture();
        let blocker = f.params.dataset.parent().unwrap().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let mut p = f.params.clone();
        p.output_dir = blocker.join("out");

        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator::always_improved());

        let mut r = runner(p, 5, &imager, &calibrator, &evaluator);
        let err = r.run().await.unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(r.state(), RunState::NotStarted);
        assert!(r.report().started_at.is_none());
        assert_eq!(imager.calls.load(Ordering::SeqCst), 0);
        assert_eq!(calibrator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_dataset_runs_nothing() {
        let f = fixture();
        let mut p = f.params.clone();
        p.dataset = p.dataset.with_file_name("missing.ms");

        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator::always_improved());

        let mut r = runner(p, 3, &imager, &calibrator, &evaluator);
        assert!(r.run().await.unwrap_err().is_configuration());
        assert_eq!(imager.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_current_only_policy_applies_no_prior_tables() {
        let f = fixture();
        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator::always_improved());

        let mut r = runner(f.params.clone(), 4, &imager, &calibrator, &evaluator);
        r.run().await.unwrap();

        assert_eq!(*calibrator.prior_counts.lock().unwrap(), vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_accumulate_policy_applies_all_prior_tables() {
        let f = fixture();
        let mut p = f.params.clone();
        p.calibration.apply_policy = ApplyPolicy::Accumulate;
        p.calibration.calmode = "ap".to_string();

        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator::always_improved());

        let mut r = runner(p, 4, &imager, &calibrator, &evaluator);
        r.run().await.unwrap();

        assert_eq!(*calibrator.prior_counts.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cycle_timeout_fails_run() {
        let f = fixture();
        let imager = Arc::new(MockImager {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator::always_improved());

        let mut r = SelfcalRunner::with_config(
            f.params.clone(),
            intervals(3),
            imager.clone(),
            calibrator.clone(),
            evaluator,
            RunnerConfig {
                cycle_timeout: Some(Duration::from_millis(20)),
            },
        );
        let err = r.run().await.unwrap_err();

        assert!(err.to_string().contains("timed out"));
        assert_eq!(r.state(), RunState::Failed { cycle: 0, phase: Phase::Image });
        assert_eq!(calibrator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_twice_is_rejected() {
        let f = fixture();
        let imager = Arc::new(MockImager::default());
        let calibrator = Arc::new(MockCalibrator::default());
        let evaluator = Arc::new(CountingEvaluator::always_improved());

        let mut r = runner(f.params.clone(), 2, &imager, &calibrator, &evaluator);
        r.run().await.unwrap();
        assert!(r.run().await.is_err());
        assert_eq!(imager.calls.load(Ordering::SeqCst), 2);
        assert_eq!(r.state(), RunState::Exhausted { cycles: 2 });
    }

    #[tokio::test]
    async fn test_dyn_engine_steps() {
        let f = fixture();
        let imager: Arc<dyn Imager> = Arc::new(MockImager::default());
        let calibrator: Arc<dyn Calibrator> = Arc::new(MockCalibrator::default());
        let evaluator: Arc<dyn Evaluator> = Arc::new(CountingEvaluator::always_improved());

        let mut r = SelfcalRunner::new(f.params.clone(), intervals(2), imager, calibrator, evaluator);
        assert_eq!(r.run().await.unwrap().outcome(), Some(RunOutcome::Exhausted));
    }
}

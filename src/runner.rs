//! Suite runner.
//!
//! Runs every selected case of a suite concurrently, each in its own state
//! namespace, and collects a [`SuiteReport`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::assertions::{BucketProbe, OutputAsserter, check_planned_outputs};
use crate::config::{CaseConfig, CaseKind, ConfigValidator, ModuleOptions, OptionsFactory, SuiteConfig};
use crate::engine::{ProvisioningEngine, RetryPolicy};
use crate::error::{ConvergeError, EngineError, Result, VerifyError};
use crate::harness::{DeploymentScope, timeout_millis};
use crate::plan::PlanResult;
use crate::state::{CaseReport, CaseStatus, SuiteReport};
use crate::verifier::ConvergenceVerifier;

/// Per-run options, usually taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip cases that create real resources.
    pub short: bool,
    /// Only run cases whose name contains this substring.
    pub filter: Option<String>,
    /// Overrides the suite's parallelism.
    pub parallelism: Option<usize>,
    /// Keep case namespaces after the run.
    pub keep_work_dir: bool,
}

/// Everything a case task needs, shared between tasks.
struct CaseContext {
    engine: Arc<dyn ProvisioningEngine>,
    probe: Arc<dyn BucketProbe>,
    retry: RetryPolicy,
    factory: OptionsFactory,
    keep_work_dir: bool,
}

/// Runs the cases of one suite.
pub struct SuiteRunner {
    config: SuiteConfig,
    engine: Arc<dyn ProvisioningEngine>,
    probe: Arc<dyn BucketProbe>,
    retry: RetryPolicy,
    run_options: RunOptions,
}

impl std::fmt::Debug for SuiteRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteRunner")
            .field("suite", &self.config.suite.name)
            .field("engine", &self.engine.name())
            .field("run_options", &self.run_options)
            .finish_non_exhaustive()
    }
}

impl SuiteRunner {
    /// Creates a runner; the retry policy comes from the suite settings.
    #[must_use]
    pub fn new(
        config: SuiteConfig,
        engine: Arc<dyn ProvisioningEngine>,
        probe: Arc<dyn BucketProbe>,
    ) -> Self {
        let retry = RetryPolicy::from_settings(&config.retry);
        Self {
            config,
            engine,
            probe,
            retry,
            run_options: RunOptions::default(),
        }
    }

    /// Sets per-run options.
    #[must_use]
    pub fn with_run_options(mut self, run_options: RunOptions) -> Self {
        self.run_options = run_options;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cases selected by the filter, in suite order.
    #[must_use]
    pub fn selected_cases(&self) -> Vec<&CaseConfig> {
        self.config
            .cases
            .iter()
            .filter(|c| {
                self.run_options
                    .filter
                    .as_deref()
                    .is_none_or(|f| c.name.contains(f))
            })
            .collect()
    }

    /// Runs the selected cases and returns the suite report.
    ///
    /// Case failures are recorded in the report; they do not fail the run.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the suite is malformed. No engine
    /// command runs in that case.
    pub async fn run(&self) -> Result<SuiteReport> {
        ConfigValidator::without_path_checks().validate(&self.config)?;

        let parallelism = self
            .run_options
            .parallelism
            .unwrap_or(self.config.parallelism)
            .max(1);
        let cases: Vec<CaseConfig> = self.selected_cases().into_iter().cloned().collect();

        info!(
            "Running suite {} ({} case(s), parallelism {parallelism})",
            self.config.suite.name,
            cases.len()
        );

        let context = Arc::new(CaseContext {
            engine: Arc::clone(&self.engine),
            probe: Arc::clone(&self.probe),
            retry: self.retry.clone(),
            factory: OptionsFactory::new(&self.config.suite.name, &self.config.engine),
            keep_work_dir: self.run_options.keep_work_dir || self.config.engine.keep_work_dir,
        });

        let mut report = SuiteReport::new(&self.config.suite.name);
        let mut slots: Vec<Option<CaseReport>> = vec![None; cases.len()];
        let semaphore = Arc::new(Semaphore::new(parallelism));
        let mut tasks = JoinSet::new();

        for (index, case) in cases.iter().enumerate() {
            if self.run_options.short && case.is_mutating() {
                info!("Skipping {} in short mode", case.name);
                slots[index] = Some(skipped(case, "skipped in short mode"));
                continue;
            }

            let context = Arc::clone(&context);
            let semaphore = Arc::clone(&semaphore);
            let case = case.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (index, run_case(&context, &case).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, case_report)) => slots[index] = Some(case_report),
                Err(e) => error!("Case task failed: {e}"),
            }
        }

        for (case, slot) in cases.iter().zip(slots) {
            report.cases.push(slot.unwrap_or_else(|| {
                let mut lost = skipped(case, "case task aborted");
                lost.status = CaseStatus::Failed;
                lost
            }));
        }

        report.finish();
        info!("{report}");
        Ok(report)
    }
}

/// Runs one case to completion and describes the outcome.
async fn run_case(context: &CaseContext, case: &CaseConfig) -> CaseReport {
    let started = Instant::now();
    info!("Running case {} ({})", case.name, case.kind);

    let mut report = blank_report(case);

    let options = match context.factory.for_case(case) {
        Ok(options) => options,
        Err(e) => {
            report.status = CaseStatus::Failed;
            report.error = Some(e.to_string());
            return report;
        }
    };
    report.namespace = Some(options.namespace().id().to_string());

    match execute(context, case, &options).await {
        Ok(plan) => {
            info!("Case {} passed", case.name);
            report.status = CaseStatus::Passed;
            report.plan_summary = plan.map(|p| p.summary());
        }
        Err(e) => {
            error!("Case {} failed: {e}", case.name);
            report.status = CaseStatus::Failed;
            if let ConvergeError::Verify(VerifyError::NonConvergent {
                to_add,
                to_change,
                to_destroy,
                ..
            }) = &e
            {
                let plan = PlanResult {
                    to_add: to_add.clone(),
                    to_change: to_change.clone(),
                    to_destroy: to_destroy.clone(),
                    ..PlanResult::default()
                };
                report.plan_summary = Some(plan.summary());
                report.pending = Some(plan.pending());
            }
            report.error = Some(e.to_string());
        }
    }

    if !context.keep_work_dir {
        if let Err(e) = options.namespace().remove().await {
            warn!("Failed to remove namespace {}: {e}", options.namespace().id());
        }
    }

    report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    report
}

/// Executes the case body for its kind.
async fn execute(
    context: &CaseContext,
    case: &CaseConfig,
    options: &ModuleOptions,
) -> Result<Option<PlanResult>> {
    let engine = context.engine.as_ref();
    let retry = &context.retry;
    let timeout = case.timeout_secs.map(Duration::from_secs);

    match case.kind {
        CaseKind::Validate => {
            bounded(timeout, &case.name, async {
                retry.run("init", || engine.init(options)).await?;
                engine.validate(options).await?;
                Ok(None)
            })
            .await
        }
        CaseKind::Format => {
            bounded(timeout, &case.name, async {
                engine.format_check(options).await?;
                Ok(None)
            })
            .await
        }
        CaseKind::Plan => {
            bounded(timeout, &case.name, async {
                retry.run("init", || engine.init(options)).await?;
                let plan = retry.run("plan", || engine.plan(options)).await?;
                check_planned_outputs(&plan, &case.required_outputs)?;
                Ok(Some(plan))
            })
            .await
        }
        CaseKind::Converge => {
            let verifier = ConvergenceVerifier::new(Arc::clone(&context.engine), retry.clone());
            let asserter = OutputAsserter::new(engine, context.probe.as_ref());
            let (verifier, asserter) = (&verifier, &asserter);
            let checks = &case.outputs;

            let plan = DeploymentScope::new(Arc::clone(&context.engine), retry.clone(), options.clone())
                .with_timeout(timeout)
                .run(move || async move {
                    if !checks.is_empty() {
                        asserter.check(options, checks).await?;
                    }
                    verifier.ensure_converged(options).await
                })
                .await?;
            Ok(Some(plan))
        }
        CaseKind::Diverge => {
            let verifier = ConvergenceVerifier::new(Arc::clone(&context.engine), retry.clone());
            let asserter = OutputAsserter::new(engine, context.probe.as_ref());
            let (verifier, asserter) = (&verifier, &asserter);
            let checks = &case.outputs;
            let overrides = &case.overrides;

            let plan = DeploymentScope::new(Arc::clone(&context.engine), retry.clone(), options.clone())
                .with_timeout(timeout)
                .run(move || async move {
                    if !checks.is_empty() {
                        asserter.check(options, checks).await?;
                    }
                    verifier.verify_divergence(options, overrides).await
                })
                .await?;
            Ok(Some(plan))
        }
    }
}

/// Bounds a non-deploying case by its timeout.
async fn bounded<T>(
    timeout: Option<Duration>,
    case: &str,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, work).await.unwrap_or_else(|_| {
            Err(ConvergeError::Engine(EngineError::Timeout {
                operation: format!("case {case}"),
                millis: timeout_millis(limit),
            }))
        }),
        None => work.await,
    }
}

fn blank_report(case: &CaseConfig) -> CaseReport {
    CaseReport {
        name: case.name.clone(),
        kind: case.kind,
        module: case.module.clone(),
        status: CaseStatus::Skipped,
        namespace: None,
        duration_ms: 0,
        plan_summary: None,
        pending: None,
        error: None,
    }
}

/// A report for a case that did not run.
fn skipped(case: &CaseConfig, reason: &str) -> CaseReport {
    CaseReport {
        error: Some(reason.to_string()),
        ..blank_report(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::MockBucketProbe;
    use crate::config::{ConfigParser, VarMap};
    use crate::engine::MockProvisioningEngine;
    use tempfile::TempDir;

    fn suite(work_dir: &std::path::Path) -> SuiteConfig {
        let yaml = format!(
            r#"
suite:
  name: infra
engine:
  work_dir: "{}"
parallelism: 2
cases:
  - name: network-validate
    kind: validate
    module: modules/network
  - name: network-converge
    kind: converge
    module: modules/network
    vars:
      vpc_cidr: "10.99.0.0/16"
"#,
            work_dir.display()
        );
        ConfigParser::new().parse_yaml(&yaml, None).unwrap()
    }

    fn runner(config: SuiteConfig, engine: MockProvisioningEngine) -> SuiteRunner {
        SuiteRunner::new(config, Arc::new(engine), Arc::new(MockBucketProbe::new()))
            .with_retry_policy(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_short_mode_skips_mutating_cases() {
        let temp = TempDir::new().unwrap();
        let mut engine = MockProvisioningEngine::new();
        engine.expect_init().times(1).returning(|_| Ok(()));
        engine.expect_validate().times(1).returning(|_| Ok(()));

        let report = runner(suite(temp.path()), engine)
            .with_run_options(RunOptions {
                short: true,
                ..RunOptions::default()
            })
            .run()
            .await
            .unwrap();

        assert_eq!(report.passed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.cases[1].status, CaseStatus::Skipped);
        assert!(report.success());
    }

    #[tokio::test]
    async fn test_short_mode_skips_applying_case_marked_non_mutating() {
        let temp = TempDir::new().unwrap();
        let mut config = suite(temp.path());
        config.cases[1].mutating = Some(false);

        let mut engine = MockProvisioningEngine::new();
        engine.expect_init().times(1).returning(|_| Ok(()));
        engine.expect_validate().times(1).returning(|_| Ok(()));
        engine.expect_apply().never();
        engine.expect_destroy().never();

        let report = runner(config, engine)
            .with_run_options(RunOptions {
                short: true,
                ..RunOptions::default()
            })
            .run()
            .await
            .unwrap();

        assert_eq!(report.case("network-converge").unwrap().status, CaseStatus::Skipped);
        assert_eq!(report.passed(), 1);
    }

    #[tokio::test]
    async fn test_filter_selects_cases() {
        let temp = TempDir::new().unwrap();
        let engine = MockProvisioningEngine::new();
        let runner = runner(suite(temp.path()), engine).with_run_options(RunOptions {
            filter: Some(String::from("converge")),
            ..RunOptions::default()
        });

        let selected = runner.selected_cases();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "network-converge");
    }

    #[tokio::test]
    async fn test_non_convergent_case_records_pending_changes() {
        let temp = TempDir::new().unwrap();
        let mut engine = MockProvisioningEngine::new();
        engine.expect_init().returning(|_| Ok(()));
        engine.expect_validate().returning(|_| Ok(()));
        engine.expect_apply().times(1).returning(|_| Ok(()));
        engine.expect_plan().times(1).returning(|_| {
            Ok(PlanResult {
                to_change: vec![String::from("aws_route_table.public")],
                ..PlanResult::default()
            })
        });
        engine.expect_destroy().times(1).returning(|_| Ok(()));

        let report = runner(suite(temp.path()), engine).run().await.unwrap();

        let case = report.case("network-converge").unwrap();
        assert_eq!(case.status, CaseStatus::Failed);
        let pending = case.pending.as_ref().unwrap();
        assert_eq!(pending.to_change, vec!["aws_route_table.public"]);
        assert!(!report.success());
        assert!(!temp.path().join("infra").join(case.namespace.as_ref().unwrap()).exists());
    }

    #[tokio::test]
    async fn test_invalid_suite_never_calls_engine() {
        let temp = TempDir::new().unwrap();
        let mut config = suite(temp.path());
        config.cases[1].kind = CaseKind::Diverge;
        config.cases[1].overrides = VarMap::new();

        let result = runner(config, MockProvisioningEngine::new()).run().await;
        assert!(matches!(result, Err(ConvergeError::Config(_))));
    }
}

//! End-to-end suite runs against a scripted engine.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use convergence_harness::assertions::BucketProbe;
use convergence_harness::config::{ConfigParser, ModuleOptions, SuiteConfig};
use convergence_harness::engine::{ProvisioningEngine, RetryPolicy};
use convergence_harness::error::{ConvergeError, EngineError, Result};
use convergence_harness::harness::DeploymentScope;
use convergence_harness::plan::PlanResult;
use convergence_harness::runner::{RunOptions, SuiteRunner};
use convergence_harness::state::{CaseStatus, StateNamespace};

/// What the next planning pass returns.
enum PlanStep {
    Plan(PlanResult),
    Transient,
}

/// Engine double that records every call and replays scripted results.
#[derive(Default)]
struct ScriptedEngine {
    calls: Mutex<Vec<(String, String)>>,
    plans: Mutex<VecDeque<PlanStep>>,
    outputs: BTreeMap<String, Value>,
    apply_error: bool,
    apply_delay: Option<Duration>,
    plan_delay: Option<Duration>,
}

impl ScriptedEngine {
    fn with_plans(plans: Vec<PlanStep>) -> Self {
        Self {
            plans: Mutex::new(plans.into()),
            ..Self::default()
        }
    }

    fn record(&self, op: &str, options: &ModuleOptions) {
        self.calls
            .lock()
            .unwrap()
            .push((op.to_string(), options.namespace().id().to_string()));
    }

    fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| o == op)
            .count()
    }

    fn namespaces(&self, op: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| o == op)
            .map(|(_, ns)| ns.clone())
            .collect()
    }
}

#[async_trait]
impl ProvisioningEngine for ScriptedEngine {
    async fn init(&self, options: &ModuleOptions) -> Result<()> {
        self.record("init", options);
        Ok(())
    }

    async fn validate(&self, options: &ModuleOptions) -> Result<()> {
        self.record("validate", options);
        Ok(())
    }

    async fn apply(&self, options: &ModuleOptions) -> Result<()> {
        self.record("apply", options);
        if let Some(delay) = self.apply_delay {
            tokio::time::sleep(delay).await;
            self.record("apply_finished", options);
        }
        if self.apply_error {
            return Err(ConvergeError::Engine(EngineError::ApplyExecution {
                module: options.module_ref(),
                message: String::from("Error: creating S3 Bucket: AccessDenied"),
                transient: false,
            }));
        }
        Ok(())
    }

    async fn plan(&self, options: &ModuleOptions) -> Result<PlanResult> {
        self.record("plan", options);
        if let Some(delay) = self.plan_delay {
            tokio::time::sleep(delay).await;
        }

        // A changed region replaces the buckets.
        if options.vars().get("region") == Some(&json!("us-east-1")) {
            return Ok(PlanResult {
                to_add: vec![String::from("aws_s3_bucket.raw_videos")],
                to_destroy: vec![String::from("aws_s3_bucket.raw_videos")],
                ..PlanResult::default()
            });
        }

        match self.plans.lock().unwrap().pop_front() {
            Some(PlanStep::Plan(plan)) => Ok(plan),
            Some(PlanStep::Transient) => Err(ConvergeError::Engine(EngineError::PlanExecution {
                module: options.module_ref(),
                message: String::from("Error: Failed to install provider: connection reset by peer"),
                transient: true,
            })),
            None => Ok(PlanResult::default()),
        }
    }

    async fn destroy(&self, options: &ModuleOptions) -> Result<()> {
        self.record("destroy", options);
        Ok(())
    }

    async fn output(&self, options: &ModuleOptions, name: &str) -> Result<Value> {
        self.record("output", options);
        self.outputs.get(name).cloned().ok_or_else(|| {
            ConvergeError::Engine(EngineError::OutputQuery {
                module: options.module_ref(),
                name: name.to_string(),
                message: String::from("output not found"),
            })
        })
    }

    async fn format_check(&self, options: &ModuleOptions) -> Result<()> {
        self.record("format_check", options);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Probe that knows a fixed set of buckets.
struct KnownBuckets(Vec<String>);

#[async_trait]
impl BucketProbe for KnownBuckets {
    async fn bucket_exists(&self, bucket: &str, _region: &str) -> Result<bool> {
        Ok(self.0.iter().any(|b| b == bucket))
    }
}

fn suite(work_dir: &TempDir, cases: &str) -> SuiteConfig {
    let yaml = format!(
        r#"
suite:
  name: infra
engine:
  work_dir: "{}"
retry:
  max_retries: 3
  time_between_retries_secs: 0
parallelism: 2
cases:
{cases}
"#,
        work_dir.path().display()
    );
    ConfigParser::new().parse_yaml(&yaml, None).unwrap()
}

const NETWORK_CONVERGE: &str = r#"
  - name: network
    kind: converge
    module: terraform/modules/network
    vars:
      environment: test
      vpc_cidr: "10.99.0.0/16"
      availability_zones: ["ap-northeast-2a", "ap-northeast-2c"]
    outputs:
      - name: vpc_id
        expect: not_empty
      - name: public_subnet_ids
        expect:
          length: 2
"#;

fn network_engine(plans: Vec<PlanStep>) -> ScriptedEngine {
    let mut engine = ScriptedEngine::with_plans(plans);
    engine.outputs.insert(String::from("vpc_id"), json!("vpc-0abc"));
    engine
        .outputs
        .insert(String::from("public_subnet_ids"), json!(["subnet-a", "subnet-c"]));
    engine
}

fn runner(config: SuiteConfig, engine: &Arc<ScriptedEngine>) -> SuiteRunner {
    SuiteRunner::new(
        config,
        Arc::clone(engine) as Arc<dyn ProvisioningEngine>,
        Arc::new(KnownBuckets(vec![String::from("test-raw-videos")])),
    )
}

#[tokio::test]
async fn converged_module_passes_and_is_destroyed_once() {
    let work_dir = TempDir::new().unwrap();
    let engine = Arc::new(network_engine(vec![]));

    let report = runner(suite(&work_dir, NETWORK_CONVERGE), &engine)
        .run()
        .await
        .unwrap();

    let case = report.case("network").unwrap();
    assert_eq!(case.status, CaseStatus::Passed, "{:?}", case.error);
    assert_eq!(
        case.plan_summary.as_deref(),
        Some("Plan: 0 to add, 0 to change, 0 to destroy.")
    );
    assert_eq!(engine.count("apply"), 1);
    assert_eq!(engine.count("plan"), 1);
    assert_eq!(engine.count("destroy"), 1);
}

#[tokio::test]
async fn non_convergent_module_fails_and_is_destroyed_once() {
    let work_dir = TempDir::new().unwrap();
    let engine = Arc::new(network_engine(vec![PlanStep::Plan(PlanResult {
        to_change: vec![String::from("aws_security_group.default")],
        ..PlanResult::default()
    })]));

    let report = runner(suite(&work_dir, NETWORK_CONVERGE), &engine)
        .run()
        .await
        .unwrap();

    let case = report.case("network").unwrap();
    assert_eq!(case.status, CaseStatus::Failed);
    assert_eq!(
        case.pending.as_ref().unwrap().to_change,
        vec!["aws_security_group.default"]
    );
    assert_eq!(engine.count("plan"), 1);
    assert_eq!(engine.count("destroy"), 1);
    assert!(!report.success());
}

#[tokio::test]
async fn transient_plan_failures_are_retried() {
    let work_dir = TempDir::new().unwrap();
    let engine = Arc::new(network_engine(vec![PlanStep::Transient, PlanStep::Transient]));

    let report = runner(suite(&work_dir, NETWORK_CONVERGE), &engine)
        .run()
        .await
        .unwrap();

    assert_eq!(report.case("network").unwrap().status, CaseStatus::Passed);
    assert_eq!(engine.count("plan"), 3);
    assert_eq!(engine.count("destroy"), 1);
}

#[tokio::test]
async fn apply_error_still_destroys_once() {
    let work_dir = TempDir::new().unwrap();
    let mut engine = network_engine(vec![]);
    engine.apply_error = true;
    let engine = Arc::new(engine);

    let report = runner(suite(&work_dir, NETWORK_CONVERGE), &engine)
        .run()
        .await
        .unwrap();

    let case = report.case("network").unwrap();
    assert_eq!(case.status, CaseStatus::Failed);
    assert!(case.error.as_deref().unwrap().contains("AccessDenied"));
    assert_eq!(engine.count("plan"), 0);
    assert_eq!(engine.count("destroy"), 1);
}

#[tokio::test]
async fn timed_out_case_still_destroys_once() {
    let work_dir = TempDir::new().unwrap();
    let mut engine = network_engine(vec![]);
    engine.plan_delay = Some(Duration::from_secs(30));
    let engine = Arc::new(engine);

    let cases = format!("{NETWORK_CONVERGE}    timeout_secs: 1\n");
    let report = runner(suite(&work_dir, &cases), &engine)
        .run()
        .await
        .unwrap();

    let case = report.case("network").unwrap();
    assert_eq!(case.status, CaseStatus::Failed);
    assert!(case.error.as_deref().unwrap().contains("timed out after 1000ms"));
    assert_eq!(engine.count("destroy"), 1);
}

#[tokio::test]
async fn apply_outliving_the_timeout_runs_to_completion_before_destroy() {
    let mut engine = network_engine(vec![]);
    engine.apply_delay = Some(Duration::from_millis(300));
    let engine = Arc::new(engine);

    let options = ModuleOptions::builder("terraform/modules/network")
        .var("environment", "test")
        .namespace(StateNamespace::new("/tmp/converge-scope/network-1"))
        .build()
        .unwrap();

    let result = DeploymentScope::new(
        Arc::clone(&engine) as Arc<dyn ProvisioningEngine>,
        RetryPolicy::none(),
        options,
    )
    .with_timeout(Some(Duration::from_millis(50)))
    .run(|| async { Ok(()) })
    .await;

    assert!(result.is_ok(), "{result:?}");
    let calls: Vec<String> = engine
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(op, _)| op.clone())
        .collect();
    assert_eq!(calls, vec!["init", "apply", "apply_finished", "destroy"]);
}

#[tokio::test]
async fn changed_region_is_detected_as_divergence() {
    let work_dir = TempDir::new().unwrap();
    let mut engine = ScriptedEngine::default();
    engine
        .outputs
        .insert(String::from("raw_videos_bucket_name"), json!("test-raw-videos"));
    let engine = Arc::new(engine);

    let cases = r#"
  - name: storage
    kind: diverge
    module: terraform/modules/storage
    vars:
      environment: test
      region: ap-northeast-2
    overrides:
      region: us-east-1
    outputs:
      - name: raw_videos_bucket_name
        expect:
          s3_bucket_exists:
            region: ap-northeast-2
"#;

    let report = runner(suite(&work_dir, cases), &engine).run().await.unwrap();

    let case = report.case("storage").unwrap();
    assert_eq!(case.status, CaseStatus::Passed, "{:?}", case.error);
    assert_eq!(
        case.plan_summary.as_deref(),
        Some("Plan: 1 to add, 0 to change, 1 to destroy.")
    );
    assert_eq!(engine.count("destroy"), 1);
}

#[tokio::test]
async fn invalid_suite_makes_no_engine_calls() {
    let work_dir = TempDir::new().unwrap();
    let engine = Arc::new(ScriptedEngine::default());

    let cases = r#"
  - name: storage
    kind: diverge
    module: terraform/modules/storage
  - name: storage
    kind: validate
    module: terraform/modules/storage
"#;

    let result = runner(suite(&work_dir, cases), &engine).run().await;

    assert!(matches!(result, Err(ConvergeError::Config(_))));
    assert!(engine.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_cases_use_distinct_namespaces() {
    let work_dir = TempDir::new().unwrap();
    let engine = Arc::new(network_engine(vec![]));

    let cases = format!(
        "{NETWORK_CONVERGE}{}{}",
        NETWORK_CONVERGE.replace("name: network\n", "name: network-b\n"),
        NETWORK_CONVERGE.replace("name: network\n", "name: network-c\n"),
    );
    let report = runner(suite(&work_dir, &cases), &engine)
        .run()
        .await
        .unwrap();

    assert_eq!(report.passed(), 3);
    let mut namespaces = engine.namespaces("apply");
    namespaces.sort();
    namespaces.dedup();
    assert_eq!(namespaces.len(), 3);
    assert_eq!(engine.count("destroy"), 3);
}

#[tokio::test]
async fn short_mode_runs_only_non_mutating_cases() {
    let work_dir = TempDir::new().unwrap();
    let engine = Arc::new(network_engine(vec![]));

    let cases = format!(
        "{NETWORK_CONVERGE}
  - name: network-validate
    kind: validate
    module: terraform/modules/network
  - name: modules-format
    kind: format
    module: terraform
"
    );
    let report = runner(suite(&work_dir, &cases), &engine)
        .with_run_options(RunOptions {
            short: true,
            ..RunOptions::default()
        })
        .run()
        .await
        .unwrap();

    assert_eq!(report.skipped(), 1);
    assert_eq!(report.passed(), 2);
    assert_eq!(engine.count("apply"), 0);
    assert_eq!(engine.count("format_check"), 1);
    assert_eq!(engine.count("validate"), 1);
}

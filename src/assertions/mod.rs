//! Output assertions.
//!
//! After a module is applied, its outputs are read back and checked against
//! the case's expectations. All expectations are evaluated and their
//! failures reported together.

mod s3;

pub use s3::{BucketProbe, S3BucketProbe};

#[cfg(test)]
pub use s3::MockBucketProbe;

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::{ModuleOptions, OutputCheck, OutputExpectation};
use crate::engine::ProvisioningEngine;
use crate::error::{AssertionError, ConvergeError, EngineError, Result};
use crate::plan::PlanResult;

/// Reads outputs and evaluates expectations on them.
pub struct OutputAsserter<'a> {
    engine: &'a dyn ProvisioningEngine,
    probe: &'a dyn BucketProbe,
}

impl<'a> OutputAsserter<'a> {
    /// Creates an asserter over the given engine and bucket probe.
    #[must_use]
    pub fn new(engine: &'a dyn ProvisioningEngine, probe: &'a dyn BucketProbe) -> Self {
        Self { engine, probe }
    }

    /// Checks every expectation and returns the outputs that were read.
    ///
    /// # Errors
    ///
    /// Returns `OutputMismatch` listing every failed expectation, or an
    /// engine error other than an unreadable output.
    pub async fn check(
        &self,
        options: &ModuleOptions,
        checks: &[OutputCheck],
    ) -> Result<BTreeMap<String, Value>> {
        let mut outputs = BTreeMap::new();
        let mut failures = Vec::new();

        for name in referenced_outputs(checks) {
            match self.engine.output(options, &name).await {
                Ok(value) => {
                    debug!("Output {name} = {value}");
                    outputs.insert(name, value);
                }
                Err(ConvergeError::Engine(EngineError::OutputQuery { message, .. })) => {
                    failures.push(format!("{name}: could not be read ({message})"));
                }
                Err(e) => return Err(e),
            }
        }

        for check in checks {
            let Some(value) = outputs.get(&check.name) else {
                continue;
            };

            let failure = match &check.expect {
                OutputExpectation::S3BucketExists { region } => {
                    self.check_bucket(value, region).await
                }
                expect => check_value(expect, value, &outputs),
            };

            if let Some(reason) = failure {
                failures.push(format!("{}: {reason}", check.name));
            }
        }

        if !failures.is_empty() {
            return Err(ConvergeError::Assertion(AssertionError::OutputMismatch {
                failures,
            }));
        }

        info!("{} output expectation(s) passed", checks.len());
        Ok(outputs)
    }

    async fn check_bucket(&self, value: &Value, region: &str) -> Option<String> {
        let Some(bucket) = value.as_str() else {
            return Some(format!("expected a bucket name, got {value}"));
        };

        match self.probe.bucket_exists(bucket, region).await {
            Ok(true) => None,
            Ok(false) => Some(format!("bucket {bucket} does not exist in {region}")),
            Err(e) => Some(e.to_string()),
        }
    }
}

/// Checks that the plan declares every required output.
///
/// # Errors
///
/// Returns `MissingPlannedOutputs` naming the outputs not in the plan.
pub fn check_planned_outputs(plan: &PlanResult, required: &[String]) -> Result<()> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !plan.declares_output(name))
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConvergeError::Assertion(
            AssertionError::MissingPlannedOutputs { missing },
        ))
    }
}

/// Evaluates an expectation that needs no remote call.
///
/// Returns a failure description, or `None` if the value meets it.
#[must_use]
pub fn check_value(
    expect: &OutputExpectation,
    value: &Value,
    outputs: &BTreeMap<String, Value>,
) -> Option<String> {
    match expect {
        OutputExpectation::NotEmpty => is_empty(value).then(|| String::from("is empty")),
        OutputExpectation::Length(expected) => match length(value) {
            Some(actual) if actual == *expected => None,
            Some(actual) => Some(format!("has {actual} entries, expected {expected}")),
            None => Some(format!("is not a list or map: {value}")),
        },
        OutputExpectation::Contains(needle) => {
            let haystack = render(value);
            (!haystack.contains(needle.as_str()))
                .then(|| format!("'{haystack}' does not contain '{needle}'"))
        }
        OutputExpectation::ContainsOutput(other) => match outputs.get(other) {
            Some(other_value) => {
                let needle = render(other_value);
                let haystack = render(value);
                (!haystack.contains(needle.as_str()))
                    .then(|| format!("'{haystack}' does not contain output {other} ('{needle}')"))
            }
            None => Some(format!("referenced output {other} is unavailable")),
        },
        OutputExpectation::S3BucketExists { .. } => {
            Some(String::from("bucket checks need a probe"))
        }
    }
}

/// Output names to read: every checked output plus every referenced one.
fn referenced_outputs(checks: &[OutputCheck]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let referenced = checks.iter().flat_map(|c| {
        let other = match &c.expect {
            OutputExpectation::ContainsOutput(other) => Some(other.clone()),
            _ => None,
        };
        std::iter::once(c.name.clone()).chain(other)
    });
    for name in referenced {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::Array(a) => Some(a.len()),
        Value::Object(o) => Some(o.len()),
        _ => None,
    }
}

/// Renders a value as plain text; strings are not quoted.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MockProvisioningEngine;
    use crate::state::StateNamespace;
    use serde_json::json;

    fn options() -> ModuleOptions {
        ModuleOptions::builder("modules/storage")
            .namespace(StateNamespace::new("/tmp/converge/storage-1"))
            .build()
            .unwrap()
    }

    fn check(name: &str, expect: OutputExpectation) -> OutputCheck {
        OutputCheck {
            name: name.to_string(),
            expect,
        }
    }

    fn storage_engine() -> MockProvisioningEngine {
        let mut engine = MockProvisioningEngine::new();
        engine.expect_output().returning(|_, name| match name {
            "raw_videos_bucket_name" => Ok(json!("test-1a2b3c4d-raw-videos")),
            "raw_videos_bucket_arn" => Ok(json!("arn:aws:s3:::test-1a2b3c4d-raw-videos")),
            "public_subnet_ids" => Ok(json!(["subnet-1", "subnet-2"])),
            "ecs_cluster_arn" => Ok(json!("")),
            other => Err(ConvergeError::Engine(EngineError::OutputQuery {
                module: String::from("modules/storage"),
                name: other.to_string(),
                message: String::from("output not found"),
            })),
        });
        engine
    }

    #[test]
    fn test_not_empty() {
        let outputs = BTreeMap::new();
        assert!(check_value(&OutputExpectation::NotEmpty, &json!("vpc-123"), &outputs).is_none());
        assert!(check_value(&OutputExpectation::NotEmpty, &json!(""), &outputs).is_some());
        assert!(check_value(&OutputExpectation::NotEmpty, &json!([]), &outputs).is_some());
        assert!(check_value(&OutputExpectation::NotEmpty, &Value::Null, &outputs).is_some());
    }

    #[test]
    fn test_length() {
        let outputs = BTreeMap::new();
        let expect = OutputExpectation::Length(2);
        assert!(check_value(&expect, &json!(["a", "c"]), &outputs).is_none());
        assert!(check_value(&expect, &json!(["a"]), &outputs).is_some());
        assert!(check_value(&expect, &json!("ab"), &outputs).is_some());
    }

    #[test]
    fn test_contains_and_contains_output() {
        let mut outputs = BTreeMap::new();
        outputs.insert(String::from("bucket"), json!("raw-videos"));

        let arn = json!("arn:aws:s3:::raw-videos");
        assert!(check_value(&OutputExpectation::Contains(String::from("arn:aws:s3:")), &arn, &outputs).is_none());
        assert!(check_value(&OutputExpectation::Contains(String::from("arn:aws:ecs:")), &arn, &outputs).is_some());
        assert!(check_value(&OutputExpectation::ContainsOutput(String::from("bucket")), &arn, &outputs).is_none());
        assert!(check_value(&OutputExpectation::ContainsOutput(String::from("missing")), &arn, &outputs).is_some());
    }

    #[test]
    fn test_planned_outputs() {
        let plan = PlanResult {
            outputs: vec![String::from("vpc_id")],
            ..PlanResult::default()
        };
        assert!(check_planned_outputs(&plan, &[String::from("vpc_id")]).is_ok());

        let err = check_planned_outputs(&plan, &[String::from("vpc_id"), String::from("alb_dns")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConvergeError::Assertion(AssertionError::MissingPlannedOutputs { ref missing })
                if missing == &["alb_dns"]
        ));
    }

    #[tokio::test]
    async fn test_all_failures_reported_together() {
        let engine = storage_engine();
        let probe = MockBucketProbe::new();
        let asserter = OutputAsserter::new(&engine, &probe);

        let checks = vec![
            check("raw_videos_bucket_name", OutputExpectation::NotEmpty),
            check(
                "raw_videos_bucket_arn",
                OutputExpectation::ContainsOutput(String::from("raw_videos_bucket_name")),
            ),
            check("public_subnet_ids", OutputExpectation::Length(3)),
            check("ecs_cluster_arn", OutputExpectation::NotEmpty),
            check("missing_output", OutputExpectation::NotEmpty),
        ];

        let err = asserter.check(&options(), &checks).await.unwrap_err();
        let ConvergeError::Assertion(AssertionError::OutputMismatch { failures }) = err else {
            panic!("expected OutputMismatch, got {err:?}");
        };
        assert_eq!(failures.len(), 3);
        assert!(failures.iter().any(|f| f.starts_with("public_subnet_ids")));
        assert!(failures.iter().any(|f| f.starts_with("ecs_cluster_arn")));
        assert!(failures.iter().any(|f| f.starts_with("missing_output")));
    }

    #[tokio::test]
    async fn test_bucket_probe() {
        let engine = storage_engine();
        let mut probe = MockBucketProbe::new();
        probe
            .expect_bucket_exists()
            .withf(|bucket, region| {
                bucket.to_string() == "test-1a2b3c4d-raw-videos" && region.to_string() == "ap-northeast-2"
            })
            .times(1)
            .returning(|_, _| Ok(true));
        let asserter = OutputAsserter::new(&engine, &probe);

        let checks = vec![check(
            "raw_videos_bucket_name",
            OutputExpectation::S3BucketExists {
                region: String::from("ap-northeast-2"),
            },
        )];

        let outputs = asserter.check(&options(), &checks).await.unwrap();
        assert_eq!(outputs.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_bucket_fails() {
        let engine = storage_engine();
        let mut probe = MockBucketProbe::new();
        probe.expect_bucket_exists().returning(|_, _| Ok(false));
        let asserter = OutputAsserter::new(&engine, &probe);

        let checks = vec![check(
            "raw_videos_bucket_name",
            OutputExpectation::S3BucketExists {
                region: String::from("ap-northeast-2"),
            },
        )];

        assert!(asserter.check(&options(), &checks).await.is_err());
    }
}

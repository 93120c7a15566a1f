//! Suite validation.
//!
//! This module checks a suite before any engine command runs, so malformed
//! configuration never reaches a mutating call.

use crate::error::{ConfigError, ConvergeError, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

use super::spec::{CaseConfig, CaseKind, OutputExpectation, SuiteConfig};

/// Validator for suite configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Whether module directories must exist on disk.
    check_paths: bool,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a validator that also checks module directories exist.
    #[must_use]
    pub const fn new() -> Self {
        Self { check_paths: true }
    }

    /// Creates a validator that only checks the suite's internal consistency.
    #[must_use]
    pub const fn without_path_checks() -> Self {
        Self { check_paths: false }
    }

    /// Validates a suite.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &SuiteConfig) -> Result<ValidationResult> {
        let result = self.collect(config);

        if let Some(first_error) = result.errors.first() {
            return Err(ConvergeError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }

        debug!("Suite validation passed");
        Ok(result)
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn collect(&self, config: &SuiteConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.suite.name.is_empty() {
            result.push_error("suite.name", "Suite name cannot be empty");
        } else if !is_valid_name(&config.suite.name) {
            result.push_error(
                "suite.name",
                format!(
                    "Suite name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    config.suite.name
                ),
            );
        }

        if config.parallelism == 0 {
            result.push_error("parallelism", "Parallelism must be at least 1");
        }

        if config.engine.binary.trim().is_empty() {
            result.push_error("engine.binary", "Engine binary cannot be empty");
        }

        if config.retry.max_retries > 10 {
            result.warnings.push(format!(
                "retry.max_retries: {} retries is unusually high",
                config.retry.max_retries
            ));
        }

        self.validate_cases(&config.cases, &mut result);
        result
    }

    /// Validates all case configurations.
    fn validate_cases(&self, cases: &[CaseConfig], result: &mut ValidationResult) {
        if cases.is_empty() {
            result.warnings.push(String::from("No cases defined in suite"));
            return;
        }

        let mut seen_names = HashSet::new();

        for (i, case) in cases.iter().enumerate() {
            let prefix = format!("cases[{i}]");

            if !seen_names.insert(case.name.as_str()) {
                result.push_error(
                    format!("{prefix}.name"),
                    format!("Duplicate case name: {}", case.name),
                );
            }

            if !is_valid_name(&case.name) {
                result.push_error(
                    format!("{prefix}.name"),
                    format!(
                        "Case name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        case.name
                    ),
                );
            }

            self.validate_module(case, &prefix, result);
            Self::validate_kind_fields(case, &prefix, result);
            Self::validate_outputs(case, &prefix, result);
        }
    }

    /// Validates the module path.
    fn validate_module(&self, case: &CaseConfig, prefix: &str, result: &mut ValidationResult) {
        if case.module.trim().is_empty() {
            result.push_error(format!("{prefix}.module"), "Module path cannot be empty");
        } else if self.check_paths && !Path::new(&case.module).is_dir() {
            result.push_error(
                format!("{prefix}.module"),
                format!("Module directory does not exist: {}", case.module),
            );
        }
    }

    /// Validates fields whose meaning depends on the case kind.
    fn validate_kind_fields(case: &CaseConfig, prefix: &str, result: &mut ValidationResult) {
        match case.kind {
            CaseKind::Diverge => {
                if case.overrides.is_empty() {
                    result.push_error(
                        format!("{prefix}.overrides"),
                        "Diverge cases need at least one override",
                    );
                }
                for (key, value) in &case.overrides {
                    if case.vars.get(key) == Some(value) {
                        result.warnings.push(format!(
                            "{prefix}.overrides.{key}: override equals the base value"
                        ));
                    }
                }
                if case.outputs.is_empty() {
                    result.warnings.push(format!(
                        "{prefix}: checks neither outputs nor convergence of the applied module"
                    ));
                }
            }
            _ => {
                if !case.overrides.is_empty() {
                    result.warnings.push(format!(
                        "{prefix}.overrides: ignored for {} cases",
                        case.kind
                    ));
                }
            }
        }

        if !case.required_outputs.is_empty() && case.kind != CaseKind::Plan {
            result.warnings.push(format!(
                "{prefix}.required_outputs: only checked by plan cases"
            ));
        }

        if case.timeout_secs == Some(0) {
            result.push_error(
                format!("{prefix}.timeout_secs"),
                "Timeout must be greater than zero",
            );
        }

        if case.kind.applies() && case.mutating == Some(false) {
            result.warnings.push(format!(
                "{prefix}.mutating: ignored, {} cases always apply real resources",
                case.kind
            ));
        }
    }

    /// Validates output expectations.
    fn validate_outputs(case: &CaseConfig, prefix: &str, result: &mut ValidationResult) {
        if case.outputs.is_empty() {
            return;
        }

        if !case.kind.applies() {
            result.push_error(
                format!("{prefix}.outputs"),
                format!("Output checks need an applied module; {} cases never apply", case.kind),
            );
            return;
        }

        let names: HashSet<&str> = case.outputs.iter().map(|o| o.name.as_str()).collect();

        for (i, check) in case.outputs.iter().enumerate() {
            let field = format!("{prefix}.outputs[{i}]");

            if check.name.is_empty() {
                result.push_error(&field, "Output name cannot be empty");
            }

            match &check.expect {
                OutputExpectation::Contains(s) if s.is_empty() => {
                    result.warnings.push(format!("{field}: empty substring always matches"));
                }
                OutputExpectation::ContainsOutput(other) if !names.contains(other.as_str()) => {
                    result.warnings.push(format!(
                        "{field}: '{other}' is read but has no check of its own"
                    ));
                }
                OutputExpectation::S3BucketExists { region } if region.is_empty() => {
                    result.push_error(&field, "S3 bucket check needs a region");
                }
                _ => {}
            }
        }
    }
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }
}

/// Checks if a name is valid (lowercase alphanumeric with hyphens).
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

//! Error types for the convergence harness.
//!
//! This module provides the error hierarchy for every stage of a test case:
//! configuration, engine execution, convergence verification, output
//! assertions, and report persistence.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the convergence harness.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provisioning engine errors.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Convergence verification failures.
    #[error("Verification failed: {0}")]
    Verify(#[from] VerifyError),

    /// Output assertion failures.
    #[error("Assertion failed: {0}")]
    Assertion(#[from] AssertionError),

    /// Report persistence errors.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing or malformed.
    #[error("Invalid environment variable {name}: {message}")]
    InvalidEnvVar {
        /// Name of the variable.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// A `key=value` variable argument could not be parsed.
    #[error("Invalid variable assignment '{raw}': expected key=value")]
    InvalidVarAssignment {
        /// The raw argument.
        raw: String,
    },
}

/// Errors raised while driving the provisioning engine.
///
/// Execution variants carry a `transient` flag, set when the engine's error
/// output matches one of the configured retryable-error patterns.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary could not be started.
    #[error("Failed to run '{binary}': {message}")]
    Spawn {
        /// Engine binary.
        binary: String,
        /// Description of the failure.
        message: String,
    },

    /// `init` failed.
    #[error("init failed for {module}: {message}")]
    Init {
        /// Module directory.
        module: String,
        /// Engine error output.
        message: String,
        /// Whether the failure looks transient.
        transient: bool,
    },

    /// The planning pass failed to execute.
    #[error("plan failed for {module}: {message}")]
    PlanExecution {
        /// Module directory.
        module: String,
        /// Engine error output.
        message: String,
        /// Whether the failure looks transient.
        transient: bool,
    },

    /// `apply` failed.
    #[error("apply failed for {module}: {message}")]
    ApplyExecution {
        /// Module directory.
        module: String,
        /// Engine error output.
        message: String,
        /// Whether the failure looks transient.
        transient: bool,
    },

    /// `destroy` failed.
    #[error("destroy failed for {module}: {message}")]
    DestroyExecution {
        /// Module directory.
        module: String,
        /// Engine error output.
        message: String,
        /// Whether the failure looks transient.
        transient: bool,
    },

    /// An output could not be read from applied state.
    #[error("output '{name}' unavailable for {module}: {message}")]
    OutputQuery {
        /// Module directory.
        module: String,
        /// Output name.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// `validate` rejected the module.
    #[error("validate failed for {module}: {message}")]
    Validate {
        /// Module directory.
        module: String,
        /// Engine error output.
        message: String,
    },

    /// `fmt -check` found unformatted files.
    #[error("{module} is not properly formatted; run 'fmt -recursive' to fix: {files:?}")]
    FormatCheck {
        /// Module directory.
        module: String,
        /// Files reported as unformatted.
        files: Vec<String>,
    },

    /// The structured plan output could not be interpreted.
    #[error("Invalid structured plan output: {message}")]
    PlanParse {
        /// Description of the parse failure.
        message: String,
    },

    /// An operation did not finish within its time budget.
    #[error("{operation} timed out after {millis}ms")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Time budget in milliseconds.
        millis: u64,
    },
}

/// Convergence verification failures.
///
/// These are correctness signals and are never retried.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// A re-plan of an applied module still reports pending changes.
    #[error(
        "{module} is not convergent: add={to_add:?}, change={to_change:?}, destroy={to_destroy:?}"
    )]
    NonConvergent {
        /// Module directory.
        module: String,
        /// Resources that would be added.
        to_add: Vec<String>,
        /// Resources that would be changed in place.
        to_change: Vec<String>,
        /// Resources that would be destroyed.
        to_destroy: Vec<String>,
    },

    /// A changed configuration produced no change or destroy actions.
    #[error("{module} reported no change or destroy after overriding {overridden:?}")]
    UnexpectedConvergence {
        /// Module directory.
        module: String,
        /// Variables that were overridden.
        overridden: Vec<String>,
    },
}

/// Output assertion failures.
#[derive(Debug, Error)]
pub enum AssertionError {
    /// One or more outputs did not meet their expectation.
    #[error("{} output expectation(s) failed: {}", .failures.len(), .failures.join("; "))]
    OutputMismatch {
        /// Human-readable failure descriptions.
        failures: Vec<String>,
    },

    /// Outputs expected in the plan were missing.
    #[error("plan is missing required outputs: {missing:?}")]
    MissingPlannedOutputs {
        /// Output names not found in the plan.
        missing: Vec<String>,
    },
}

/// Report persistence errors.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report file exists but cannot be read.
    #[error("Report is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The report could not be written.
    #[error("Failed to write report: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },
}

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;

impl ConvergeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Engine(engine) => engine.is_transient(),
            _ => false,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl EngineError {
    /// Returns true if the failure was classified as transient.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Init { transient, .. }
            | Self::PlanExecution { transient, .. }
            | Self::ApplyExecution { transient, .. }
            | Self::DestroyExecution { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Creates a plan parse error.
    #[must_use]
    pub fn plan_parse(message: impl Into<String>) -> Self {
        Self::PlanParse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_failure(transient: bool) -> ConvergeError {
        ConvergeError::Engine(EngineError::PlanExecution {
            module: String::from("modules/network"),
            message: String::from("connection reset by peer"),
            transient,
        })
    }

    #[test]
    fn test_only_transient_engine_errors_retry() {
        assert!(plan_failure(true).is_retryable());
        assert!(!plan_failure(false).is_retryable());
    }

    #[test]
    fn test_non_convergent_is_not_retryable() {
        let err = ConvergeError::Verify(VerifyError::NonConvergent {
            module: String::from("modules/storage"),
            to_add: vec![],
            to_change: vec![String::from("aws_s3_bucket.raw")],
            to_destroy: vec![],
        });
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("aws_s3_bucket.raw"));
    }

    #[test]
    fn test_validation_error_is_fatal() {
        let err = ConvergeError::Config(ConfigError::validation("bad", "cases[0].module"));
        assert!(!err.is_retryable());
    }
}

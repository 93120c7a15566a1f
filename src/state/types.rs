//! Report types recorded for each suite run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CaseKind;

/// Current version of the report format.
pub const REPORT_VERSION: &str = "1.0";

/// The outcome of one suite run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    /// Report format version.
    pub version: String,
    /// Suite name.
    pub suite: String,
    /// Host the suite ran on.
    pub host: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Per-case outcomes, in suite order.
    pub cases: Vec<CaseReport>,
}

/// The outcome of one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    /// Case name.
    pub name: String,
    /// Case kind.
    pub kind: CaseKind,
    /// Module directory.
    pub module: String,
    /// Final status.
    pub status: CaseStatus,
    /// Namespace the case ran in.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Summary of the last plan, if one ran.
    #[serde(default)]
    pub plan_summary: Option<String>,
    /// Resources that kept the module from converging.
    #[serde(default)]
    pub pending: Option<PendingChanges>,
    /// Error description for failed cases, or skip reason.
    #[serde(default)]
    pub error: Option<String>,
}

/// Resource addresses still pending after a re-plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingChanges {
    /// Resources that would be added.
    pub to_add: Vec<String>,
    /// Resources that would be changed in place.
    pub to_change: Vec<String>,
    /// Resources that would be destroyed.
    pub to_destroy: Vec<String>,
}

/// Case status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    /// All checks passed.
    Passed,
    /// A check or engine command failed.
    Failed,
    /// The case did not run.
    Skipped,
}

impl SuiteReport {
    /// Starts a new report for the given suite.
    #[must_use]
    pub fn new(suite: &str) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("unknown"));

        Self {
            version: REPORT_VERSION.to_string(),
            suite: suite.to_string(),
            host,
            started_at: Utc::now(),
            finished_at: None,
            cases: Vec::new(),
        }
    }

    /// Marks the run as finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Number of passed cases.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(CaseStatus::Passed)
    }

    /// Number of failed cases.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(CaseStatus::Failed)
    }

    /// Number of skipped cases.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(CaseStatus::Skipped)
    }

    /// Returns true if no case failed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    /// Gets a case report by name.
    #[must_use]
    pub fn case(&self, name: &str) -> Option<&CaseReport> {
        self.cases.iter().find(|c| c.name == name)
    }

    fn count(&self, status: CaseStatus) -> usize {
        self.cases.iter().filter(|c| c.status == status).count()
    }
}

impl PendingChanges {
    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_change.is_empty() && self.to_destroy.is_empty()
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Suite {}: {} passed, {} failed, {} skipped",
            self.suite,
            self.passed(),
            self.failed(),
            self.skipped()
        )
    }
}

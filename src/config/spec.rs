//! Suite specification types.
//!
//! This module defines the structs that map to the `converge.yaml` file.
//! A suite lists test cases, each targeting one declarative module with a
//! fixed input configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variable values passed to a module (strings, lists, nested maps).
pub type VarMap = BTreeMap<String, serde_json::Value>;

/// The root configuration structure for a convergence suite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteConfig {
    /// Suite-level metadata.
    pub suite: SuiteMeta,
    /// Provisioning engine settings.
    #[serde(default)]
    pub engine: EngineSettings,
    /// Retry settings for transient engine failures.
    #[serde(default)]
    pub retry: RetrySettings,
    /// Maximum number of cases running at once.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Test cases.
    pub cases: Vec<CaseConfig>,
}

/// Suite-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuiteMeta {
    /// Suite name, used to group namespaces and reports.
    pub name: String,
}

/// Provisioning engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSettings {
    /// Engine binary (resolved through `PATH`).
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Directory holding per-case namespaces and the last report.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    /// Disable colour codes in engine output.
    #[serde(default = "default_true")]
    pub no_color: bool,
    /// Keep namespaces after cases finish.
    #[serde(default)]
    pub keep_work_dir: bool,
}

/// Retry settings for transient engine failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts, in seconds.
    #[serde(default = "default_time_between_retries")]
    pub time_between_retries_secs: u64,
    /// Extra retryable error patterns (substring -> explanation), merged
    /// with the built-in list.
    #[serde(default)]
    pub retryable_errors: BTreeMap<String, String>,
}

/// Configuration for a single test case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseConfig {
    /// Unique case name.
    pub name: String,
    /// What the case does.
    pub kind: CaseKind,
    /// Module directory, relative to the suite file.
    pub module: String,
    /// Input variables.
    #[serde(default)]
    pub vars: VarMap,
    /// Backend configuration passed on init.
    #[serde(default)]
    pub backend_config: BTreeMap<String, String>,
    /// Variables changed for the divergence re-plan.
    #[serde(default)]
    pub overrides: VarMap,
    /// Expectations on outputs of the applied module.
    #[serde(default)]
    pub outputs: Vec<OutputCheck>,
    /// Outputs that must be declared in the plan.
    #[serde(default)]
    pub required_outputs: Vec<String>,
    /// Marks a case as creating real resources. Converge and diverge cases
    /// always do, whatever this says.
    #[serde(default)]
    pub mutating: Option<bool>,
    /// Variable that receives a generated unique identifier.
    #[serde(default)]
    pub unique_id_var: Option<String>,
    /// Time budget for the case, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Kinds of test case.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CaseKind {
    /// Init and validate the module.
    Validate,
    /// Check formatting of the module tree.
    Format,
    /// Init and plan the module without applying.
    Plan,
    /// Apply, assert outputs, then verify the re-plan is empty.
    Converge,
    /// Apply, then verify a changed configuration is detected.
    Diverge,
}

/// Expectation attached to one output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputCheck {
    /// Output name.
    pub name: String,
    /// Expectation on its value.
    pub expect: OutputExpectation,
}

/// Expectations on an output value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputExpectation {
    /// The value is not null, not an empty string, list, or map.
    NotEmpty,
    /// The value is a list or map with exactly this many entries.
    Length(usize),
    /// The value, rendered as a string, contains this substring.
    Contains(String),
    /// The value contains the value of another output.
    ContainsOutput(String),
    /// The value names an S3 bucket that exists in the given region.
    S3BucketExists {
        /// Bucket region.
        region: String,
    },
}

const fn default_parallelism() -> usize {
    4
}

fn default_binary() -> String {
    String::from("terraform")
}

fn default_work_dir() -> String {
    String::from(".converge")
}

const fn default_true() -> bool {
    true
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_time_between_retries() -> u64 {
    5
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            work_dir: default_work_dir(),
            no_color: true,
            keep_work_dir: false,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            time_between_retries_secs: default_time_between_retries(),
            retryable_errors: BTreeMap::new(),
        }
    }
}

impl SuiteConfig {
    /// Returns the number of cases that create real resources.
    #[must_use]
    pub fn mutating_case_count(&self) -> usize {
        self.cases.iter().filter(|c| c.is_mutating()).count()
    }

    /// Finds a case by name.
    #[must_use]
    pub fn case(&self, name: &str) -> Option<&CaseConfig> {
        self.cases.iter().find(|c| c.name == name)
    }
}

impl CaseConfig {
    /// Returns whether the case creates real resources.
    ///
    /// Applying kinds always do; `mutating` only marks other kinds.
    #[must_use]
    pub fn is_mutating(&self) -> bool {
        self.kind.applies() || self.mutating.unwrap_or(false)
    }
}

impl CaseKind {
    /// Returns true for kinds that apply the module.
    #[must_use]
    pub const fn applies(self) -> bool {
        matches!(self, Self::Converge | Self::Diverge)
    }
}

impl std::fmt::Display for CaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Validate => "validate",
            Self::Format => "format",
            Self::Plan => "plan",
            Self::Converge => "converge",
            Self::Diverge => "diverge",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for OutputExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotEmpty => write!(f, "not empty"),
            Self::Length(n) => write!(f, "length {n}"),
            Self::Contains(s) => write!(f, "contains '{s}'"),
            Self::ContainsOutput(o) => write!(f, "contains output '{o}'"),
            Self::S3BucketExists { region } => write!(f, "S3 bucket exists in {region}"),
        }
    }
}

//! State management for the convergence harness.
//!
//! This module provides the isolated per-case state namespaces the engine
//! works in, and persistence for suite reports.

mod namespace;
mod report;
mod types;

pub use namespace::StateNamespace;
pub use report::{LocalReportStore, ReportStore};
pub use types::{CaseReport, CaseStatus, PendingChanges, SuiteReport, REPORT_VERSION};

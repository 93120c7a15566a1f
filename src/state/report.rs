//! Report storage.
//!
//! The last suite report is kept as JSON next to the case namespaces so a
//! failing run can be inspected after the fact.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ConvergeError, ReportError, Result};

use super::types::SuiteReport;

/// Report file name.
const REPORT_FILE: &str = "last-report.json";

/// Trait for report storage backends.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Loads the last report.
    ///
    /// Returns `None` if no report exists yet.
    async fn load(&self) -> Result<Option<SuiteReport>>;

    /// Saves a report, replacing the previous one.
    async fn save(&self, report: &SuiteReport) -> Result<()>;

    /// Deletes the stored report.
    async fn delete(&self) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

/// File-based report store.
#[derive(Debug)]
pub struct LocalReportStore {
    /// Base directory for the report file.
    base_dir: PathBuf,
    /// Path to the report file.
    report_path: PathBuf,
}

impl LocalReportStore {
    /// Creates a report store in the given directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let report_path = base_dir.join(REPORT_FILE);
        Self {
            base_dir,
            report_path,
        }
    }

    /// Path to the report file.
    #[must_use]
    pub const fn report_path(&self) -> &PathBuf {
        &self.report_path
    }

    /// Ensures the report directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating report directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await.map_err(|e| {
                ConvergeError::Report(ReportError::WriteFailed {
                    message: format!("Failed to create report directory: {e}"),
                })
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReportStore for LocalReportStore {
    async fn load(&self) -> Result<Option<SuiteReport>> {
        if !self.report_path.exists() {
            debug!("Report file does not exist: {}", self.report_path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.report_path).await.map_err(|e| {
            ConvergeError::Report(ReportError::Corrupted {
                message: format!("Failed to read report file: {e}"),
            })
        })?;

        let report: SuiteReport = serde_json::from_str(&content).map_err(|e| {
            ConvergeError::Report(ReportError::Corrupted {
                message: format!("Failed to parse report file: {e}"),
            })
        })?;

        Ok(Some(report))
    }

    async fn save(&self, report: &SuiteReport) -> Result<()> {
        self.ensure_dir().await?;

        info!("Saving report to: {}", self.report_path.display());

        let content = serde_json::to_string_pretty(report).map_err(|e| {
            ConvergeError::Report(ReportError::WriteFailed {
                message: format!("Failed to serialize report: {e}"),
            })
        })?;

        // Write to a temporary file first, then rename for atomicity
        let temp_path = self.report_path.with_extension("tmp");
        let write_failed = |e: std::io::Error| {
            ConvergeError::Report(ReportError::WriteFailed {
                message: e.to_string(),
            })
        };

        let mut file = fs::File::create(&temp_path).await.map_err(write_failed)?;
        file.write_all(content.as_bytes()).await.map_err(write_failed)?;
        file.sync_all().await.map_err(write_failed)?;
        fs::rename(&temp_path, &self.report_path)
            .await
            .map_err(write_failed)?;

        Ok(())
    }

    async fn delete(&self) -> Result<()> {
        if self.report_path.exists() {
            info!("Deleting report: {}", self.report_path.display());
            fs::remove_file(&self.report_path).await?;
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

//! Isolated state namespaces.
//!
//! Every case works in its own directory holding the engine's data dir,
//! local state, var files and plan files, so concurrent cases targeting the
//! same module never share mutable state.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ConvergeError, Result};

/// Local state file name.
const STATE_FILE: &str = "terraform.tfstate";

/// Engine data directory name.
const DATA_DIR: &str = ".terraform";

/// A directory owned by exactly one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateNamespace {
    /// Namespace directory.
    root: PathBuf,
    /// Namespace identifier (last path component).
    id: String,
}

impl StateNamespace {
    /// Creates a namespace rooted at an explicit directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let id = root
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        Self { root, id }
    }

    /// Allocates a fresh namespace `<work_dir>/<suite>/<case>-<uuid8>`.
    #[must_use]
    pub fn for_case(work_dir: impl AsRef<Path>, suite: &str, case: &str) -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self::new(work_dir.as_ref().join(suite).join(format!("{case}-{suffix}")))
    }

    /// Namespace directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Namespace identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of the local state file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Path of the engine's data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    /// Path of the var file for a variable-set fingerprint.
    #[must_use]
    pub fn var_file(&self, fingerprint: &str) -> PathBuf {
        self.root.join(format!("vars-{}.tfvars.json", short(fingerprint)))
    }

    /// Path of the plan file for a variable-set fingerprint.
    #[must_use]
    pub fn plan_file(&self, fingerprint: &str) -> PathBuf {
        self.root.join(format!("plan-{}.tfplan", short(fingerprint)))
    }

    /// Creates the namespace directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn ensure(&self) -> Result<()> {
        if !self.root.exists() {
            debug!("Creating namespace directory: {}", self.root.display());
            fs::create_dir_all(&self.root).await.map_err(|e| {
                ConvergeError::internal(format!(
                    "Failed to create namespace {}: {e}",
                    self.root.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Removes the namespace directory and everything in it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be removed.
    pub async fn remove(&self) -> Result<()> {
        if self.root.exists() {
            info!("Removing namespace: {}", self.root.display());
            fs::remove_dir_all(&self.root).await?;
        }
        Ok(())
    }
}

fn short(fingerprint: &str) -> String {
    fingerprint.chars().take(12).collect()
}

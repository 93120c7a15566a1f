//! Provisioning engine boundary.
//!
//! Everything the harness asks of the declarative provisioning engine goes
//! through the [`ProvisioningEngine`] trait. [`TerraformCli`] drives the real
//! CLI; tests substitute mocks or scripted fakes.

mod cli;
mod retry;

pub use cli::TerraformCli;
pub use retry::{DEFAULT_MAX_RETRIES, DEFAULT_TIME_BETWEEN_RETRIES_SECS, RetryPolicy};

use async_trait::async_trait;

use crate::config::ModuleOptions;
use crate::error::Result;
use crate::plan::PlanResult;

/// Operations the harness needs from a provisioning engine.
///
/// Every operation works inside the namespace carried by the options, so
/// implementations must not share mutable state between namespaces.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Initializes the module (providers, modules, backend).
    async fn init(&self, options: &ModuleOptions) -> Result<()>;

    /// Checks the module is syntactically and semantically valid.
    async fn validate(&self, options: &ModuleOptions) -> Result<()>;

    /// Applies the module, creating or updating real resources.
    async fn apply(&self, options: &ModuleOptions) -> Result<()>;

    /// Runs a planning pass and returns the classified plan.
    async fn plan(&self, options: &ModuleOptions) -> Result<PlanResult>;

    /// Destroys everything the module created in this namespace.
    async fn destroy(&self, options: &ModuleOptions) -> Result<()>;

    /// Reads one output of the applied module.
    async fn output(&self, options: &ModuleOptions, name: &str) -> Result<serde_json::Value>;

    /// Checks the module tree is canonically formatted.
    async fn format_check(&self, options: &ModuleOptions) -> Result<()>;

    /// Engine name used in logs.
    fn name(&self) -> &'static str;
}

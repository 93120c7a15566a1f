//! Scoped deployments.
//!
//! A [`DeploymentScope`] initializes and applies a module, runs a test body
//! against the live resources, and then destroys them. Destroy runs exactly
//! once per scope, whether the body passed, failed, or timed out.
//!
//! Init and apply are never cut short. Interrupting the engine mid-apply
//! loses the resources it created before they reach state, and destroy can
//! only remove what state records.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::ModuleOptions;
use crate::engine::{ProvisioningEngine, RetryPolicy};
use crate::error::{ConvergeError, EngineError, Result};

/// One apply/test/destroy cycle for a module.
pub struct DeploymentScope {
    engine: Arc<dyn ProvisioningEngine>,
    retry: RetryPolicy,
    options: ModuleOptions,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for DeploymentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentScope")
            .field("module", &self.options.module_ref())
            .field("namespace", &self.options.namespace().id())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DeploymentScope {
    /// Creates a scope for the given module options.
    #[must_use]
    pub fn new(
        engine: Arc<dyn ProvisioningEngine>,
        retry: RetryPolicy,
        options: ModuleOptions,
    ) -> Self {
        Self {
            engine,
            retry,
            options,
            timeout: None,
        }
    }

    /// Bounds the body by `timeout`. Init, apply and destroy are not bounded.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Options the scope deploys.
    #[must_use]
    pub const fn options(&self) -> &ModuleOptions {
        &self.options
    }

    /// Applies the module, runs `body`, then destroys the module.
    ///
    /// # Errors
    ///
    /// Returns the first failure of init, apply, or the body (or a
    /// `Timeout`). If that succeeded but destroy failed, returns the destroy
    /// error. A destroy failure that follows another failure is logged and
    /// the original error is returned.
    pub async fn run<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let module = self.options.module_ref();
        info!(
            "Deploying {module} in namespace {}",
            self.options.namespace().id()
        );

        let outcome = match self.deploy().await {
            Ok(()) => match self.timeout {
                Some(limit) => tokio::time::timeout(limit, body()).await.unwrap_or_else(|_| {
                    Err(ConvergeError::Engine(EngineError::Timeout {
                        operation: format!("checks on {module}"),
                        millis: timeout_millis(limit),
                    }))
                }),
                None => body().await,
            },
            Err(e) => Err(e),
        };

        let destroyed = self
            .retry
            .run("destroy", || self.engine.destroy(&self.options))
            .await;

        match (outcome, destroyed) {
            (Ok(value), Ok(())) => {
                info!("Destroyed {module}");
                Ok(value)
            }
            (Ok(_), Err(destroy_err)) => Err(destroy_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(destroy_err)) => {
                error!("Destroy of {module} failed after an earlier failure: {destroy_err}");
                Err(e)
            }
        }
    }

    /// Runs init and apply to completion so that state records every
    /// resource the engine created.
    async fn deploy(&self) -> Result<()> {
        self.retry
            .run("init", || self.engine.init(&self.options))
            .await?;
        self.retry
            .run("apply", || self.engine.apply(&self.options))
            .await
    }
}

/// Whole milliseconds of a time budget, saturating.
pub(crate) fn timeout_millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

//! Convergence verification.
//!
//! A module is convergent when, after it has been applied, planning it again
//! with the same configuration reports nothing to add, change, or destroy.
//! The [`ConvergenceVerifier`] runs that planning pass and turns the plan
//! into a [`ConvergenceVerdict`].

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ModuleOptions, VarMap};
use crate::engine::{ProvisioningEngine, RetryPolicy};
use crate::error::{ConvergeError, Result, VerifyError};
use crate::plan::PlanResult;

/// Outcome of a convergence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceVerdict {
    module: String,
    plan: PlanResult,
}

impl ConvergenceVerdict {
    /// Returns true if the re-plan reported no pending changes.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.plan.is_empty()
    }

    /// Resources that would be added.
    #[must_use]
    pub fn to_add(&self) -> &[String] {
        &self.plan.to_add
    }

    /// Resources that would be changed in place.
    #[must_use]
    pub fn to_change(&self) -> &[String] {
        &self.plan.to_change
    }

    /// Resources that would be destroyed.
    #[must_use]
    pub fn to_destroy(&self) -> &[String] {
        &self.plan.to_destroy
    }

    /// The plan the verdict was derived from.
    #[must_use]
    pub const fn plan(&self) -> &PlanResult {
        &self.plan
    }

    /// Converts a non-converged verdict into a `NonConvergent` error.
    ///
    /// # Errors
    ///
    /// Returns `NonConvergent` listing the offending addresses if any
    /// change is pending.
    pub fn into_result(self) -> Result<PlanResult> {
        if self.is_converged() {
            return Ok(self.plan);
        }

        Err(ConvergeError::Verify(VerifyError::NonConvergent {
            module: self.module,
            to_add: self.plan.to_add,
            to_change: self.plan.to_change,
            to_destroy: self.plan.to_destroy,
        }))
    }
}

impl std::fmt::Display for ConvergenceVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_converged() {
            write!(f, "{} converged", self.module)
        } else {
            write!(f, "{} did not converge: {}", self.module, self.plan.summary())
        }
    }
}

/// Re-plans applied modules and judges convergence.
#[derive(Clone)]
pub struct ConvergenceVerifier {
    engine: Arc<dyn ProvisioningEngine>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ConvergenceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergenceVerifier")
            .field("engine", &self.engine.name())
            .field("retry", &self.retry)
            .finish()
    }
}

impl ConvergenceVerifier {
    /// Creates a verifier over the given engine.
    #[must_use]
    pub fn new(engine: Arc<dyn ProvisioningEngine>, retry: RetryPolicy) -> Self {
        Self { engine, retry }
    }

    /// Plans the applied module with its own configuration.
    ///
    /// The module must already be initialized and applied in the options'
    /// namespace. Transient planning failures are retried per the policy;
    /// a non-empty plan is reported in the verdict, not as an error.
    ///
    /// # Errors
    ///
    /// Returns `PlanExecution` if planning fails permanently or retries run
    /// out, and `PlanParse` if the plan cannot be interpreted.
    pub async fn verify_convergence(&self, options: &ModuleOptions) -> Result<ConvergenceVerdict> {
        let module = options.module_ref();
        info!("Verifying convergence of {module}");

        let plan = self
            .retry
            .run("plan", || self.engine.plan(options))
            .await?;

        let verdict = ConvergenceVerdict { module, plan };
        if verdict.is_converged() {
            info!("{verdict}");
        } else {
            warn!("{verdict}");
        }
        Ok(verdict)
    }

    /// Like [`Self::verify_convergence`], but a pending change is an error.
    ///
    /// # Errors
    ///
    /// Returns `NonConvergent` when the re-plan is not empty, plus every
    /// error [`Self::verify_convergence`] can return.
    pub async fn ensure_converged(&self, options: &ModuleOptions) -> Result<PlanResult> {
        self.verify_convergence(options).await?.into_result()
    }

    /// Plans the applied module with `overrides` merged over its variables
    /// and checks the change is detected.
    ///
    /// # Errors
    ///
    /// Returns `UnexpectedConvergence` if the plan has no change or destroy
    /// entries, plus any planning error.
    pub async fn verify_divergence(
        &self,
        options: &ModuleOptions,
        overrides: &VarMap,
    ) -> Result<PlanResult> {
        let changed = options.with_overrides(overrides)?;
        let overridden: Vec<String> = overrides.keys().cloned().collect();
        info!(
            "Verifying divergence of {} after overriding {:?}",
            options.module_ref(),
            overridden
        );

        let plan = self
            .retry
            .run("plan", || self.engine.plan(&changed))
            .await?;

        if !plan.has_change_or_destroy() {
            return Err(ConvergeError::Verify(VerifyError::UnexpectedConvergence {
                module: options.module_ref(),
                overridden,
            }));
        }

        info!("Divergence detected: {}", plan.summary());
        Ok(plan)
    }
}

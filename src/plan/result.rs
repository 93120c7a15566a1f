//! Structured plan results.
//!
//! A [`PlanResult`] is parsed from the engine's machine-readable plan
//! (`show -json <planfile>`) and holds the three ordered sequences of
//! resource addresses the convergence verdict is derived from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::error::{EngineError, Result};

use super::action::{ChangeAction, ChangeCategory};

/// Outcome of one planning pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanResult {
    /// Resources that would be added, in plan order.
    pub to_add: Vec<String>,
    /// Resources that would be changed in place, in plan order.
    pub to_change: Vec<String>,
    /// Resources that would be destroyed, in plan order.
    pub to_destroy: Vec<String>,
    /// Output names declared by the planned configuration.
    pub outputs: Vec<String>,
    /// Plan format version reported by the engine.
    pub format_version: Option<String>,
    /// Engine version that produced the plan.
    pub engine_version: Option<String>,
}

/// Top-level JSON plan document (only the fields we use).
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    format_version: Option<String>,
    #[serde(default)]
    terraform_version: Option<String>,
    #[serde(default)]
    resource_changes: Vec<RawResourceChange>,
    #[serde(default)]
    output_changes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    planned_values: Option<RawPlannedValues>,
}

#[derive(Debug, Deserialize)]
struct RawResourceChange {
    address: String,
    #[serde(default)]
    mode: Option<String>,
    change: RawChange,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    actions: Vec<ChangeAction>,
}

#[derive(Debug, Deserialize)]
struct RawPlannedValues {
    #[serde(default)]
    outputs: BTreeMap<String, serde_json::Value>,
}

impl PlanResult {
    /// Parses the engine's JSON plan output.
    ///
    /// # Errors
    ///
    /// Returns a `PlanParse` error if the document is not valid JSON, uses
    /// an unknown action, or combines actions in an unsupported way.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawPlan = serde_json::from_str(json)
            .map_err(|e| EngineError::plan_parse(format!("invalid plan JSON: {e}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawPlan) -> Result<Self> {
        let mut result = Self {
            format_version: raw.format_version,
            engine_version: raw.terraform_version,
            ..Self::default()
        };

        for change in raw.resource_changes {
            if change.mode.as_deref() == Some("data") {
                trace!("Skipping data source {}", change.address);
                continue;
            }

            let category = ChangeCategory::classify(&change.change.actions).ok_or_else(|| {
                let actions: Vec<String> =
                    change.change.actions.iter().map(ToString::to_string).collect();
                EngineError::plan_parse(format!(
                    "unsupported action combination {actions:?} for {}",
                    change.address
                ))
            })?;

            match category {
                ChangeCategory::None => {}
                ChangeCategory::Change => result.to_change.push(change.address),
                _ => {
                    if category.adds() {
                        result.to_add.push(change.address.clone());
                    }
                    if category.destroys() {
                        result.to_destroy.push(change.address);
                    }
                }
            }
        }

        let mut outputs: Vec<String> = raw.output_changes.into_keys().collect();
        if let Some(planned) = raw.planned_values {
            for name in planned.outputs.into_keys() {
                if !outputs.contains(&name) {
                    outputs.push(name);
                }
            }
        }
        outputs.sort();
        result.outputs = outputs;

        debug!("Parsed plan: {}", result.summary());
        Ok(result)
    }

    /// Returns true if no resource change is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_change.is_empty() && self.to_destroy.is_empty()
    }

    /// Returns true if the plan changes or destroys anything.
    #[must_use]
    pub fn has_change_or_destroy(&self) -> bool {
        !self.to_change.is_empty() || !self.to_destroy.is_empty()
    }

    /// Returns true if the plan declares the named output.
    #[must_use]
    pub fn declares_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o == name)
    }

    /// One-line summary in the engine's own wording.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Plan: {} to add, {} to change, {} to destroy.",
            self.to_add.len(),
            self.to_change.len(),
            self.to_destroy.len()
        )
    }
}

impl std::fmt::Display for PlanResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes. Infrastructure matches the configuration.");
        }

        writeln!(f, "{}", self.summary())?;
        for address in &self.to_add {
            writeln!(f, "  + {address}")?;
        }
        for address in &self.to_change {
            writeln!(f, "  ~ {address}")?;
        }
        for address in &self.to_destroy {
            writeln!(f, "  - {address}")?;
        }
        Ok(())
    }
}

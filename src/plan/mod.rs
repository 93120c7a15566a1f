//! Plan parsing and classification.
//!
//! This module turns the engine's machine-readable plan into a
//! [`PlanResult`] with ordered add/change/destroy sequences.

mod action;
mod result;

pub use action::{ChangeAction, ChangeCategory};
pub use result::PlanResult;

use crate::state::PendingChanges;

impl PlanResult {
    /// Converts the pending resource changes into a report entry.
    #[must_use]
    pub fn pending(&self) -> PendingChanges {
        PendingChanges {
            to_add: self.to_add.clone(),
            to_change: self.to_change.clone(),
            to_destroy: self.to_destroy.clone(),
        }
    }
}

//! Configuration fingerprints.
//!
//! Deterministic hashes of variable sets name the var and plan files written
//! into a namespace, so a base configuration and its overridden variant never
//! overwrite each other.

use sha2::{Digest, Sha256};

use super::spec::VarMap;

/// Hasher for computing configuration fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of a variable set.
    ///
    /// Keys are visited in sorted order and values are hashed in their
    /// compact JSON form, so equal maps always hash equally.
    #[must_use]
    pub fn hash_vars(&self, vars: &VarMap) -> String {
        let mut hasher = Sha256::new();

        for (key, value) in vars {
            hasher.update(key.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.to_string().as_bytes());
            hasher.update([0u8]);
        }

        hex::encode(hasher.finalize())
    }

    /// Computes a hash of a module directory together with its variables.
    #[must_use]
    pub fn hash_module(&self, module_dir: &str, vars: &VarMap) -> String {
        let mut hasher = Sha256::new();
        hasher.update(module_dir.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.hash_vars(vars).as_bytes());
        hex::encode(hasher.finalize())
    }
}

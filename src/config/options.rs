//! Immutable module options.
//!
//! A [`ModuleOptions`] value fully describes one invocation target: the
//! module directory, its input variables, backend settings, and the isolated
//! state namespace the engine works in. Values are produced by
//! [`ModuleOptionsBuilder`] or [`OptionsFactory`] and never mutated;
//! variations are derived as new values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::error::{ConfigError, ConvergeError, Result};
use crate::state::StateNamespace;

use super::hash::ConfigHasher;
use super::spec::{CaseConfig, EngineSettings, VarMap};

/// Fully-resolved, immutable options for one module target.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOptions {
    module_dir: PathBuf,
    vars: VarMap,
    backend_config: BTreeMap<String, String>,
    namespace: StateNamespace,
    no_color: bool,
    fingerprint: String,
}

/// Builder for [`ModuleOptions`].
#[derive(Debug, Clone)]
pub struct ModuleOptionsBuilder {
    module_dir: PathBuf,
    vars: VarMap,
    backend_config: BTreeMap<String, String>,
    namespace: Option<StateNamespace>,
    no_color: bool,
}

impl ModuleOptions {
    /// Starts building options for the given module directory.
    #[must_use]
    pub fn builder(module_dir: impl Into<PathBuf>) -> ModuleOptionsBuilder {
        ModuleOptionsBuilder {
            module_dir: module_dir.into(),
            vars: VarMap::new(),
            backend_config: BTreeMap::new(),
            namespace: None,
            no_color: true,
        }
    }

    /// Module directory.
    #[must_use]
    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// Human-readable module reference used in logs and errors.
    #[must_use]
    pub fn module_ref(&self) -> String {
        self.module_dir.display().to_string()
    }

    /// Input variables.
    #[must_use]
    pub const fn vars(&self) -> &VarMap {
        &self.vars
    }

    /// Backend configuration passed on init.
    #[must_use]
    pub const fn backend_config(&self) -> &BTreeMap<String, String> {
        &self.backend_config
    }

    /// Isolated state namespace.
    #[must_use]
    pub const fn namespace(&self) -> &StateNamespace {
        &self.namespace
    }

    /// Whether colour output is disabled.
    #[must_use]
    pub const fn no_color(&self) -> bool {
        self.no_color
    }

    /// Fingerprint of the module directory and variables.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns new options with `overrides` merged over the variables.
    ///
    /// The namespace is shared, so the derived options plan against the same
    /// applied state.
    ///
    /// # Errors
    ///
    /// Returns a validation error if an override key is not a valid
    /// variable name.
    pub fn with_overrides(&self, overrides: &VarMap) -> Result<Self> {
        let mut vars = self.vars.clone();
        for (key, value) in overrides {
            vars.insert(key.clone(), value.clone());
        }

        Self::builder(self.module_dir.clone())
            .vars(vars)
            .backend_config(self.backend_config.clone())
            .namespace(self.namespace.clone())
            .no_color(self.no_color)
            .build()
    }
}

impl ModuleOptionsBuilder {
    /// Sets one variable.
    #[must_use]
    pub fn var(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Replaces all variables.
    #[must_use]
    pub fn vars(mut self, vars: VarMap) -> Self {
        self.vars = vars;
        self
    }

    /// Sets one backend configuration entry.
    #[must_use]
    pub fn backend(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.backend_config.insert(key.into(), value.into());
        self
    }

    /// Replaces the backend configuration.
    #[must_use]
    pub fn backend_config(mut self, backend_config: BTreeMap<String, String>) -> Self {
        self.backend_config = backend_config;
        self
    }

    /// Sets the state namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: StateNamespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    /// Sets whether colour output is disabled.
    #[must_use]
    pub const fn no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Validates and builds the options.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty module directory, a missing
    /// namespace, or malformed variable/backend keys.
    pub fn build(self) -> Result<ModuleOptions> {
        if self.module_dir.as_os_str().is_empty() {
            return Err(ConvergeError::Config(ConfigError::validation(
                "Module directory cannot be empty",
                "module",
            )));
        }

        for name in self.vars.keys() {
            if !is_valid_identifier(name) {
                return Err(ConvergeError::Config(ConfigError::validation(
                    format!("'{name}' is not a valid variable name"),
                    format!("vars.{name}"),
                )));
            }
        }

        for key in self.backend_config.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(ConvergeError::Config(ConfigError::validation(
                    format!("'{key}' is not a valid backend configuration key"),
                    format!("backend_config.{key}"),
                )));
            }
        }

        let namespace = self.namespace.ok_or_else(|| {
            ConvergeError::Config(ConfigError::validation(
                "A state namespace is required",
                "namespace",
            ))
        })?;

        let fingerprint =
            ConfigHasher::new().hash_module(&self.module_dir.display().to_string(), &self.vars);

        Ok(ModuleOptions {
            module_dir: self.module_dir,
            vars: self.vars,
            backend_config: self.backend_config,
            namespace,
            no_color: self.no_color,
            fingerprint,
        })
    }
}

/// Produces per-case options from shared suite settings.
#[derive(Debug, Clone)]
pub struct OptionsFactory {
    suite: String,
    engine: EngineSettings,
}

impl OptionsFactory {
    /// Creates a factory for the given suite.
    #[must_use]
    pub fn new(suite: impl Into<String>, engine: &EngineSettings) -> Self {
        Self {
            suite: suite.into(),
            engine: engine.clone(),
        }
    }

    /// Allocates a fresh namespace for a case.
    #[must_use]
    pub fn namespace_for(&self, case_name: &str) -> StateNamespace {
        StateNamespace::for_case(&self.engine.work_dir, &self.suite, case_name)
    }

    /// Builds options for a case, injecting a unique id if requested.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the case's variables are malformed.
    pub fn for_case(&self, case: &CaseConfig) -> Result<ModuleOptions> {
        let mut vars = case.vars.clone();

        if let Some(var) = &case.unique_id_var {
            let id = generate_unique_id();
            debug!("Case {} uses unique {} = {}", case.name, var, id);
            vars.insert(var.clone(), serde_json::Value::String(id));
        }

        ModuleOptions::builder(&case.module)
            .vars(vars)
            .backend_config(case.backend_config.clone())
            .namespace(self.namespace_for(&case.name))
            .no_color(self.engine.no_color)
            .build()
    }
}

/// Generates a short unique identifier such as `test-1a2b3c4d`.
#[must_use]
pub fn generate_unique_id() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("test-{suffix}")
}

/// Checks that a variable name is a valid identifier.
fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::CaseKind;
    use serde_json::json;

    fn namespace() -> StateNamespace {
        StateNamespace::new("/tmp/converge/network-1")
    }

    #[test]
    fn test_builder_produces_options() {
        let options = ModuleOptions::builder("modules/network")
            .var("environment", "test")
            .var("availability_zones", json!(["a", "c"]))
            .backend("path", "state.tfstate")
            .namespace(namespace())
            .build()
            .unwrap();

        assert_eq!(options.module_ref(), "modules/network");
        assert_eq!(options.vars()["availability_zones"], json!(["a", "c"]));
        assert_eq!(options.backend_config()["path"], "state.tfstate");
        assert!(options.no_color());
        assert_eq!(options.fingerprint().len(), 64);
    }

    #[test]
    fn test_invalid_variable_name_rejected() {
        let result = ModuleOptions::builder("modules/network")
            .var("1bad name", "x")
            .namespace(namespace())
            .build();
        assert!(matches!(
            result,
            Err(ConvergeError::Config(ConfigError::ValidationError { .. }))
        ));
    }

    #[test]
    fn test_missing_namespace_rejected() {
        let result = ModuleOptions::builder("modules/network").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_produce_new_value() {
        let base = ModuleOptions::builder("modules/storage")
            .var("region", "ap-northeast-2")
            .var("environment", "test")
            .namespace(namespace())
            .build()
            .unwrap();

        let mut overrides = VarMap::new();
        overrides.insert(String::from("region"), json!("us-east-1"));
        let changed = base.with_overrides(&overrides).unwrap();

        assert_eq!(base.vars()["region"], json!("ap-northeast-2"));
        assert_eq!(changed.vars()["region"], json!("us-east-1"));
        assert_eq!(changed.vars()["environment"], json!("test"));
        assert_eq!(changed.namespace(), base.namespace());
        assert_ne!(changed.fingerprint(), base.fingerprint());
    }

    #[test]
    fn test_factory_injects_unique_id() {
        let factory = OptionsFactory::new("infra", &EngineSettings::default());
        let case = CaseConfig {
            name: String::from("complete"),
            kind: CaseKind::Converge,
            module: String::from("terraform"),
            vars: VarMap::new(),
            backend_config: BTreeMap::new(),
            overrides: VarMap::new(),
            outputs: vec![],
            required_outputs: vec![],
            mutating: None,
            unique_id_var: Some(String::from("project_name")),
            timeout_secs: None,
        };

        let first = factory.for_case(&case).unwrap();
        let second = factory.for_case(&case).unwrap();

        let id = first.vars()["project_name"].as_str().unwrap();
        assert!(id.starts_with("test-"));
        assert_eq!(id.len(), 13);
        assert_ne!(first.vars()["project_name"], second.vars()["project_name"]);
        assert_ne!(first.namespace(), second.namespace());
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_valid_identifier("vpc_cidr"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("with-dash"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("9lives"));
        assert!(!is_valid_identifier("has space"));
    }
}

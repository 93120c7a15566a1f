//! Suite file parser.
//!
//! This module handles loading the suite from YAML and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, ConvergeError, Result};
use std::path::Path;
use tracing::{debug, info};

use super::spec::SuiteConfig;

/// Parser for loading suite configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads the suite from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<SuiteConfig> {
        let path = path.as_ref();
        info!("Loading suite from: {}", path.display());

        if !path.exists() {
            return Err(ConvergeError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvergeError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses the suite from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<SuiteConfig> {
        debug!("Parsing YAML suite");

        let mut config: SuiteConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ConvergeError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        if let Some(base) = &self.base_path {
            Self::resolve_module_paths(&mut config, base);
        }

        debug!(
            "Parsed suite '{}' with {} case(s)",
            config.suite.name,
            config.cases.len()
        );
        Ok(config)
    }

    /// Loads the suite with environment variable overrides.
    ///
    /// Recognised variables: `CONVERGE_ENGINE_BINARY`, `CONVERGE_WORK_DIR`,
    /// `CONVERGE_PARALLELISM`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// is malformed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<SuiteConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if `CONVERGE_PARALLELISM` is not a positive integer.
    pub fn apply_overrides(
        config: &mut SuiteConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(binary) = lookup("CONVERGE_ENGINE_BINARY") {
            debug!("Overriding engine.binary from environment");
            config.engine.binary = binary;
        }

        if let Some(work_dir) = lookup("CONVERGE_WORK_DIR") {
            debug!("Overriding engine.work_dir from environment");
            config.engine.work_dir = work_dir;
        }

        if let Some(raw) = lookup("CONVERGE_PARALLELISM") {
            let parallelism = raw.trim().parse::<usize>().ok().filter(|n| *n > 0).ok_or_else(|| {
                ConvergeError::Config(ConfigError::InvalidEnvVar {
                    name: String::from("CONVERGE_PARALLELISM"),
                    message: format!("expected a positive integer, got '{raw}'"),
                })
            })?;
            debug!("Overriding parallelism from environment");
            config.parallelism = parallelism;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ConvergeError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Makes relative module and work directories absolute against `base`.
    fn resolve_module_paths(config: &mut SuiteConfig, base: &Path) {
        for case in &mut config.cases {
            let module = Path::new(&case.module);
            if module.is_relative() {
                case.module = base.join(module).display().to_string();
            }
        }

        let work_dir = Path::new(&config.engine.work_dir);
        if work_dir.is_relative() {
            config.engine.work_dir = base.join(work_dir).display().to_string();
        }
    }
}

/// Default suite file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["converge.yaml", "converge.yml"];

/// Finds the suite file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no suite file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found suite file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConvergeError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

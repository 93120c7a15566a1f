//! Configuration module for the convergence harness.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `converge.yaml`
//! - Validation of suites before any engine command runs
//! - Building immutable per-case module options
//! - Fingerprinting variable sets

mod spec;
mod parser;
mod validator;
mod hash;
mod options;

pub use spec::{
    CaseConfig, CaseKind, EngineSettings, OutputCheck, OutputExpectation, RetrySettings,
    SuiteConfig, SuiteMeta, VarMap,
};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use validator::{ConfigValidator, ValidationResult};
pub use hash::ConfigHasher;
pub use options::{ModuleOptions, ModuleOptionsBuilder, OptionsFactory, generate_unique_id};

// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Convergence Harness
//!
//! Idempotence tests for declarative infrastructure modules.
//!
//! ## Overview
//!
//! A module is convergent when applying it and then planning it again with
//! the same inputs reports nothing to add, change, or destroy. This crate
//! lets you:
//!
//! - Describe test cases for your modules in a YAML suite file
//! - Apply each module in an isolated state namespace and destroy it after
//! - Check outputs of the applied module (values, ARNs, S3 buckets)
//! - Verify the re-plan is empty, and that a changed input is detected
//!
//! ## Architecture
//!
//! 1. **Suite**: Defined in `converge.yaml`
//! 2. **Engine**: The provisioning CLI, driven through [`engine::ProvisioningEngine`]
//! 3. **Verifier**: Re-plans applied modules and judges convergence
//!
//! ## Modules
//!
//! - [`config`]: Suite parsing, validation, and module options
//! - [`engine`]: Engine boundary, CLI driver, and retry policy
//! - [`plan`]: Structured plan parsing and classification
//! - [`verifier`]: Convergence and divergence verification
//! - [`harness`]: Scoped apply/test/destroy cycles
//! - [`assertions`]: Output expectations
//! - [`runner`]: Concurrent suite execution
//! - [`state`]: Namespaces and suite reports
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! suite:
//!   name: infra
//!
//! cases:
//!   - name: network-converge
//!     kind: converge
//!     module: terraform/modules/network
//!     vars:
//!       vpc_cidr: "10.99.0.0/16"
//!       availability_zones: ["ap-northeast-2a", "ap-northeast-2c"]
//!     outputs:
//!       - name: public_subnet_ids
//!         expect:
//!           length: 2
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod assertions;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod harness;
pub mod plan;
pub mod runner;
pub mod state;
pub mod verifier;

// ============================================================================
// Re-exports
// ============================================================================

pub use assertions::{BucketProbe, OutputAsserter, S3BucketProbe};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, ModuleOptions, SuiteConfig};
pub use engine::{ProvisioningEngine, RetryPolicy, TerraformCli};
pub use error::{ConvergeError, Result};
pub use harness::DeploymentScope;
pub use plan::PlanResult;
pub use runner::{RunOptions, SuiteRunner};
pub use state::{LocalReportStore, ReportStore, StateNamespace, SuiteReport};
pub use verifier::{ConvergenceVerdict, ConvergenceVerifier};

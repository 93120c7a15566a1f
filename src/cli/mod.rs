//! CLI module for the convergence harness.
//!
//! This module provides the command-line interface for running suites and
//! checking single modules.

mod commands;
mod output;
mod vars;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
pub use vars::{load_var_file, parse_var_assignments};

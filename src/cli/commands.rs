//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Converge - convergence tests for declarative infrastructure modules.
#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the suite file.
    #[arg(short, long, global = true, env = "CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter suite file.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the suite file.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Run the suite.
    Run {
        /// Skip cases that create real resources.
        #[arg(short, long)]
        short: bool,

        /// Only run cases whose name contains this substring.
        #[arg(short, long)]
        filter: Option<String>,

        /// Maximum number of cases running at once.
        #[arg(short, long)]
        parallelism: Option<usize>,

        /// Keep case namespaces after the run.
        #[arg(long)]
        keep_work_dir: bool,
    },

    /// Verify an already-applied module converges.
    Verify {
        /// Module directory.
        module: PathBuf,

        /// Directory holding the applied state and engine data.
        #[arg(long)]
        state_dir: PathBuf,

        /// Input variable as key=value (repeatable).
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// JSON file of input variables.
        #[arg(long)]
        var_file: Option<PathBuf>,
    },

    /// Initialize and plan a module, then print the classified plan.
    Plan {
        /// Module directory.
        module: PathBuf,

        /// Input variable as key=value (repeatable).
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },

    /// Show the last suite report.
    Report,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

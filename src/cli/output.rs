//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use std::time::Duration;
use tabled::{Table, Tabled};

use crate::config::{SuiteConfig, ValidationResult};
use crate::plan::PlanResult;
use crate::state::{CaseStatus, SuiteReport};
use crate::verifier::ConvergenceVerdict;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Resource change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
}

/// Case row for table display.
#[derive(Tabled)]
struct CaseRow {
    #[tabled(rename = "Case")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a classified plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &PlanResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &PlanResult) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes. Infrastructure matches the configuration.\n",
                "✓".green()
            );
        }

        let rows: Vec<ChangeRow> = plan
            .to_add
            .iter()
            .map(|r| ChangeRow {
                action: "+add".green().to_string(),
                resource: r.clone(),
            })
            .chain(plan.to_change.iter().map(|r| ChangeRow {
                action: "~change".yellow().to_string(),
                resource: r.clone(),
            }))
            .chain(plan.to_destroy.iter().map(|r| ChangeRow {
                action: "-destroy".red().to_string(),
                resource: r.clone(),
            }))
            .collect();

        let mut output = String::new();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = writeln!(
            output,
            "\nPlan: {} to add, {} to change, {} to destroy.",
            plan.to_add.len().to_string().green(),
            plan.to_change.len().to_string().yellow(),
            plan.to_destroy.len().to_string().red()
        );

        output
    }

    /// Formats a convergence verdict.
    #[must_use]
    pub fn format_verdict(&self, verdict: &ConvergenceVerdict) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "converged": verdict.is_converged(),
                    "to_add": verdict.to_add(),
                    "to_change": verdict.to_change(),
                    "to_destroy": verdict.to_destroy(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                if verdict.is_converged() {
                    format!("{} {verdict}\n", "✓".green())
                } else {
                    let mut output = format!("{} {verdict}\n\n", "✗".red());
                    output.push_str(&Self::format_plan_text(verdict.plan()));
                    output
                }
            }
        }
    }

    /// Formats a suite report.
    #[must_use]
    pub fn format_report(&self, report: &SuiteReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats a report as text.
    fn format_report_text(report: &SuiteReport) -> String {
        let mut output = String::new();

        let _ = write!(
            output,
            "\nSuite: {} (host {}, started {})\n\n",
            report.suite,
            report.host,
            report.started_at.format("%Y-%m-%d %H:%M:%S")
        );

        if report.cases.is_empty() {
            output.push_str("   No cases ran.\n");
            return output;
        }

        let rows: Vec<CaseRow> = report
            .cases
            .iter()
            .map(|c| CaseRow {
                name: c.name.clone(),
                kind: c.kind.to_string(),
                status: Self::format_status(c.status),
                duration: format!("{:.1}s", Duration::from_millis(c.duration_ms).as_secs_f64()),
                detail: Self::truncate(
                    c.error
                        .as_deref()
                        .or(c.plan_summary.as_deref())
                        .unwrap_or(""),
                    60,
                ),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        for case in &report.cases {
            if let Some(pending) = &case.pending {
                let _ = writeln!(output, "\n{} {} did not converge:", "✗".red(), case.name);
                for address in &pending.to_add {
                    let _ = writeln!(output, "   + {address}");
                }
                for address in &pending.to_change {
                    let _ = writeln!(output, "   ~ {address}");
                }
                for address in &pending.to_destroy {
                    let _ = writeln!(output, "   - {address}");
                }
            }
        }

        let summary = if report.success() {
            "PASS".green().to_string()
        } else {
            "FAIL".red().to_string()
        };
        let _ = write!(
            output,
            "\n{summary}: {} passed, {} failed, {} skipped\n",
            report.passed(),
            report.failed(),
            report.skipped()
        );

        output
    }

    /// Formats a validation result together with a suite summary.
    #[must_use]
    pub fn format_validation(
        &self,
        config: &SuiteConfig,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "suite": config.suite.name,
                    "cases": config.cases.len(),
                    "mutating_cases": config.mutating_case_count(),
                    "errors": result
                        .errors
                        .iter()
                        .map(|e| format!("{}: {}", e.field, e.message))
                        .collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Suite is valid!", "✓".green());
                } else {
                    let _ = writeln!(output, "{} Suite is invalid:", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {}: {}", error.field, error.message);
                    }
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let _ = writeln!(output, "\nSuite summary:");
                let _ = writeln!(output, "   Suite: {}", config.suite.name);
                let _ = writeln!(output, "   Engine: {}", config.engine.binary);
                let _ = writeln!(output, "   Cases: {}", config.cases.len());
                let _ = writeln!(output, "   Mutating cases: {}", config.mutating_case_count());
                let _ = writeln!(output, "   Parallelism: {}", config.parallelism);
                output
            }
        }
    }

    /// Formats a one-line message.
    #[must_use]
    pub fn format_message(&self, status: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => match status {
                "success" => format!("{} {message}", "✓".green()),
                "error" => format!("{} {message}", "✗".red()),
                _ => format!("{} {message}", "⚠".yellow()),
            },
        }
    }

    /// Formats a case status with color.
    fn format_status(status: CaseStatus) -> String {
        match status {
            CaseStatus::Passed => "passed".green().to_string(),
            CaseStatus::Failed => "failed".red().to_string(),
            CaseStatus::Skipped => "skipped".dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

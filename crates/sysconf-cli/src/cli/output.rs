//! Output formatting for the `sysconf` CLI
//!
//! Every report renders as JSON, YAML, or a colored table.

use std::io::{self, Write};

use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use sysconf_core::optimizer::DimensionAnalysis;
use sysconf_core::validation::{Severity, ValidationEntry};
use sysconf_core::{
    ChangeOperation, ConfigurationBackup, ConfigurationChange, OptimizationReport, Priority,
    ValidationResult,
};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table with colors
    #[default]
    Table,
    Json,
    Yaml,
}

/// Print `value` as JSON or YAML; returns false for [`OutputFormat::Table`]
pub fn print_structured<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<bool> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
        OutputFormat::Table => return Ok(false),
    }
    Ok(true)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutput {
    pub valid: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub suggestion_count: usize,
    pub findings: Vec<FindingOutput>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingOutput {
    pub severity: String,
    pub code: String,
    pub message: String,
    pub path: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl FindingOutput {
    fn from_entry(entry: &ValidationEntry) -> Self {
        Self {
            severity: entry.severity.to_string(),
            code: entry.code.clone(),
            message: entry.message.clone(),
            path: entry.path.clone(),
            suggestions: entry.suggestions.clone(),
        }
    }
}

impl ValidationOutput {
    pub fn from_result(result: &ValidationResult) -> Self {
        let error_count = result.errors.len();
        let warning_count = result.warnings.len();

        let summary = if result.is_valid && warning_count == 0 {
            "Configuration is valid".to_string()
        } else if result.is_valid {
            format!("Configuration is valid with {} warning(s)", warning_count)
        } else {
            format!(
                "Configuration has {} error(s) and {} warning(s)",
                error_count, warning_count
            )
        };

        Self {
            valid: result.is_valid,
            error_count,
            warning_count,
            suggestion_count: result.suggestions.len(),
            findings: result.entries().map(FindingOutput::from_entry).collect(),
            summary,
        }
    }

    pub fn render(&self, format: OutputFormat) -> anyhow::Result<()> {
        if !print_structured(self, format)? {
            self.render_table();
        }
        Ok(())
    }

    fn render_table(&self) {
        let mut stdout = io::stdout();

        writeln!(stdout).ok();
        writeln!(stdout, "{}", "Validation Results".cyan().bold()).ok();
        writeln!(stdout, "{}", "=".repeat(60)).ok();
        writeln!(stdout).ok();

        let status = if self.valid { "+".green() } else { "x".red() };
        writeln!(stdout, "{} {}", status, self.summary).ok();
        writeln!(stdout).ok();

        if self.findings.is_empty() {
            return;
        }

        writeln!(stdout, "{}", "Findings:".cyan().bold()).ok();
        writeln!(stdout, "{}", "-".repeat(60)).ok();
        for finding in &self.findings {
            let marker = match finding.severity.as_str() {
                "error" => "x".red(),
                "warning" => "!".yellow(),
                _ => "i".blue(),
            };
            writeln!(
                stdout,
                "{} [{}] {}",
                marker,
                finding.code.bold(),
                finding.path.dimmed()
            )
            .ok();
            writeln!(stdout, "    {}", finding.message).ok();
            for suggestion in &finding.suggestions {
                writeln!(stdout, "    {} {}", "->".blue(), suggestion).ok();
            }
        }
    }
}

/// Whether the result counts as failing once `strict` promotes warnings
pub fn has_blocking(result: &ValidationResult, strict: bool) -> bool {
    !result.is_valid || (strict && result.entries().any(|e| e.severity == Severity::Warning))
}

pub fn render_changes(changes: &[ConfigurationChange], format: OutputFormat) -> anyhow::Result<()> {
    if print_structured(&changes, format)? {
        return Ok(());
    }
    if changes.is_empty() {
        println!("{}", "No differences".green());
        return Ok(());
    }
    let (added, updated, deleted) = sysconf_core::diff::summarize(changes);
    for change in changes {
        let line = change.to_string();
        let colored = match change.operation {
            ChangeOperation::Add => line.green(),
            ChangeOperation::Delete => line.red(),
            ChangeOperation::Update => line.yellow(),
        };
        println!("{}", colored);
    }
    println!();
    println!(
        "{} added, {} updated, {} deleted",
        added.to_string().green(),
        updated.to_string().yellow(),
        deleted.to_string().red()
    );
    Ok(())
}

fn score_colored(score: u32) -> colored::ColoredString {
    let text = score.to_string();
    match score {
        80..=u32::MAX => text.green(),
        50..=79 => text.yellow(),
        _ => text.red(),
    }
}

fn priority_colored(priority: Priority) -> colored::ColoredString {
    let text = priority.to_string().to_uppercase();
    match priority {
        Priority::Critical => text.red().bold(),
        Priority::High => text.red(),
        Priority::Medium => text.yellow(),
        Priority::Low => text.blue(),
    }
}

pub fn render_report(report: &OptimizationReport, format: OutputFormat) -> anyhow::Result<()> {
    if print_structured(report, format)? {
        return Ok(());
    }
    let mut stdout = io::stdout();
    let summary = &report.summary;

    writeln!(
        stdout,
        "{}",
        format!("Optimization Report ({})", report.environment).cyan().bold()
    )
    .ok();
    writeln!(stdout, "{}", "=".repeat(60)).ok();
    writeln!(stdout, "Overall score: {:.1}", summary.overall_score).ok();
    let dimensions: [&DimensionAnalysis; 4] = [
        &report.performance,
        &report.security,
        &report.maintenance,
        &report.cost,
    ];
    for analysis in dimensions {
        writeln!(
            stdout,
            "  {:<12} {}",
            analysis.dimension.to_string(),
            score_colored(analysis.score)
        )
        .ok();
    }
    writeln!(stdout).ok();

    if report.recommendations.is_empty() {
        writeln!(stdout, "{}", "No recommendations".green()).ok();
        return Ok(());
    }

    writeln!(stdout, "{}", "Recommendations:".cyan().bold()).ok();
    writeln!(stdout, "{}", "-".repeat(60)).ok();
    for rec in &report.recommendations {
        writeln!(
            stdout,
            "{:<10} {} {}",
            priority_colored(rec.priority),
            rec.title.bold(),
            rec.path.dimmed()
        )
        .ok();
        writeln!(stdout, "           {}", rec.description).ok();
        if let Some(suggested) = &rec.suggested_value {
            writeln!(stdout, "           {} {}", "->".blue(), suggested.to_json_string()).ok();
        }
    }
    writeln!(stdout).ok();
    writeln!(
        stdout,
        "{} critical, {} high, {} medium, {} low; about {}h of work",
        summary.critical, summary.high, summary.medium, summary.low, summary.estimated_effort_hours
    )
    .ok();
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupRow<'a> {
    id: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    backup_type: String,
    created_by: &'a str,
    created_at: String,
    size: usize,
    compressed: bool,
    tags: &'a [String],
}

pub fn render_backups(backups: &[ConfigurationBackup], format: OutputFormat) -> anyhow::Result<()> {
    let rows: Vec<BackupRow<'_>> = backups
        .iter()
        .map(|b| BackupRow {
            id: &b.id,
            name: &b.name,
            backup_type: b.backup_type.to_string(),
            created_by: &b.created_by,
            created_at: b.created_at.to_rfc3339(),
            size: b.size,
            compressed: b.compressed,
            tags: &b.tags,
        })
        .collect();
    if print_structured(&rows, format)? {
        return Ok(());
    }
    if rows.is_empty() {
        println!("{}", "No backups".dimmed());
        return Ok(());
    }
    println!(
        "{}",
        format!("{:<36}  {:<11}  {:<10}  {:>8}  {}", "ID", "TYPE", "BY", "BYTES", "CREATED")
            .cyan()
            .bold()
    );
    for row in rows {
        println!(
            "{:<36}  {:<11}  {:<10}  {:>8}  {}{}",
            row.id,
            row.backup_type,
            row.created_by,
            row.size,
            row.created_at,
            if row.compressed { " (gz)" } else { "" }
        );
    }
    Ok(())
}

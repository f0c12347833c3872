//! Aggregate-report rendering: human table or JSON for automation.

use anyhow::{Context, Result};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use pet_core::types::{BackendReport, SyncOutcome};
use pet_core::AggregateReport;

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "backend")]
    backend: String,
    #[tabled(rename = "ref")]
    ref_name: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

/// Print the full per-backend, per-ref outcome table (or JSON).
/// Every individual failure gets its own row; nothing is summarized away.
pub fn print(report: &AggregateReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).context("failed to serialize report")?
        );
        return Ok(());
    }

    let mut rows = Vec::new();
    for backend in &report.backends {
        match backend {
            BackendReport::Completed { backend, results } => {
                if results.is_empty() {
                    rows.push(ReportRow {
                        backend: backend.0.clone(),
                        ref_name: "-".to_owned(),
                        status: "up-to-date".green().to_string(),
                        detail: "no refs to sync".to_owned(),
                    });
                }
                for r in results {
                    rows.push(ReportRow {
                        backend: backend.0.clone(),
                        ref_name: r.ref_name.0.clone(),
                        status: colored_status(&r.outcome),
                        detail: outcome_detail(&r.outcome),
                    });
                }
            }
            BackendReport::Unreachable { backend, error } => {
                rows.push(ReportRow {
                    backend: backend.0.clone(),
                    ref_name: "-".to_owned(),
                    status: "unreachable".red().bold().to_string(),
                    detail: error.clone(),
                });
            }
        }
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if report.overall_ok() {
        println!("{}", "All backends in sync.".green());
    } else if report.any_unreachable() {
        println!("{}", "One or more backends were unreachable.".red());
    } else {
        println!("{}", "One or more syncs failed.".red());
    }
    Ok(())
}

fn colored_status(outcome: &SyncOutcome) -> String {
    let label = outcome.label();
    match outcome {
        SyncOutcome::Created | SyncOutcome::Updated { .. } | SyncOutcome::UpToDate => {
            label.green().to_string()
        }
        SyncOutcome::Skipped { .. } => label.yellow().to_string(),
        SyncOutcome::SyncFailed { .. } | SyncOutcome::DependencyFailed { .. } => {
            label.red().bold().to_string()
        }
    }
}

fn outcome_detail(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Created | SyncOutcome::UpToDate => String::new(),
        SyncOutcome::Updated { from, to } => format!("{from} -> {to}"),
        SyncOutcome::Skipped { reason } => reason.clone(),
        SyncOutcome::SyncFailed { detail } => detail.clone(),
        SyncOutcome::DependencyFailed { detail } => detail.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

use super::OutputFormat;
use crate::config::AppConfig;
use crate::platform::Platform;
use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use lg_core::sweep::{CompanyOutcome, SweepReport};
use tracing::info;

/// Runs an automation sweep. Returns true when every company succeeded.
pub async fn run_sweep(
    platform: &Platform,
    config: &AppConfig,
    companies: &[String],
    dry_run: bool,
    now: DateTime<Utc>,
    format: OutputFormat,
) -> Result<bool> {
    let targets = platform.select_companies(companies, now).await?;
    info!(companies = targets.len(), dry_run, "Starting sweep");

    let report = platform
        .sweep(config, dry_run)
        .run(&platform.operator, &targets, now)
        .await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(platform, &report);
    }

    Ok(report.unsuccessful() == 0)
}

fn print_report(platform: &Platform, report: &SweepReport) {
    let title = if report.dry_run {
        "Automation Sweep (dry run)"
    } else {
        "Automation Sweep"
    };
    println!("{}", title.bold());
    println!("─────────────────────────────");

    if report.companies.is_empty() {
        println!("No companies to sweep");
        return;
    }

    for entry in &report.companies {
        let label = platform
            .find_company(&entry.company_id.to_string())
            .map(|c| c.slug.clone())
            .unwrap_or_else(|_| entry.company_id.to_string());

        let summary = match &entry.outcome {
            CompanyOutcome::Completed {
                queued,
                sent,
                failed,
                suppressed,
                skipped,
            } => {
                let status = if *failed == 0 {
                    "completed".green()
                } else {
                    "completed".yellow()
                };
                format!(
                    "{} queued={} sent={} failed={} suppressed={} skipped={}",
                    status, queued, sent, failed, suppressed, skipped
                )
            }
            CompanyOutcome::DryRun {
                queued,
                suppressed,
                skipped,
                messages,
            } => {
                let mut line = format!(
                    "{} queued={} would_send={} suppressed={} skipped={}",
                    "dry run".cyan(),
                    queued,
                    messages.len(),
                    suppressed,
                    skipped
                );
                for message in messages {
                    line.push_str(&format!(
                        "\n      {} → {} ({})",
                        message.dedup_key,
                        message.target,
                        message.body.for_locale(&message.locale)
                    ));
                }
                line
            }
            CompanyOutcome::TimedOut => "timed out".red().to_string(),
            CompanyOutcome::Failed { reason } => format!("{}: {}", "failed".red(), reason),
        };

        println!("  {} [{} ms] {}", label.bold(), entry.duration_ms, summary);
    }

    println!();
    println!(
        "{} succeeded, {} unsuccessful, {} messages sent",
        report.succeeded().to_string().green(),
        report.unsuccessful().to_string().red(),
        report.total_sent()
    );
}

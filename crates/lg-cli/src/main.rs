//! Leaseguard CLI
//!
//! Runs notification sweeps and financial reports for every company on a
//! Leaseguard platform snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

mod commands;
mod config;
mod platform;
mod snapshot;
mod validator;

use commands::OutputFormat;
use config::AppConfig;
use platform::Platform;
use snapshot::Snapshot;
use validator::ConfigValidator;

#[derive(Parser)]
#[command(name = "leaseguard")]
#[command(version)]
#[command(about = "Multi-tenant rent collection automation", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Data snapshot (JSON) to operate on
    #[arg(short, long, value_name = "FILE")]
    data: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Evaluate as of this date (YYYY-MM-DD) instead of now
    #[arg(long, value_name = "DATE")]
    as_of: Option<NaiveDate>,

    /// Write the audit trail to this file after the command
    #[arg(long, value_name = "FILE")]
    audit_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the notification sweep across companies
    Sweep {
        /// Build messages without sending them
        #[arg(long)]
        dry_run: bool,

        /// Company slug or id; repeat for several. Defaults to all operational companies
        #[arg(long = "company", value_name = "COMPANY")]
        companies: Vec<String>,
    },

    /// Show financial health for a company
    Health {
        /// Company slug or id
        company: String,
    },

    /// Show the cash-flow forecast for a company
    Forecast {
        /// Company slug or id
        company: String,

        /// Number of months to project
        #[arg(long)]
        months: Option<u32>,
    },

    /// List overdue payments for a company
    Issues {
        /// Company slug or id
        company: String,
    },

    /// Validate configuration and data
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(cli.config.as_deref())?;

    let logging = if cli.verbose {
        lg_observability::LoggingConfig::development()
    } else {
        config.logging.clone()
    };
    lg_observability::init_logging_with_config(&logging);
    lg_observability::describe_metrics();

    if let Commands::Validate = cli.command {
        return cmd_validate(&cli, &config);
    }

    let snapshot = load_snapshot(cli.data.as_deref())?;
    let platform = Platform::build(&snapshot, &config).await?;
    let now = evaluation_time(cli.as_of);

    let outcome = match &cli.command {
        Commands::Sweep { dry_run, companies } => {
            commands::run_sweep(&platform, &config, companies, *dry_run, now, cli.format).await
        }
        Commands::Health { company } => {
            commands::run_health(&platform, company, now, cli.format)
                .await
                .map(|_| true)
        }
        Commands::Forecast { company, months } => {
            let months = months.unwrap_or(config.sweep.forecast_months);
            commands::run_forecast(&platform, company, months, now, cli.format)
                .await
                .map(|_| true)
        }
        Commands::Issues { company } => {
            commands::run_issues(&platform, company, now, cli.format)
                .await
                .map(|_| true)
        }
        Commands::Validate => Ok(true),
    };

    // The trail is written even when the command failed.
    let export_path = cli.audit_out.clone().or(config.audit.export_path.clone());
    if let Some(path) = export_path {
        let written = platform.export_audit(&path).await?;
        tracing::info!(entries = written, path = %path.display(), "Audit trail exported");
    }

    if !outcome? {
        std::process::exit(2);
    }
    Ok(())
}

fn load_snapshot(path: Option<&Path>) -> Result<Snapshot> {
    match path {
        Some(path) => Snapshot::load(path),
        None => {
            tracing::warn!("No --data snapshot given; operating on an empty platform");
            Ok(Snapshot::default())
        }
    }
}

/// Midday of the `--as-of` day, or the current time.
fn evaluation_time(as_of: Option<NaiveDate>) -> DateTime<Utc> {
    as_of
        .and_then(|date| date.and_hms_opt(12, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

fn cmd_validate(cli: &Cli, config: &AppConfig) -> Result<()> {
    if let Some(path) = &cli.config {
        println!(
            "Validating configuration: {}",
            path.display().to_string().cyan()
        );
    }

    let snapshot = match &cli.data {
        Some(path) => {
            println!("Validating data: {}", path.display().to_string().cyan());
            Some(Snapshot::load(path).context("Snapshot could not be read")?)
        }
        None => None,
    };

    let result = ConfigValidator::validate(config, snapshot.as_ref());
    result.print();

    println!();
    println!("{}", "Configuration Summary".bold());
    println!("─────────────────────");
    println!(
        "  Concurrency: {} companies",
        config.sweep.max_concurrent_companies
    );
    println!(
        "  Per-company timeout: {}s",
        config.sweep.per_company_timeout_secs
    );
    println!(
        "  Grace / escalation: {} / {} days",
        config.defaults.grace_period_days, config.defaults.escalation_interval_days
    );
    if let Some(snapshot) = &snapshot {
        println!("  Companies: {}", snapshot.companies.len());
        println!("  Payments: {}", snapshot.payments.len());
        println!("  Contracts: {}", snapshot.contracts.len());
    }

    if result.has_errors() {
        println!();
        println!(
            "{}",
            "Validation failed. Fix the errors above.".red().bold()
        );
        std::process::exit(1);
    } else if result.has_warnings() {
        println!();
        println!(
            "{}",
            "Validation passed with warnings.".yellow().bold()
        );
    } else {
        println!();
        println!("{}", "Validation passed.".green().bold());
    }

    Ok(())
}

//! Read-only financial reports for one company.

use super::OutputFormat;
use crate::platform::Platform;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use lg_core::finance::{
    assess_financial_health, calculate_cash_flow_forecast, detect_payment_issues, FinancePolicy,
};
use lg_core::models::{
    Contract, MaintenanceExpense, MalformedRecordError, Payment, CONTRACTS, MAINTENANCE_EXPENSES,
    PAYMENTS,
};
use lg_core::scope::Query;
use lg_core::tenant::{Company, CompanyContext};
use lg_observability::{AuditEventType, AuditScope};
use serde_json::json;

/// A company's records, loaded through the tenant query middleware.
struct CompanyRecords {
    company: Company,
    ctx: CompanyContext,
    policy: FinancePolicy,
    payments: Vec<Payment>,
    contracts: Vec<Contract>,
    maintenance: Vec<MaintenanceExpense>,
    malformed: Vec<MalformedRecordError>,
}

async fn load(
    platform: &Platform,
    company_key: &str,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<CompanyRecords> {
    let company = platform.find_company(company_key)?.clone();
    let ctx = platform.company_context(company.id, reason, now).await?;
    let policy = FinancePolicy::from_settings(ctx.settings())
        .with_context(|| format!("Invalid settings for company '{}'", company.slug))?;

    let payments = platform
        .store
        .fetch_as::<Payment>(&ctx, Query::collection(PAYMENTS))
        .await?;
    let contracts = platform
        .store
        .fetch_as::<Contract>(&ctx, Query::collection(CONTRACTS))
        .await?;
    let maintenance = platform
        .store
        .fetch_as::<MaintenanceExpense>(&ctx, Query::collection(MAINTENANCE_EXPENSES))
        .await?;

    let mut malformed = payments.malformed;
    malformed.extend(contracts.malformed);
    malformed.extend(maintenance.malformed);

    Ok(CompanyRecords {
        company,
        ctx,
        policy,
        payments: payments.records,
        contracts: contracts.records,
        maintenance: maintenance.records,
        malformed,
    })
}

fn print_skipped(skipped: &[MalformedRecordError]) {
    if skipped.is_empty() {
        return;
    }
    println!();
    println!("{}", "Skipped records:".yellow().bold());
    for record in skipped {
        println!("  {} {} '{}': {}", "⚠".yellow(), record.kind, record.id, record.reason);
    }
}

/// Prints the financial health of one company.
pub async fn run_health(
    platform: &Platform,
    company_key: &str,
    now: DateTime<Utc>,
    format: OutputFormat,
) -> Result<()> {
    let data = load(platform, company_key, "health report", now).await?;
    let health = assess_financial_health(&data.payments, &data.contracts, &data.policy, now);

    let mut skipped = data.malformed.clone();
    skipped.extend(health.skipped.iter().cloned());
    platform.audit_skipped(data.company.id, &skipped).await;
    platform
        .audit
        .log_info(
            AuditScope::Company(data.company.id),
            AuditEventType::HealthAssessed,
            format!(
                "Financial health reported: collection rate {:.2}",
                health.metrics.collection_rate
            ),
            format!(
                "تم إصدار تقرير الوضع المالي: نسبة التحصيل {:.2}",
                health.metrics.collection_rate
            ),
            json!({ "metrics": health.metrics, "source": "cli" }),
        )
        .await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    let locale = data.ctx.settings().locale.as_str();
    let currency = data.ctx.settings().currency.as_str();
    let metrics = &health.metrics;

    println!("{} {}", "Financial Health:".bold(), data.company.name);
    println!("─────────────────────────────────────────");
    println!(
        "  {} {} to {}",
        "Window:".cyan(),
        health.window_start,
        health.window_end
    );
    println!(
        "  {} {} of {} paid ({:.1}%)",
        "Collection:".cyan(),
        metrics.paid_count,
        metrics.payments_considered,
        metrics.collection_rate * 100.0
    );
    println!(
        "  {} {} {} of {} {} ({:.1}%)",
        "Overdue:".cyan(),
        metrics.overdue_amount,
        currency,
        metrics.total_due_amount,
        currency,
        metrics.overdue_percentage * 100.0
    );
    println!(
        "  {} {}",
        "Expiring contracts:".cyan(),
        metrics.expiring_contracts
    );

    if !health.recommendations.is_empty() {
        println!();
        println!("{}", "Recommendations:".bold());
        for recommendation in &health.recommendations {
            println!("  • {}", recommendation.for_locale(locale));
        }
    }

    print_skipped(&skipped);
    Ok(())
}

/// Prints overdue payments grouped by bucket.
pub async fn run_issues(
    platform: &Platform,
    company_key: &str,
    now: DateTime<Utc>,
    format: OutputFormat,
) -> Result<()> {
    let data = load(platform, company_key, "payment issues report", now).await?;
    let issues = detect_payment_issues(&data.payments, &data.policy, now);

    let mut skipped = data.malformed.clone();
    skipped.extend(issues.skipped.iter().cloned());
    platform.audit_skipped(data.company.id, &skipped).await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&issues)?);
        return Ok(());
    }

    println!("{} {}", "Payment Issues:".bold(), data.company.name);
    println!("─────────────────────────────────────────");
    if issues.is_clear() {
        println!("  {} Nothing overdue", "✓".green());
    }

    if !issues.within_grace.is_empty() {
        println!(
            "{} (≤ {} days)",
            "Within grace".cyan().bold(),
            data.policy.grace_period_days
        );
        for entry in &issues.within_grace {
            println!(
                "  {} {} {} due {} ({} days)",
                entry.payment.id,
                entry.payment.tenant_name,
                entry.payment.amount,
                entry.payment.due_date,
                entry.days_overdue
            );
        }
    }

    if !issues.needs_escalation.is_empty() {
        println!("{}", "Needs escalation".yellow().bold());
        for entry in &issues.needs_escalation {
            println!(
                "  {} {} {} due {} ({} days, level {})",
                entry.payment.id,
                entry.payment.tenant_name,
                entry.payment.amount,
                entry.payment.due_date,
                entry.days_overdue,
                entry.level
            );
        }
    }

    if !issues.severely_overdue.is_empty() {
        println!(
            "{} (≥ {} days)",
            "Severely overdue".red().bold(),
            data.policy.severe_threshold_days
        );
        for entry in &issues.severely_overdue {
            println!(
                "  {} {} {} ({} days)",
                entry.payment.id, entry.payment.tenant_name, entry.payment.amount, entry.days_overdue
            );
        }
    }

    print_skipped(&skipped);
    Ok(())
}

/// Prints the cash-flow forecast for the coming months.
pub async fn run_forecast(
    platform: &Platform,
    company_key: &str,
    months: u32,
    now: DateTime<Utc>,
    format: OutputFormat,
) -> Result<()> {
    let data = load(platform, company_key, "cash flow forecast", now).await?;
    let forecast = calculate_cash_flow_forecast(
        &data.contracts,
        &data.payments,
        &data.maintenance,
        &data.policy,
        now,
        months,
    );

    let mut skipped = data.malformed.clone();
    skipped.extend(forecast.skipped.iter().cloned());
    platform.audit_skipped(data.company.id, &skipped).await;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&forecast)?);
        return Ok(());
    }

    let currency = data.ctx.settings().currency.as_str();
    println!("{} {}", "Cash Flow Forecast:".bold(), data.company.name);
    println!("─────────────────────────────────────────");
    println!(
        "  Collection rate applied: {:.1}%",
        forecast.collection_rate * 100.0
    );
    println!();
    println!(
        "  {:<8} {:>14} {:>14} {:>14}",
        "Month", "Expected", "Projected", "Expenses"
    );
    for month in &forecast.months {
        println!(
            "  {:<8} {:>14} {:>14} {:>14}",
            month.label,
            month.expected.to_string(),
            month.projected.to_string(),
            month.expenses.to_string()
        );
    }
    println!("  (amounts in {})", currency);

    print_skipped(&skipped);
    Ok(())
}

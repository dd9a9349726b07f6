//! Configuration and snapshot validation for Leaseguard.
//!
//! Runs before any command touches the data so that bad settings or
//! orphaned documents are reported up front instead of surfacing as
//! skipped records mid-sweep.

use crate::config::AppConfig;
use crate::snapshot::Snapshot;
use colored::Colorize;
use lg_core::finance::{FinancePolicy, MAX_FORECAST_HORIZON_MONTHS};
use lg_core::models::{
    Contract, MaintenanceExpense, Payment, TenantContact, CONTRACTS, MAINTENANCE_EXPENSES,
    PAYMENTS, TENANT_CONTACTS,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// Result of validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Problems that make the data unusable.
    pub errors: Vec<String>,
    /// Problems the engine tolerates by skipping records.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Prints the validation result to the console.
    pub fn print(&self) {
        if !self.warnings.is_empty() {
            println!();
            println!("{}", "Warnings:".yellow().bold());
            for warning in &self.warnings {
                println!("  {} {}", "⚠".yellow(), warning);
            }
        }

        if !self.errors.is_empty() {
            println!();
            println!("{}", "Errors:".red().bold());
            for error in &self.errors {
                println!("  {} {}", "✗".red(), error);
            }
        }

        if self.errors.is_empty() && self.warnings.is_empty() {
            println!("  {} Configuration and data OK", "✓".green());
        }
    }
}

/// Validates configuration and an optional data snapshot.
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig, snapshot: Option<&Snapshot>) -> ValidationResult {
        let mut result = ValidationResult::new();

        Self::validate_sweep(config, &mut result);
        Self::validate_defaults(config, &mut result);
        if let Some(snapshot) = snapshot {
            Self::validate_snapshot(config, snapshot, &mut result);
        }

        result
    }

    fn validate_sweep(config: &AppConfig, result: &mut ValidationResult) {
        if let Err(err) = config.sweep.to_sweep_config(false).validate() {
            result.add_error(err.to_string());
        }
        if config.sweep.ledger_retention_hours < 1 {
            result.add_warning(format!(
                "sweep.ledger_retention_hours is {}; 1 hour will be used",
                config.sweep.ledger_retention_hours
            ));
        }
        if config.sweep.forecast_months == 0 {
            result.add_warning("sweep.forecast_months is 0; forecasts will be empty");
        } else if config.sweep.forecast_months > MAX_FORECAST_HORIZON_MONTHS {
            result.add_warning(format!(
                "sweep.forecast_months is {}; forecasts stop at {} months",
                config.sweep.forecast_months, MAX_FORECAST_HORIZON_MONTHS
            ));
        }
        if config.audit.fallback_capacity == 0 {
            result.add_warning(
                "audit.fallback_capacity is 0; entries are lost while the audit sink is failing",
            );
        }
    }

    fn validate_defaults(config: &AppConfig, result: &mut ValidationResult) {
        if let Err(err) = FinancePolicy::from_settings(&config.defaults) {
            result.add_error(format!("defaults: {}", err));
        }
    }

    fn validate_snapshot(config: &AppConfig, snapshot: &Snapshot, result: &mut ValidationResult) {
        if snapshot.companies.is_empty() {
            result.add_warning("Snapshot contains no companies");
        }

        if let Err(err) = snapshot.build_companies(&config.defaults) {
            result.add_error(format!("{:#}", err));
        }

        for company in &snapshot.companies {
            if let Some(settings) = &company.settings {
                if let Err(err) = FinancePolicy::from_settings(settings) {
                    result.add_error(format!("Company '{}': {}", company.slug, err));
                }
            }
        }

        let known: HashSet<Uuid> = snapshot.companies.iter().map(|c| c.id).collect();
        for (collection, documents) in snapshot.collections() {
            for document in documents {
                Self::validate_owner(collection, document, &known, result);
            }
        }

        Self::validate_decodes::<Payment>(PAYMENTS, &snapshot.payments, result);
        Self::validate_decodes::<Contract>(CONTRACTS, &snapshot.contracts, result);
        Self::validate_decodes::<TenantContact>(TENANT_CONTACTS, &snapshot.tenant_contacts, result);
        Self::validate_decodes::<MaintenanceExpense>(
            MAINTENANCE_EXPENSES,
            &snapshot.maintenance_expenses,
            result,
        );
    }

    /// Documents without a known owner are invisible to every tenant.
    fn validate_owner(
        collection: &str,
        document: &Value,
        known: &HashSet<Uuid>,
        result: &mut ValidationResult,
    ) {
        let id = document_id(document);
        match document.get("company_id").and_then(Value::as_str) {
            None => result.add_error(format!("{} '{}' has no company_id", collection, id)),
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(owner) if known.contains(&owner) => {}
                Ok(owner) => result.add_error(format!(
                    "{} '{}' belongs to unknown company {}",
                    collection, id, owner
                )),
                Err(_) => result.add_error(format!(
                    "{} '{}' has invalid company_id '{}'",
                    collection, id, raw
                )),
            },
        }
    }

    fn validate_decodes<T: DeserializeOwned>(
        collection: &str,
        documents: &[Value],
        result: &mut ValidationResult,
    ) {
        for document in documents {
            if let Err(err) = serde_json::from_value::<T>(document.clone()) {
                result.add_warning(format!(
                    "{} '{}' will be skipped: {}",
                    collection,
                    document_id(document),
                    err
                ));
            }
        }
    }
}

fn document_id(document: &Value) -> &str {
    document
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>")
}

//! Configuration loading for the Leaseguard CLI.

use anyhow::{Context, Result};
use lg_core::tenant::CompanySettings;
use lg_core::SweepConfig;
use lg_observability::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration. Every section and field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub sweep: SweepSettings,
    /// Company settings applied to snapshot companies that carry none.
    pub defaults: CompanySettings,
    pub operator: OperatorConfig,
    pub audit: AuditSettings,
}

impl AppConfig {
    /// Loads configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Sweep tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub per_company_timeout_secs: u64,
    pub max_concurrent_companies: usize,
    /// Window in which an already delivered message is not sent again.
    pub ledger_retention_hours: i64,
    /// Horizon used by `forecast` when `--months` is not given.
    pub forecast_months: u32,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            per_company_timeout_secs: 30,
            max_concurrent_companies: 4,
            ledger_retention_hours: lg_core::automation::DEFAULT_LEDGER_RETENTION_HOURS,
            forecast_months: lg_core::finance::DEFAULT_FORECAST_HORIZON_MONTHS,
        }
    }
}

impl SweepSettings {
    pub fn to_sweep_config(&self, dry_run: bool) -> SweepConfig {
        SweepConfig {
            per_company_timeout: Duration::from_secs(self.per_company_timeout_secs),
            max_concurrent_companies: self.max_concurrent_companies,
            dry_run,
        }
    }
}

/// Identity the CLI acts as. Always a super admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub user_id: String,
    pub display_name: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            user_id: "leaseguard-scheduler".to_string(),
            display_name: None,
        }
    }
}

/// Audit trail handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Entries kept locally while the sink is failing.
    pub fallback_capacity: usize,
    /// Where to write the audit trail as JSON after each command.
    pub export_path: Option<PathBuf>,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            fallback_capacity: 1000,
            export_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.sweep.per_company_timeout_secs, 30);
        assert_eq!(config.sweep.max_concurrent_companies, 4);
        assert_eq!(config.defaults.grace_period_days, 5);
        assert_eq!(config.defaults.currency, "SAR");
        assert_eq!(config.operator.user_id, "leaseguard-scheduler");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
sweep:
  max_concurrent_companies: 8

defaults:
  grace_period_days: 7
  currency: AED

logging:
  level: debug
  json_format: true
"#;

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sweep.max_concurrent_companies, 8);
        assert_eq!(config.sweep.per_company_timeout_secs, 30);
        assert_eq!(config.defaults.grace_period_days, 7);
        assert_eq!(config.defaults.escalation_interval_days, 15);
        assert_eq!(config.defaults.currency, "AED");
        assert!(config.logging.json_format);
        assert_eq!(config.audit.fallback_capacity, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "operator:\n  user_id: ops-7\nsweep:\n  per_company_timeout_secs: 5"
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.operator.user_id, "ops-7");

        let sweep = config.sweep.to_sweep_config(true);
        assert_eq!(sweep.per_company_timeout, Duration::from_secs(5));
        assert!(sweep.dry_run);
    }

    #[test]
    fn test_load_missing_file_fails_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        let err = AppConfig::load(&missing).unwrap_err();
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        // An empty YAML document deserializes as unit, so write an empty map.
        std::fs::write(file.path(), "{}\n").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.sweep.ledger_retention_hours, 20);
    }
}

//! Pipeline configuration
//!
//! Holds the windows, persona thresholds, cohort definition, category labels and
//! guardrail policy used by a run.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Explicit path, or the override in the data dir
//!    (~/.local/share/spendsense/config/spendsense.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::guardrail::MatchMode;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/spendsense.toml");

/// Terms rejected by the tone guardrail unless configuration says otherwise
pub const DEFAULT_BANNED_TERMS: &[&str] = &[
    "irresponsible",
    "reckless",
    "careless",
    "lazy",
    "wasteful",
    "foolish",
    "stupid",
    "bad with money",
    "overspending",
    "shameful",
    "ashamed",
    "guaranteed returns",
    "get rich",
];

/// Trailing window lengths in calendar months
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowConfig {
    pub transaction_months: u32,
    pub income_months: u32,
}

/// Recurring-merchant detection parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurringConfig {
    pub min_occurrences: usize,
    pub interval_tolerance_days: i64,
}

/// Which users the income percentile is ranked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortScope {
    /// Every user in the input dataset
    AllUsers,
    /// Only the users selected for the current run
    SelectedUsers,
}

impl CohortScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllUsers => "all_users",
            Self::SelectedUsers => "selected_users",
        }
    }
}

impl std::str::FromStr for CohortScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all_users" | "all" => Ok(Self::AllUsers),
            "selected_users" | "selected" => Ok(Self::SelectedUsers),
            _ => Err(format!("Unknown cohort scope: {}", s)),
        }
    }
}

/// Cohort definition for the income percentile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortConfig {
    pub scope: CohortScope,
    /// Fewer members than this makes the cohort incomplete
    pub min_size: usize,
}

/// Persona rule thresholds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaThresholds {
    pub debt_utilization: f64,
    pub gig_income_volatility: f64,
    pub gig_pay_gap_days: i64,
    pub auto_payer_min_merchants: usize,
    pub auto_payer_min_subscription_ratio: f64,
    pub wealth_min_income_percentile: f64,
    pub wealth_min_runway_months: f64,
    pub wealth_max_savings_rate: f64,
    pub optimizer_max_utilization: f64,
    pub optimizer_min_savings_rate: f64,
}

impl Default for PersonaThresholds {
    fn default() -> Self {
        Self {
            debt_utilization: 0.50,
            gig_income_volatility: 0.30,
            gig_pay_gap_days: 20,
            auto_payer_min_merchants: 3,
            auto_payer_min_subscription_ratio: 0.10,
            wealth_min_income_percentile: 0.80,
            wealth_min_runway_months: 3.0,
            wealth_max_savings_rate: 0.10,
            optimizer_max_utilization: 0.10,
            optimizer_min_savings_rate: 0.0,
        }
    }
}

/// Category labels matched against transaction category segments
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryConfig {
    pub income: Vec<String>,
    pub interest: Vec<String>,
}

/// Guardrail policy configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailConfig {
    pub mode: MatchMode,
    pub terms: Vec<String>,
    /// Newline-delimited file whose terms are appended after `terms`
    pub terms_file: Option<PathBuf>,
}

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub windows: WindowConfig,
    pub recurring: RecurringConfig,
    pub cohort: CohortConfig,
    pub thresholds: PersonaThresholds,
    /// Liquid cash above this many months of burn is idle
    pub idle_cash_burn_multiple: Decimal,
    pub categories: CategoryConfig,
    pub guardrail: GuardrailConfig,
    /// Worker threads for per-user fan-out (0 = available parallelism)
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            windows: WindowConfig {
                transaction_months: 6,
                income_months: 3,
            },
            recurring: RecurringConfig {
                min_occurrences: 3,
                interval_tolerance_days: 3,
            },
            cohort: CohortConfig {
                scope: CohortScope::AllUsers,
                min_size: 1,
            },
            thresholds: PersonaThresholds::default(),
            idle_cash_burn_multiple: Decimal::from(3),
            categories: CategoryConfig {
                income: vec!["income".to_string()],
                interest: vec!["interest".to_string()],
            },
            guardrail: GuardrailConfig {
                mode: MatchMode::Word,
                terms: DEFAULT_BANNED_TERMS.iter().map(|t| t.to_string()).collect(),
                terms_file: None,
            },
            workers: 0,
        }
    }
}

impl PipelineConfig {
    /// Load configuration (explicit path or override first, then embedded default)
    ///
    /// A relative `guardrail.terms_file` is resolved against the directory of
    /// the config file it came from.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let source = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let Some(source) = source else {
            return parse_config(DEFAULT_CONFIG);
        };

        let content = fs::read_to_string(&source).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", source.display(), e))
        })?;
        let mut config = parse_config(&content)?;
        if let Some(dir) = source.parent() {
            config.resolve_relative_paths(dir);
        }
        Ok(config)
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        self.guardrail.terms_file = self.guardrail.terms_file.take().map(|file| {
            if file.is_relative() {
                base.join(file)
            } else {
                file
            }
        });
    }

    /// The embedded default configuration
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }

    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendsense").join("config").join("spendsense.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    windows: Option<RawWindows>,
    recurring: Option<RawRecurring>,
    cohort: Option<RawCohort>,
    thresholds: Option<RawThresholds>,
    idle_cash: Option<RawIdleCash>,
    categories: Option<RawCategories>,
    guardrail: Option<RawGuardrail>,
    runtime: Option<RawRuntime>,
}

#[derive(Debug, Deserialize)]
struct RawWindows {
    transaction_months: Option<u32>,
    income_months: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawRecurring {
    min_occurrences: Option<usize>,
    interval_tolerance_days: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawCohort {
    scope: Option<String>,
    min_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawThresholds {
    debt_utilization: Option<f64>,
    gig_income_volatility: Option<f64>,
    gig_pay_gap_days: Option<i64>,
    auto_payer_min_merchants: Option<usize>,
    auto_payer_min_subscription_ratio: Option<f64>,
    wealth_min_income_percentile: Option<f64>,
    wealth_min_runway_months: Option<f64>,
    wealth_max_savings_rate: Option<f64>,
    optimizer_max_utilization: Option<f64>,
    optimizer_min_savings_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawIdleCash {
    burn_multiple: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawCategories {
    income: Option<Vec<String>>,
    interest: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawGuardrail {
    mode: Option<String>,
    terms: Option<Vec<String>>,
    terms_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawRuntime {
    workers: Option<usize>,
}

/// Parse config from TOML content
pub fn parse_config(content: &str) -> Result<PipelineConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = PipelineConfig::default();

    if let Some(windows) = raw.windows {
        if let Some(months) = windows.transaction_months {
            config.windows.transaction_months = months;
        }
        if let Some(months) = windows.income_months {
            config.windows.income_months = months;
        }
    }
    if config.windows.transaction_months == 0 || config.windows.income_months == 0 {
        return Err(Error::Config("Window lengths must be at least 1 month".into()));
    }

    if let Some(recurring) = raw.recurring {
        if let Some(min) = recurring.min_occurrences {
            config.recurring.min_occurrences = min.max(2);
        }
        if let Some(tolerance) = recurring.interval_tolerance_days {
            config.recurring.interval_tolerance_days = tolerance;
        }
    }

    if let Some(cohort) = raw.cohort {
        if let Some(scope) = cohort.scope {
            config.cohort.scope = scope.parse().map_err(Error::Config)?;
        }
        if let Some(min_size) = cohort.min_size {
            config.cohort.min_size = min_size;
        }
    }

    if let Some(t) = raw.thresholds {
        let d = &mut config.thresholds;
        if let Some(v) = t.debt_utilization {
            d.debt_utilization = v;
        }
        if let Some(v) = t.gig_income_volatility {
            d.gig_income_volatility = v;
        }
        if let Some(v) = t.gig_pay_gap_days {
            d.gig_pay_gap_days = v;
        }
        if let Some(v) = t.auto_payer_min_merchants {
            d.auto_payer_min_merchants = v;
        }
        if let Some(v) = t.auto_payer_min_subscription_ratio {
            d.auto_payer_min_subscription_ratio = v;
        }
        if let Some(v) = t.wealth_min_income_percentile {
            d.wealth_min_income_percentile = v;
        }
        if let Some(v) = t.wealth_min_runway_months {
            d.wealth_min_runway_months = v;
        }
        if let Some(v) = t.wealth_max_savings_rate {
            d.wealth_max_savings_rate = v;
        }
        if let Some(v) = t.optimizer_max_utilization {
            d.optimizer_max_utilization = v;
        }
        if let Some(v) = t.optimizer_min_savings_rate {
            d.optimizer_min_savings_rate = v;
        }
    }

    if let Some(multiple) = raw.idle_cash.and_then(|i| i.burn_multiple) {
        config.idle_cash_burn_multiple = Decimal::from(multiple);
    }

    if let Some(categories) = raw.categories {
        if let Some(income) = categories.income {
            config.categories.income = income;
        }
        if let Some(interest) = categories.interest {
            config.categories.interest = interest;
        }
    }

    if let Some(guardrail) = raw.guardrail {
        if let Some(mode) = guardrail.mode {
            config.guardrail.mode = mode.parse().map_err(Error::Config)?;
        }
        // An explicit empty list is respected (the guardrail then reports a missing policy)
        if let Some(terms) = guardrail.terms {
            config.guardrail.terms = terms;
        }
        config.guardrail.terms_file = guardrail.terms_file;
    }

    if let Some(workers) = raw.runtime.and_then(|r| r.workers) {
        config.workers = workers;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_config() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = parse_config(
            r#"
            [windows]
            income_months = 4

            [thresholds]
            debt_utilization = 0.40

            [cohort]
            scope = "selected_users"
            min_size = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.windows.transaction_months, 6);
        assert_eq!(config.windows.income_months, 4);
        assert_eq!(config.thresholds.debt_utilization, 0.40);
        assert_eq!(config.thresholds.gig_pay_gap_days, 20);
        assert_eq!(config.cohort.scope, CohortScope::SelectedUsers);
        assert_eq!(config.cohort.min_size, 10);
        assert!(!config.guardrail.terms.is_empty());
    }

    #[test]
    fn test_empty_guardrail_terms_respected() {
        let config = parse_config("[guardrail]\nterms = []\n").unwrap();
        assert!(config.guardrail.terms.is_empty());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse_config("[windows]\ntransaction_months = 0\n").is_err());
        assert!(parse_config("[cohort]\nscope = \"galaxy\"\n").is_err());
        assert!(parse_config("[guardrail]\nmode = \"fuzzy\"\n").is_err());
        assert!(parse_config("not toml = = =").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[runtime]\nworkers = 2\n").unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.worker_count(), 2);

        assert!(PipelineConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_terms_file_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spendsense.toml");
        fs::write(&path, "[guardrail]\nterms_file = \"terms.txt\"\n").unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.guardrail.terms_file, Some(dir.path().join("terms.txt")));

        let absolute = dir.path().join("abs").join("terms.txt");
        fs::write(
            &path,
            format!("[guardrail]\nterms_file = {:?}\n", absolute.display().to_string()),
        )
        .unwrap();
        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.guardrail.terms_file, Some(absolute));
    }
}

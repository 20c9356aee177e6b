//! Pipeline configuration
//!
//! Config is loaded in three layers:
//! 1. Embedded defaults (compiled into binary from `config/billwise.toml`)
//! 2. Override file (`--config` path, or ~/.config/billwise/config.toml)
//! 3. Environment variables (`BILLWISE_*`)

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::DEFAULT_SIMILARITY_THRESHOLD;
use crate::taxonomy::{CategoryLabel, Taxonomy};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/billwise.toml");

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for one OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub host: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ServiceConfig {
    pub fn new(host: &str, model: &str) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// Currency of the billing files (single currency, no conversion)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyConfig {
    pub code: String,
    pub symbol: String,
    /// Digits after the decimal point in the minor unit (0 for JPY, 2 for USD)
    pub minor_digits: u32,
}

impl CurrencyConfig {
    /// Format minor units for display, e.g. `¥878,273` or `$12.50`
    pub fn format(&self, amount: i64) -> String {
        let sign = if amount < 0 { "-" } else { "" };
        let abs = amount.unsigned_abs();
        let scale = 10u64.pow(self.minor_digits);
        let whole = group_thousands(abs / scale);
        if self.minor_digits == 0 {
            format!("{}{}{}", sign, self.symbol, whole)
        } else {
            format!(
                "{}{}{}.{:0width$}",
                sign,
                self.symbol,
                whole,
                abs % scale,
                width = self.minor_digits as usize
            )
        }
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            code: "JPY".to_string(),
            symbol: "¥".to_string(),
            minor_digits: 0,
        }
    }
}

/// How the source file signs expense rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignConvention {
    /// Charges are positive, refunds negative (card statements)
    #[default]
    ExpensesPositive,
    /// Charges are negative, refunds positive (bank exports)
    ExpensesNegative,
}

impl SignConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExpensesPositive => "expenses-positive",
            Self::ExpensesNegative => "expenses-negative",
        }
    }

    /// Convert a source amount to the core convention (expenses positive)
    pub fn normalize(&self, amount: i64) -> i64 {
        match self {
            Self::ExpensesPositive => amount,
            Self::ExpensesNegative => -amount,
        }
    }
}

impl FromStr for SignConvention {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "expenses-positive" | "positive" => Ok(Self::ExpensesPositive),
            "expenses-negative" | "negative" => Ok(Self::ExpensesNegative),
            _ => Err(format!(
                "Unknown sign convention: {} (valid: expenses-positive, expenses-negative)",
                s
            )),
        }
    }
}

/// Everything the pipeline needs at construction
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub classification: ServiceConfig,
    pub reasoning: ServiceConfig,
    pub taxonomy: Taxonomy,
    /// Upper bound on every service call
    pub timeout: Duration,
    pub currency: CurrencyConfig,
    pub sign_convention: SignConvention,
    /// Minimum similarity for a near match in decision memory
    pub memory_threshold: f64,
}

impl PipelineConfig {
    /// Load config: override file (explicit path or default location) over
    /// embedded defaults, then environment variables
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let content = match override_path {
            Some(path) => fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => {
                    debug!(path = %path.display(), "Using config override");
                    fs::read_to_string(&path)
                        .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?
                }
                None => DEFAULT_CONFIG.to_string(),
            },
        };

        let mut config = Self::defaults()?;
        config.merge_toml(&content)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Embedded defaults only
    pub fn defaults() -> Result<Self> {
        let mut config = Self {
            classification: ServiceConfig::new("http://localhost:8080", "default"),
            reasoning: ServiceConfig::new("http://localhost:8080", "default"),
            taxonomy: Taxonomy::default(),
            timeout: DEFAULT_TIMEOUT,
            currency: CurrencyConfig::default(),
            sign_convention: SignConvention::default(),
            memory_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        };
        config.merge_toml(DEFAULT_CONFIG)?;
        Ok(config)
    }

    /// Apply a TOML document on top of the current values
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let raw: RawConfig = toml::from_str(content)?;

        if let Some(defaults) = raw.defaults {
            if let Some(secs) = defaults.timeout_secs {
                self.timeout = timeout_from_secs(secs, "timeout_secs")?;
            }
        }
        if let Some(service) = raw.classification {
            service.apply(&mut self.classification);
        }
        if let Some(service) = raw.reasoning {
            service.apply(&mut self.reasoning);
        }
        if let Some(currency) = raw.currency {
            if let Some(code) = currency.code {
                self.currency.code = code;
            }
            if let Some(symbol) = currency.symbol {
                self.currency.symbol = symbol;
            }
            if let Some(digits) = currency.minor_digits {
                if digits > 4 {
                    return Err(Error::Config(format!(
                        "minor_digits must be 0-4, got {}",
                        digits
                    )));
                }
                self.currency.minor_digits = digits;
            }
        }
        if let Some(ingestion) = raw.ingestion {
            if let Some(sign) = ingestion.sign_convention {
                self.sign_convention = sign.parse().map_err(Error::Config)?;
            }
        }
        if let Some(memory) = raw.memory {
            if let Some(threshold) = memory.similarity_threshold {
                self.memory_threshold = threshold_in_range(threshold, "similarity_threshold")?;
            }
        }
        if let Some(entries) = raw.taxonomy {
            self.taxonomy = Taxonomy::from_entries(entries)?;
        }

        Ok(())
    }

    /// Apply `BILLWISE_*` variables through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("BILLWISE_CLASSIFY_HOST") {
            self.classification.host = host.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("BILLWISE_CLASSIFY_MODEL") {
            self.classification.model = model;
        }
        if let Some(host) = lookup("BILLWISE_REASON_HOST") {
            self.reasoning.host = host.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("BILLWISE_REASON_MODEL") {
            self.reasoning.model = model;
        }
        if let Some(key) = lookup("BILLWISE_API_KEY") {
            self.classification.api_key = Some(key.clone());
            self.reasoning.api_key = Some(key);
        }
        if let Some(key) = lookup("BILLWISE_CLASSIFY_API_KEY") {
            self.classification.api_key = Some(key);
        }
        if let Some(key) = lookup("BILLWISE_REASON_API_KEY") {
            self.reasoning.api_key = Some(key);
        }
        if let Some(secs) = lookup("BILLWISE_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                Error::Config(format!("BILLWISE_TIMEOUT_SECS must be an integer, got {}", secs))
            })?;
            self.timeout = timeout_from_secs(secs, "BILLWISE_TIMEOUT_SECS")?;
        }
        if let Some(value) = lookup("BILLWISE_MEMORY_THRESHOLD") {
            let threshold: f64 = value.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "BILLWISE_MEMORY_THRESHOLD must be a number, got {}",
                    value
                ))
            })?;
            self.memory_threshold = threshold_in_range(threshold, "BILLWISE_MEMORY_THRESHOLD")?;
        }
        Ok(())
    }
}

fn timeout_from_secs(secs: u64, name: &str) -> Result<Duration> {
    if secs == 0 {
        return Err(Error::Config(format!("{} must be at least 1", name)));
    }
    Ok(Duration::from_secs(secs))
}

fn threshold_in_range(threshold: f64, name: &str) -> Result<f64> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(threshold)
    } else {
        Err(Error::Config(format!(
            "{} must be in (0, 1], got {}",
            name, threshold
        )))
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("billwise").join("config.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    defaults: Option<RawDefaults>,
    classification: Option<RawService>,
    reasoning: Option<RawService>,
    currency: Option<RawCurrency>,
    ingestion: Option<RawIngestion>,
    memory: Option<RawMemory>,
    taxonomy: Option<Vec<CategoryLabel>>,
}

#[derive(Debug, Deserialize)]
struct RawDefaults {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    host: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl RawService {
    fn apply(self, target: &mut ServiceConfig) {
        if let Some(host) = self.host {
            target.host = host.trim_end_matches('/').to_string();
        }
        if let Some(model) = self.model {
            target.model = model;
        }
        if self.temperature.is_some() {
            target.temperature = self.temperature;
        }
        if self.max_tokens.is_some() {
            target.max_tokens = self.max_tokens;
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawCurrency {
    code: Option<String>,
    symbol: Option<String>,
    minor_digits: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawIngestion {
    sign_convention: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMemory {
    similarity_threshold: Option<f64>,
}

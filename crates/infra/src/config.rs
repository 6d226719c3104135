//! Engine configuration.
//!
//! A plain value handed to the services. Loading from the environment or a
//! JSON document happens at the process boundary and reports errors through
//! `anyhow` with context.

use std::str::FromStr;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use stockflow_accounting::ValuationMethod;
use stockflow_core::{Currency, MoneyError};

pub const ENV_DEFAULT_CURRENCY: &str = "STOCKFLOW_DEFAULT_CURRENCY";
pub const ENV_VALUATION_METHOD: &str = "STOCKFLOW_VALUATION_METHOD";
pub const ENV_PAGE_LIMIT: &str = "STOCKFLOW_PAGE_LIMIT";
pub const ENV_MAX_PAGE_LIMIT: &str = "STOCKFLOW_MAX_PAGE_LIMIT";
pub const ENV_LEDGER_ENABLED: &str = "STOCKFLOW_LEDGER_ENABLED";
pub const ENV_MAX_RETRIES: &str = "STOCKFLOW_MAX_RETRIES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ISO code used for valued receipts that name no currency.
    pub default_currency: String,
    /// Method given to ledgers created on first valued receipt.
    pub default_valuation_method: ValuationMethod,
    pub default_page_limit: usize,
    pub max_page_limit: usize,
    pub ledger_enabled: bool,
    /// Extra attempts after a lost optimistic-concurrency race.
    pub max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            default_valuation_method: ValuationMethod::Fifo,
            default_page_limit: 50,
            max_page_limit: 500,
            ledger_enabled: true,
            max_retries: 3,
        }
    }
}

impl EngineConfig {
    /// Read `STOCKFLOW_*` variables over the defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(code) = lookup(ENV_DEFAULT_CURRENCY) {
            config.default_currency = code.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_VALUATION_METHOD) {
            config.default_valuation_method = ValuationMethod::from_str(&raw)
                .with_context(|| format!("{ENV_VALUATION_METHOD}={raw}"))?;
        }
        if let Some(raw) = lookup(ENV_PAGE_LIMIT) {
            config.default_page_limit = parse(ENV_PAGE_LIMIT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_PAGE_LIMIT) {
            config.max_page_limit = parse(ENV_MAX_PAGE_LIMIT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LEDGER_ENABLED) {
            config.ledger_enabled = parse_flag(&raw)
                .with_context(|| format!("{ENV_LEDGER_ENABLED}={raw}"))?;
        }
        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = parse(ENV_MAX_RETRIES, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(document: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(document).context("parsing engine config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.currency()
            .with_context(|| format!("default_currency {:?}", self.default_currency))?;
        if self.default_page_limit == 0 {
            bail!("default_page_limit must be positive");
        }
        if self.default_page_limit > self.max_page_limit {
            bail!(
                "default_page_limit {} exceeds max_page_limit {}",
                self.default_page_limit,
                self.max_page_limit
            );
        }
        Ok(())
    }

    pub fn currency(&self) -> Result<Currency, MoneyError> {
        Currency::new(&self.default_currency)
    }
}

fn parse<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim().parse().with_context(|| format!("{key}={raw}"))
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, found {other:?}"),
    }
}

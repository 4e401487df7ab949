//! Application configuration loaded from the environment.
//!
//! Variables (a `.env` file in the working directory is read first):
//! - ALPACA_KEY / ALPACA_SECRET (only needed for the Alpaca data source)
//! - ALPACA_ENDPOINT (defaults to the paper trading API)
//! - ALPACA_DATA_URL (defaults to https://data.alpaca.markets)
//! - MAX_DAILY_LOSS_PCT (defaults to -2)
//! - KELLY_FRACTION_CAP (defaults to 0.5)
//! - PER_SYMBOL_CAP_PCT (defaults to 5)
//! - SCHEDULER_UTC_OFFSET_HOURS (defaults to -5, US/Eastern standard time)
//! - TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID (optional, enable report notifications)

use anyhow::{bail, Context, Result};
use chrono::FixedOffset;
use serde::Serialize;

use crate::trading::{RiskConfig, SignalConfig};

pub const DEFAULT_ALPACA_ENDPOINT: &str = "https://paper-api.alpaca.markets/v2";
pub const DEFAULT_ALPACA_DATA_URL: &str = "https://data.alpaca.markets";

/// Effective runtime configuration.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    // === Broker / data ===
    #[serde(skip_serializing)]
    pub alpaca_key: Option<String>,

    #[serde(skip_serializing)]
    pub alpaca_secret: Option<String>,

    /// Trading API base URL
    pub alpaca_endpoint: String,

    /// Market data API base URL
    pub alpaca_data_url: String,

    // === Risk ===
    /// Daily loss (percent, <= 0) that disables new entries
    pub max_daily_loss_pct: f64,

    /// Maximum exposure to one symbol (percent of equity)
    pub per_symbol_cap_pct: f64,

    // === Sizing ===
    /// Upper bound on any Kelly-derived size (0.0 to 1.0)
    pub kelly_fraction_cap: f64,

    // === Scheduling ===
    /// Offset of the exchange's wall clock from UTC, in hours
    pub scheduler_utc_offset_hours: i32,

    // === Notifications ===
    #[serde(skip_serializing)]
    pub telegram_bot_token: Option<String>,

    pub telegram_chat_id: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            alpaca_key: None,
            alpaca_secret: None,
            alpaca_endpoint: DEFAULT_ALPACA_ENDPOINT.to_string(),
            alpaca_data_url: DEFAULT_ALPACA_DATA_URL.to_string(),
            max_daily_loss_pct: -2.0,        // Halt after -2% day
            per_symbol_cap_pct: 5.0,         // Max 5% per symbol
            kelly_fraction_cap: 0.5,         // Half Kelly ceiling
            scheduler_utc_offset_hours: -5,  // New York, standard time
            telegram_bot_token: None,
            telegram_chat_id: None,
        }
    }
}

impl AppConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Unset or empty variables use defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let config = Self {
            alpaca_key: get("ALPACA_KEY"),
            alpaca_secret: get("ALPACA_SECRET"),
            alpaca_endpoint: get("ALPACA_ENDPOINT").unwrap_or(defaults.alpaca_endpoint),
            alpaca_data_url: get("ALPACA_DATA_URL").unwrap_or(defaults.alpaca_data_url),
            max_daily_loss_pct: match get("MAX_DAILY_LOSS_PCT") {
                Some(v) => v.parse().context("Invalid MAX_DAILY_LOSS_PCT")?,
                None => defaults.max_daily_loss_pct,
            },
            per_symbol_cap_pct: match get("PER_SYMBOL_CAP_PCT") {
                Some(v) => v.parse().context("Invalid PER_SYMBOL_CAP_PCT")?,
                None => defaults.per_symbol_cap_pct,
            },
            kelly_fraction_cap: match get("KELLY_FRACTION_CAP") {
                Some(v) => v.parse().context("Invalid KELLY_FRACTION_CAP")?,
                None => defaults.kelly_fraction_cap,
            },
            scheduler_utc_offset_hours: match get("SCHEDULER_UTC_OFFSET_HOURS") {
                Some(v) => v.parse().context("Invalid SCHEDULER_UTC_OFFSET_HOURS")?,
                None => defaults.scheduler_utc_offset_hours,
            },
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: get("TELEGRAM_CHAT_ID"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if self.max_daily_loss_pct.is_nan() || self.max_daily_loss_pct > 0.0 {
            bail!(
                "MAX_DAILY_LOSS_PCT must be <= 0, got {}",
                self.max_daily_loss_pct
            );
        }
        if !(0.0..=1.0).contains(&self.kelly_fraction_cap) {
            bail!(
                "KELLY_FRACTION_CAP must be between 0 and 1, got {}",
                self.kelly_fraction_cap
            );
        }
        if self.per_symbol_cap_pct.is_nan() || self.per_symbol_cap_pct <= 0.0 {
            bail!(
                "PER_SYMBOL_CAP_PCT must be > 0, got {}",
                self.per_symbol_cap_pct
            );
        }
        if !(-12..=14).contains(&self.scheduler_utc_offset_hours) {
            bail!(
                "SCHEDULER_UTC_OFFSET_HOURS must be between -12 and 14, got {}",
                self.scheduler_utc_offset_hours
            );
        }
        if self.alpaca_key.is_some() != self.alpaca_secret.is_some() {
            bail!("ALPACA_KEY and ALPACA_SECRET must be set together");
        }
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        self.alpaca_key.is_some() && self.alpaca_secret.is_some()
    }

    pub fn signal_config(&self) -> SignalConfig {
        SignalConfig {
            kelly_fraction_cap: self.kelly_fraction_cap,
        }
    }

    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            max_daily_loss_pct: self.max_daily_loss_pct,
            per_symbol_cap_pct: self.per_symbol_cap_pct,
            ..RiskConfig::default()
        }
    }

    /// Wall-clock offset used by the job scheduler.
    pub fn scheduler_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.scheduler_utc_offset_hours * 3600)
            .context("Invalid scheduler UTC offset")
    }
}

/// Show the first four characters of a secret.
pub fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        Some(s) if s.chars().count() > 4 => {
            let head: String = s.chars().take(4).collect();
            format!("{head}****")
        }
        Some(_) => "****".to_string(),
        None => "(not set)".to_string(),
    }
}

use std::env;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

fn get_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn get_env_bool(key: &str, default: bool) -> bool {
    match get_env(key) {
        None => default,
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on"),
    }
}

fn get_env_f64(key: &str, default: f64) -> Result<f64> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<f64>()
            .map_err(|e| anyhow!("{key} invalid float: {e}"))?),
    }
}

fn get_env_usize(key: &str, default: usize) -> Result<usize> {
    match get_env(key) {
        None => Ok(default),
        Some(v) => Ok(v
            .parse::<usize>()
            .map_err(|e| anyhow!("{key} invalid int: {e}"))?),
    }
}

fn get_env_string(key: &str, default: &str) -> String {
    get_env(key).unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub run_mode: String, // paper|scan

    // Network
    pub clob_base_url: String,
    pub data_base_url: String,
    pub http_timeout_secs: u64,
    pub max_retries: usize,
    pub min_request_interval_ms: u64,

    // Scanner
    pub scan_interval_secs: u64,
    pub order_size_usdc: f64,
    pub fee_rate_default: f64,

    // Scan filter
    pub min_daily_reward: f64,
    pub min_reward_score: f64,
    pub max_spread_total: f64,
    pub max_competition_usdc: f64,
    pub require_qualifies: bool,
    pub min_hours_to_resolution: f64,

    // Paper engine
    pub initial_capital: f64,
    pub max_markets: usize,

    // Telemetry / storage / dashboard
    pub sqlite_path: String,
    pub dashboard_enabled: bool,
    pub dashboard_host: String,
    pub dashboard_port: u16,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let run_mode = get_env_string("RUN_MODE", "paper").to_lowercase();
        if !matches!(run_mode.as_str(), "paper" | "scan") {
            return Err(anyhow!("RUN_MODE must be paper|scan (got {run_mode})"));
        }

        let s = Self {
            run_mode,
            clob_base_url: get_env_string("CLOB_BASE_URL", "https://clob.polymarket.com"),
            data_base_url: get_env_string("DATA_BASE_URL", "https://data-api.polymarket.com"),
            http_timeout_secs: get_env_usize("HTTP_TIMEOUT_SECS", 10)? as u64,
            max_retries: get_env_usize("MAX_RETRIES", 3)?,
            min_request_interval_ms: get_env_usize("MIN_REQUEST_INTERVAL_MS", 100)? as u64,
            scan_interval_secs: get_env_usize("SCAN_INTERVAL_SECS", 60)? as u64,
            order_size_usdc: get_env_f64("ORDER_SIZE_USDC", 100.0)?,
            fee_rate_default: get_env_f64("FEE_RATE_DEFAULT", 0.0)?,
            min_daily_reward: get_env_f64("MIN_DAILY_REWARD", 0.0)?,
            min_reward_score: get_env_f64("MIN_REWARD_SCORE", 0.0)?,
            max_spread_total: get_env_f64("MAX_SPREAD_TOTAL", 1.0)?,
            max_competition_usdc: get_env_f64("MAX_COMPETITION_USDC", f64::INFINITY)?,
            require_qualifies: get_env_bool("REQUIRE_QUALIFIES", true),
            min_hours_to_resolution: get_env_f64("MIN_HOURS_TO_RESOLUTION", 0.0)?,
            initial_capital: get_env_f64("INITIAL_CAPITAL", 1000.0)?,
            max_markets: get_env_usize("MAX_MARKETS", 10)?,
            sqlite_path: get_env_string("SQLITE_PATH", "./data/rewardscout.sqlite"),
            dashboard_enabled: get_env_bool("DASHBOARD_ENABLED", true),
            dashboard_host: get_env_string("DASHBOARD_HOST", "127.0.0.1"),
            dashboard_port: get_env_usize("DASHBOARD_PORT", 8000)? as u16,
        };

        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_secs < 1 {
            return Err(anyhow!(
                "SCAN_INTERVAL_SECS must be >= 1 (got {})",
                self.scan_interval_secs
            ));
        }
        if !self.order_size_usdc.is_finite() || self.order_size_usdc <= 0.0 {
            return Err(anyhow!(
                "ORDER_SIZE_USDC must be > 0 (got {})",
                self.order_size_usdc
            ));
        }
        if !self.fee_rate_default.is_finite() || self.fee_rate_default < 0.0 {
            return Err(anyhow!(
                "FEE_RATE_DEFAULT must be >= 0 (got {})",
                self.fee_rate_default
            ));
        }
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(anyhow!(
                "INITIAL_CAPITAL must be > 0 (got {})",
                self.initial_capital
            ));
        }
        if self.max_markets < 1 {
            return Err(anyhow!("MAX_MARKETS must be >= 1 (got {})", self.max_markets));
        }
        if self.http_timeout_secs < 1 {
            return Err(anyhow!(
                "HTTP_TIMEOUT_SECS must be >= 1 (got {})",
                self.http_timeout_secs
            ));
        }
        if !self.max_spread_total.is_finite() || self.max_spread_total <= 0.0 {
            return Err(anyhow!(
                "MAX_SPREAD_TOTAL must be > 0 (got {})",
                self.max_spread_total
            ));
        }
        if self.min_hours_to_resolution < 0.0 {
            return Err(anyhow!(
                "MIN_HOURS_TO_RESOLUTION must be >= 0 (got {})",
                self.min_hours_to_resolution
            ));
        }
        if self.sqlite_path.trim().is_empty() {
            return Err(anyhow!("SQLITE_PATH is empty"));
        }
        Ok(())
    }
}

/// Baseline settings for unit tests across the crate.
#[cfg(test)]
pub(crate) fn tests_settings() -> Settings {
    Settings {
        run_mode: "paper".into(),
        clob_base_url: "https://clob.example".into(),
        data_base_url: "https://data.example".into(),
        http_timeout_secs: 10,
        max_retries: 3,
        min_request_interval_ms: 100,
        scan_interval_secs: 60,
        order_size_usdc: 100.0,
        fee_rate_default: 0.0,
        min_daily_reward: 0.0,
        min_reward_score: 0.0,
        max_spread_total: 1.0,
        max_competition_usdc: f64::INFINITY,
        require_qualifies: true,
        min_hours_to_resolution: 0.0,
        initial_capital: 1000.0,
        max_markets: 10,
        sqlite_path: ":memory:".into(),
        dashboard_enabled: false,
        dashboard_host: "127.0.0.1".into(),
        dashboard_port: 8000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Settings {
        tests_settings()
    }

    #[test]
    fn valid_settings_pass() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn bad_order_size_rejected() {
        let mut s = base();
        s.order_size_usdc = 0.0;
        assert!(s.validate().is_err());
        s.order_size_usdc = f64::NAN;
        assert!(s.validate().is_err());
    }

    #[test]
    fn bad_capital_rejected() {
        let mut s = base();
        s.initial_capital = -5.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn zero_max_markets_rejected() {
        let mut s = base();
        s.max_markets = 0;
        assert!(s.validate().is_err());
    }
}

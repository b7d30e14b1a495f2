use anyhow::{ Context, Result };
use dotenv::dotenv;
use serde::{ Deserialize, Serialize };
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

use crate::error::ArbError;
use crate::utils::serde_helpers::{ deserialize_level, parse_level, serialize_level };

const ENV_PREFIX: &str = "TRIARB_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub debug: bool,

    #[serde(skip_serializing, default)]
    pub api_key: String,
    #[serde(skip_serializing, default)]
    pub api_secret: String,
    pub testnet: bool,

    /// Send admitted opportunities to the order gateway at all
    pub execution_enabled: bool,
    /// Orders go to the validation endpoint only
    pub test_mode: bool,
    /// Orders are simulated locally
    pub paper_trading: bool,
    pub paper_success_rate: f64,
    pub paper_latency_ms: u64,

    pub fee_standard: f64,
    pub fee_discounted: f64,
    pub fee_discount_coin: String,

    pub staleness_threshold_ms: u64,
    pub sweep_interval_ms: u64,
    pub report_retention_ms: u64,
    pub profit_bucket_bps: f64,
    pub min_scan_interval_ms: u64,
    pub dispatch_capacity: usize,

    pub min_profit: f64,
    pub trade_asset: String,
    pub trade_amount: f64,
    pub settlement_delay_ms: u64,
    pub order_timeout_ms: u64,
    pub balance_refresh_ms: u64,

    pub excluded_coins: Vec<String>,
    pub events_path: PathBuf,
    pub reports_path: PathBuf,

    #[serde(serialize_with = "serialize_level", deserialize_with = "deserialize_level")]
    pub log_level: Level,
    pub log_config: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub directory: PathBuf,
    pub filename_prefix: String,
    pub rotation: LogRotation,
    pub max_files: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

/// Reads `TRIARB_<name>` through the lookup, falling back to `default`
struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F> where F: Fn(&str) -> Option<String> {
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.raw(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T>
        where T: FromStr, T::Err: std::error::Error + Send + Sync + 'static
    {
        match self.raw(name) {
            Some(value) =>
                value
                    .trim()
                    .parse::<T>()
                    .with_context(|| format!("Failed to parse {}{}={}", ENV_PREFIX, name, value)),
            None => Ok(default),
        }
    }

    fn list(&self, name: &str, default: &str) -> Vec<String> {
        self.string(name, default)
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load environment variables from .env file
        match dotenv() {
            Ok(path) => {
                println!("Loaded .env file from: {}", path.display());
            }
            Err(e) => {
                println!("Warning: Could not load .env file: {}", e);
            }
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup, used by `from_env` and tests
    pub fn from_lookup<F>(lookup: F) -> Result<Self> where F: Fn(&str) -> Option<String> {
        let vars = Vars { lookup };

        let log_level_str = vars.string("LOG_LEVEL", "info");
        let log_level = parse_level(&log_level_str).unwrap_or(Level::INFO);

        let log_rotation = match vars.string("LOG_ROTATION", "daily").to_lowercase().as_str() {
            "hourly" => LogRotation::Hourly,
            "never" => LogRotation::Never,
            _ => LogRotation::Daily,
        };

        let log_config = LogConfig {
            directory: PathBuf::from(vars.string("LOG_DIRECTORY", "logs")),
            filename_prefix: vars.string("LOG_FILENAME_PREFIX", "tri_arb"),
            rotation: log_rotation,
            max_files: vars.raw("LOG_MAX_FILES").and_then(|s| s.trim().parse::<usize>().ok()),
        };

        let default_fiats = "USD,EUR,GBP,JPY,AUD,CAD,CHF,CNY,RUB,TRY";

        let config = Config {
            debug: vars.parse("DEBUG", false)?,
            api_key: vars.string("API_KEY", ""),
            api_secret: vars.string("API_SECRET", ""),
            testnet: vars.parse("TESTNET", false)?,
            execution_enabled: vars.parse("EXECUTION_ENABLED", false)?,
            test_mode: vars.parse("TEST_MODE", true)?,
            paper_trading: vars.parse("PAPER_TRADING", false)?,
            paper_success_rate: vars.parse("PAPER_SUCCESS_RATE", 0.95)?,
            paper_latency_ms: vars.parse("PAPER_LATENCY_MS", 20)?,
            fee_standard: vars.parse("FEE_STANDARD", 0.001)?,
            fee_discounted: vars.parse("FEE_DISCOUNTED", 0.00075)?,
            fee_discount_coin: vars.string("FEE_DISCOUNT_COIN", "BNB").to_uppercase(),
            staleness_threshold_ms: vars.parse("STALENESS_THRESHOLD_MS", 100)?,
            sweep_interval_ms: vars.parse("SWEEP_INTERVAL_MS", 20)?,
            report_retention_ms: vars.parse("REPORT_RETENTION_MS", 5000)?,
            profit_bucket_bps: vars.parse("PROFIT_BUCKET_BPS", 1.0)?,
            min_scan_interval_ms: vars.parse("MIN_SCAN_INTERVAL_MS", 0)?,
            dispatch_capacity: vars.parse("DISPATCH_CAPACITY", 1024)?,
            min_profit: vars.parse("MIN_PROFIT", 0.0005)?,
            trade_asset: vars.string("TRADE_ASSET", "USDT").to_uppercase(),
            trade_amount: vars.parse("TRADE_AMOUNT", 100.0)?,
            settlement_delay_ms: vars.parse("SETTLEMENT_DELAY_MS", 100)?,
            order_timeout_ms: vars.parse("ORDER_TIMEOUT_MS", 5000)?,
            balance_refresh_ms: vars.parse("BALANCE_REFRESH_MS", 5000)?,
            excluded_coins: vars.list("EXCLUDED_COINS", default_fiats),
            events_path: PathBuf::from(vars.string("EVENTS_PATH", "data/order_events.jsonl")),
            reports_path: PathBuf::from(vars.string("REPORTS_PATH", "data/opportunities.jsonl")),
            log_level,
            log_config,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ArbError> {
        let fee_ok = |fee: f64| (0.0..1.0).contains(&fee);
        if !fee_ok(self.fee_standard) || !fee_ok(self.fee_discounted) {
            return Err(ArbError::Config("fee rates must be in [0, 1)".into()));
        }
        if !(self.profit_bucket_bps > 0.0) {
            return Err(ArbError::Config("PROFIT_BUCKET_BPS must be positive".into()));
        }
        if !(self.trade_amount > 0.0) {
            return Err(ArbError::Config("TRADE_AMOUNT must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.paper_success_rate) {
            return Err(ArbError::Config("PAPER_SUCCESS_RATE must be in [0, 1]".into()));
        }
        let zero = [
            ("DISPATCH_CAPACITY", self.dispatch_capacity as u64),
            ("SWEEP_INTERVAL_MS", self.sweep_interval_ms),
            ("BALANCE_REFRESH_MS", self.balance_refresh_ms),
            ("ORDER_TIMEOUT_MS", self.order_timeout_ms),
        ]
            .into_iter()
            .find(|(_, value)| *value == 0);
        if let Some((name, _)) = zero {
            return Err(ArbError::Config(format!("{} must be non-zero", name)));
        }
        if self.execution_enabled && !self.paper_trading && (self.api_key.is_empty() || self.api_secret.is_empty()) {
            return Err(ArbError::Config("API_KEY and API_SECRET are required for execution".into()));
        }
        Ok(())
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn report_retention(&self) -> Duration {
        Duration::from_millis(self.report_retention_ms)
    }

    pub fn min_scan_interval(&self) -> Duration {
        Duration::from_millis(self.min_scan_interval_ms)
    }

    pub fn settlement_delay(&self) -> Duration {
        Duration::from_millis(self.settlement_delay_ms)
    }

    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }

    pub fn balance_refresh(&self) -> Duration {
        Duration::from_millis(self.balance_refresh_ms)
    }

    pub fn paper_latency(&self) -> Duration {
        Duration::from_millis(self.paper_latency_ms)
    }
}

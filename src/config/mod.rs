//! Configuration management module

pub mod settings;

pub use settings::*;

use crate::{PairTradingError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the pair trading system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairTradingConfig {
    /// Strategy configuration
    pub strategy: StrategyConfig,
    /// Relationship test configuration
    pub relationship: RelationshipConfig,
    /// Phase scheduling configuration
    pub schedule: ScheduleConfig,
    /// Exchange configuration
    pub exchange: ExchangeConfig,
    /// Monitoring configuration
    pub monitoring: MonitoringConfig,
}

/// Strategy-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Quote asset used to filter the tradable universe
    pub quote_asset: String,
    /// Hourly bars required for screening
    pub hourly_bars: usize,
    /// Four-hourly bars required for screening
    pub four_hour_bars: usize,
    /// Hourly bars fetched for z-score evaluation
    pub zscore_bars: usize,
    /// Rolling window of the z-score
    pub zscore_window: usize,
    /// Absolute z-score that triggers side selection
    pub entry_zscore: f64,
    /// Maximum simultaneously open pairs
    pub max_open_pairs: usize,
    /// Fraction of the account balance allocated to each leg
    pub allocation_fraction: f64,
    /// Holding period after which an open pair is closed
    pub max_holding_hours: u64,
    /// Maximum distance between the two opening fills of a reconciled pair
    pub reconcile_window_ms: i64,
}

/// Relationship test configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipConfig {
    /// Lag counts of the augmented Dickey-Fuller regressions
    pub adf_lags: Vec<usize>,
    /// Test statistic must be below this value
    pub max_statistic: f64,
    /// p-value must be below this value
    pub max_p_value: f64,
}

/// Phase scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Screen phase period in seconds
    pub screen_interval_secs: u64,
    /// Select-side phase period in seconds
    pub select_interval_secs: u64,
    /// Open and close phase period in seconds
    pub trade_interval_secs: u64,
}

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// REST API URL
    pub rest_api_url: String,
    /// Testnet REST API URL
    pub testnet_rest_api_url: Option<String>,
    /// Enable testnet
    pub testnet: bool,
    /// API key
    pub api_key: String,
    /// Secret key
    pub secret_key: String,
    /// Receive window for signed requests in milliseconds
    pub recv_window_ms: u64,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Product category
    pub category: String,
    /// Settlement coin for positions and order history
    pub settle_coin: String,
    /// Wallet account type
    pub account_type: String,
    /// Page size of the order history
    pub history_page_limit: u32,
    /// Page size of the position list
    pub position_page_limit: u32,
}

/// Monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable the Prometheus exporter
    pub enable_metrics: bool,
    /// Exporter listen address
    pub metrics_listen_addr: String,
}

impl PairTradingConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| PairTradingError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: PairTradingConfig = toml::from_str(&content)
            .map_err(|e| PairTradingError::Config(format!("Failed to parse config: {}", e)))?;

        config.expand_env_vars()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let strategy = &self.strategy;
        ConfigValidator::validate_symbol(&strategy.quote_asset)?;
        ConfigValidator::validate_positive(strategy.entry_zscore, "Entry z-score")?;
        ConfigValidator::validate_fraction(strategy.allocation_fraction, "Allocation fraction")?;

        if strategy.hourly_bars == 0 || strategy.four_hour_bars == 0 {
            return Err(PairTradingError::Config("Screening bar counts must be greater than 0".to_string()).into());
        }

        if strategy.zscore_window == 0 {
            return Err(PairTradingError::Config("Z-score window must be greater than 0".to_string()).into());
        }

        if strategy.zscore_bars < strategy.zscore_window {
            return Err(PairTradingError::Config(
                "Z-score bars must cover the z-score window".to_string()
            ).into());
        }

        if strategy.max_open_pairs == 0 {
            return Err(PairTradingError::Config("Maximum open pairs must be greater than 0".to_string()).into());
        }

        if strategy.max_holding_hours == 0 {
            return Err(PairTradingError::Config("Holding period must be greater than 0".to_string()).into());
        }

        if strategy.reconcile_window_ms <= 0 {
            return Err(PairTradingError::Config("Reconcile window must be positive".to_string()).into());
        }

        if self.relationship.adf_lags.is_empty() {
            return Err(PairTradingError::Config("At least one ADF lag is required".to_string()).into());
        }
        ConfigValidator::validate_fraction(self.relationship.max_p_value, "Maximum p-value")?;

        let schedule = &self.schedule;
        if schedule.screen_interval_secs == 0
            || schedule.select_interval_secs == 0
            || schedule.trade_interval_secs == 0
        {
            return Err(PairTradingError::Config("Phase intervals must be greater than 0".to_string()).into());
        }

        ConfigValidator::validate_url(self.exchange.rest_url(), "REST API URL")?;
        if self.exchange.recv_window_ms == 0 {
            return Err(PairTradingError::Config("Receive window must be greater than 0".to_string()).into());
        }

        Ok(())
    }

    /// Expand `${VAR}` references in string settings
    fn expand_env_vars(&mut self) -> Result<()> {
        let exchange = &mut self.exchange;
        exchange.api_key = EnvExpander::expand(&exchange.api_key)?;
        exchange.secret_key = EnvExpander::expand(&exchange.secret_key)?;
        exchange.rest_api_url = EnvExpander::expand(&exchange.rest_api_url)?;
        if let Some(url) = exchange.testnet_rest_api_url.as_mut() {
            *url = EnvExpander::expand(url)?;
        }
        self.monitoring.metrics_listen_addr = EnvExpander::expand(&self.monitoring.metrics_listen_addr)?;
        Ok(())
    }
}

impl StrategyConfig {
    /// Holding period as a chrono duration
    pub fn max_holding(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_holding_hours as i64)
    }
}

impl ScheduleConfig {
    /// Screen phase period
    pub fn screen_interval(&self) -> Duration {
        Duration::from_secs(self.screen_interval_secs)
    }

    /// Select-side phase period
    pub fn select_interval(&self) -> Duration {
        Duration::from_secs(self.select_interval_secs)
    }

    /// Open and close phase period
    pub fn trade_interval(&self) -> Duration {
        Duration::from_secs(self.trade_interval_secs)
    }
}

impl ExchangeConfig {
    /// REST URL honoring the testnet switch
    pub fn rest_url(&self) -> &str {
        if self.testnet {
            self.testnet_rest_api_url.as_deref().unwrap_or(&self.rest_api_url)
        } else {
            &self.rest_api_url
        }
    }

    /// Whether both credentials are present
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }
}

impl Default for PairTradingConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyConfig {
                quote_asset: "USDT".to_string(),
                hourly_bars: ConfigDefaults::HOURLY_BARS,
                four_hour_bars: ConfigDefaults::FOUR_HOUR_BARS,
                zscore_bars: ConfigDefaults::ZSCORE_WINDOW,
                zscore_window: ConfigDefaults::ZSCORE_WINDOW,
                entry_zscore: ConfigDefaults::ENTRY_ZSCORE,
                max_open_pairs: ConfigDefaults::MAX_OPEN_PAIRS,
                allocation_fraction: ConfigDefaults::ALLOCATION_FRACTION,
                max_holding_hours: ConfigDefaults::MAX_HOLDING_HOURS,
                reconcile_window_ms: ConfigDefaults::RECONCILE_WINDOW_MS,
            },
            relationship: RelationshipConfig {
                adf_lags: vec![2, 3],
                max_statistic: ConfigDefaults::ADF_MAX_STATISTIC,
                max_p_value: ConfigDefaults::ADF_MAX_P_VALUE,
            },
            schedule: ScheduleConfig {
                screen_interval_secs: ConfigDefaults::SCREEN_INTERVAL_SECS,
                select_interval_secs: ConfigDefaults::SELECT_INTERVAL_SECS,
                trade_interval_secs: ConfigDefaults::TRADE_INTERVAL_SECS,
            },
            exchange: ExchangeConfig {
                rest_api_url: "https://api.bybit.com".to_string(),
                testnet_rest_api_url: Some("https://api-testnet.bybit.com".to_string()),
                testnet: false,
                api_key: String::new(),
                secret_key: String::new(),
                recv_window_ms: ConfigDefaults::RECV_WINDOW_MS,
                request_timeout_secs: ConfigDefaults::REQUEST_TIMEOUT_SECS,
                category: "linear".to_string(),
                settle_coin: "USDT".to_string(),
                account_type: "CONTRACT".to_string(),
                history_page_limit: 50,
                position_page_limit: 200,
            },
            monitoring: MonitoringConfig {
                enable_metrics: false,
                metrics_listen_addr: "0.0.0.0:9000".to_string(),
            },
        }
    }
}

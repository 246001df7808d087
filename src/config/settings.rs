//! Settings management utilities

use crate::{PairTradingError, Result};
use std::env;

/// Environment variable expansion utility
pub struct EnvExpander;

impl EnvExpander {
    /// Expand environment variables in a string
    /// Supports the ${VAR_NAME} pattern
    pub fn expand(input: &str) -> Result<String> {
        let mut result = input.to_string();

        while let Some(start) = result.find("${") {
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 2..start + end];
                let var_value = env::var(var_name)
                    .map_err(|_| PairTradingError::Config(
                        format!("Environment variable '{}' not found", var_name)
                    ))?;

                result.replace_range(start..start + end + 1, &var_value);
            } else {
                return Err(PairTradingError::Config(
                    "Unclosed environment variable reference".to_string()
                ).into());
            }
        }

        Ok(result)
    }
}

/// Configuration validation utilities
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a symbol or asset code
    pub fn validate_symbol(symbol: &str) -> Result<()> {
        if symbol.is_empty() {
            return Err(PairTradingError::Config("Symbol cannot be empty".to_string()).into());
        }

        if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PairTradingError::Config(
                "Symbol must contain only alphanumeric characters".to_string()
            ).into());
        }

        Ok(())
    }

    /// Validate a fraction in (0.0, 1.0]
    pub fn validate_fraction(value: f64, name: &str) -> Result<()> {
        if !(value > 0.0 && value <= 1.0) {
            return Err(PairTradingError::Config(
                format!("{} must be in (0.0, 1.0]", name)
            ).into());
        }
        Ok(())
    }

    /// Validate a positive value
    pub fn validate_positive(value: f64, name: &str) -> Result<()> {
        if value <= 0.0 {
            return Err(PairTradingError::Config(
                format!("{} must be positive", name)
            ).into());
        }
        Ok(())
    }

    /// Validate a URL format
    pub fn validate_url(url: &str, name: &str) -> Result<()> {
        if url.is_empty() {
            return Err(PairTradingError::Config(
                format!("{} cannot be empty", name)
            ).into());
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PairTradingError::Config(
                format!("{} must be a valid URL", name)
            ).into());
        }

        Ok(())
    }
}

/// Configuration defaults
pub struct ConfigDefaults;

impl ConfigDefaults {
    /// Hourly bars required for screening
    pub const HOURLY_BARS: usize = 720;

    /// Four-hourly bars required for screening
    pub const FOUR_HOUR_BARS: usize = 180;

    /// Z-score rolling window
    pub const ZSCORE_WINDOW: usize = 20;

    /// Entry threshold in standard deviations
    pub const ENTRY_ZSCORE: f64 = 2.0;

    /// Simultaneously open pairs
    pub const MAX_OPEN_PAIRS: usize = 10;

    /// Share of the balance given to each leg
    pub const ALLOCATION_FRACTION: f64 = 0.3;

    /// Three days
    pub const MAX_HOLDING_HOURS: u64 = 72;

    /// Opening fills of one pair land within this many milliseconds
    pub const RECONCILE_WINDOW_MS: i64 = 3000;

    /// ADF statistic ceiling
    pub const ADF_MAX_STATISTIC: f64 = -4.0;

    /// ADF p-value ceiling
    pub const ADF_MAX_P_VALUE: f64 = 0.05;

    /// Screen phase period (3 hours)
    pub const SCREEN_INTERVAL_SECS: u64 = 3 * 60 * 60;

    /// Select-side phase period (3 minutes)
    pub const SELECT_INTERVAL_SECS: u64 = 3 * 60;

    /// Open and close phase period
    pub const TRADE_INTERVAL_SECS: u64 = 30;

    /// Signed request receive window
    pub const RECV_WINDOW_MS: u64 = 20_000;

    /// HTTP timeout
    pub const REQUEST_TIMEOUT_SECS: u64 = 10;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_env_expansion() {
        env::set_var("PAIR_SETTINGS_TEST_VAR", "test_value");

        let input = "prefix_${PAIR_SETTINGS_TEST_VAR}_suffix";
        let result = EnvExpander::expand(input).unwrap();
        assert_eq!(result, "prefix_test_value_suffix");

        env::remove_var("PAIR_SETTINGS_TEST_VAR");
    }

    #[test]
    fn test_env_expansion_missing_var() {
        let input = "prefix_${PAIR_SETTINGS_MISSING_VAR}_suffix";
        assert!(EnvExpander::expand(input).is_err());
        assert!(EnvExpander::expand("${UNCLOSED").is_err());
        assert_eq!(EnvExpander::expand("plain").unwrap(), "plain");
    }

    #[test]
    fn test_symbol_validation() {
        assert!(ConfigValidator::validate_symbol("USDT").is_ok());
        assert!(ConfigValidator::validate_symbol("").is_err());
        assert!(ConfigValidator::validate_symbol("BTC-USDT").is_err());
    }

    #[test]
    fn test_fraction_validation() {
        assert!(ConfigValidator::validate_fraction(0.3, "test").is_ok());
        assert!(ConfigValidator::validate_fraction(1.0, "test").is_ok());
        assert!(ConfigValidator::validate_fraction(0.0, "test").is_err());
        assert!(ConfigValidator::validate_fraction(1.1, "test").is_err());
        assert!(ConfigValidator::validate_fraction(f64::NAN, "test").is_err());
    }

    #[test]
    fn test_positive_validation() {
        assert!(ConfigValidator::validate_positive(2.0, "test").is_ok());
        assert!(ConfigValidator::validate_positive(0.0, "test").is_err());
        assert!(ConfigValidator::validate_positive(-1.0, "test").is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(ConfigValidator::validate_url("https://api.bybit.com", "test").is_ok());
        assert!(ConfigValidator::validate_url("http://127.0.0.1:8080", "test").is_ok());
        assert!(ConfigValidator::validate_url("", "test").is_err());
        assert!(ConfigValidator::validate_url("wss://stream.bybit.com", "test").is_err());
    }
}

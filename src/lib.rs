//! Pair Lifecycle Orchestrator
//!
//! A statistical-arbitrage trading system for pairs of instruments on a margin exchange.
//! Pairs are screened for a mean-reverting relationship, entered when the price ratio
//! deviates and closed when it reverts, times out or the relationship breaks down.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connectors;
pub mod strategy;
pub mod trading;
pub mod utils;

// Re-export commonly used types
pub use config::PairTradingConfig;
pub use connectors::{BybitConnector, ExchangeGateway};
pub use strategy::{PairOrchestrator, PhaseScheduler, TradePair};
pub use trading::DryRunGateway;

/// Result type used throughout the application
pub type Result<T> = anyhow::Result<T>;

/// Common error types for the pair trading system
#[derive(thiserror::Error, Debug)]
pub enum PairTradingError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed numeric or enum field received from the exchange
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Exchange rejected the request
    #[error("Exchange error code: {code} message: {message}")]
    Exchange {
        /// HTTP status or exchange return code
        code: i64,
        /// Exchange message
        message: String,
    },

    /// Not enough price history to evaluate an instrument
    #[error("Insufficient data: {0}")]
    EmptyData(String),

    /// Pair state machine used out of order
    #[error("Invalid pair transition: {0}")]
    InvalidTransition(String),

    /// Trading error
    #[error("Trading error: {0}")]
    Trading(String),
}

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

//! Exchange gateway implementations

pub mod auth;
pub mod bybit;
pub mod traits;

pub use bybit::BybitConnector;
pub use traits::*;

/// Kline intervals used by the strategy, in minutes
pub mod interval {
    /// One hour
    pub const HOURLY: u32 = 60;
    /// Four hours
    pub const FOUR_HOURLY: u32 = 240;
}

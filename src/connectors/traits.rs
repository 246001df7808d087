//! Market/account gateway trait and common types

use crate::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market and account access consumed by the pair orchestrator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Tradable symbols quoted in the configured asset, ascending by 24h volume
    async fn list_tradable_pairs(&self) -> Result<Vec<String>>;

    /// Closing prices, most recent first, at most `count` values
    async fn get_price_series(&self, symbol: &str, interval_minutes: u32, count: usize) -> Result<Vec<f64>>;

    /// Minimum order-size increment of an instrument
    async fn get_instrument_step(&self, symbol: &str) -> Result<Decimal>;

    /// Wallet balance in the quote asset
    async fn get_account_balance(&self) -> Result<Decimal>;

    /// Symbols with an open position
    async fn list_open_positions(&self) -> Result<Vec<String>>;

    /// One page of order history, newest first
    async fn get_trade_history_page(&self, cursor: Option<String>) -> Result<TradeHistoryPage>;

    /// Place a market order
    async fn place_order(&self, order: &MarketOrder) -> Result<OrderAck>;
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl OrderSide {
    /// Exchange wire name
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderSide {
    type Err = crate::PairTradingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Buy" => Ok(OrderSide::Buy),
            "Sell" => Ok(OrderSide::Sell),
            _ => Err(crate::PairTradingError::ParseError(format!("Cant parse {} to side", s))),
        }
    }
}

/// Market order request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOrder {
    /// Trading symbol
    pub symbol: String,
    /// Order side
    pub side: OrderSide,
    /// Order quantity
    pub quantity: Decimal,
    /// Only decrease an existing position
    pub reduce_only: bool,
}

/// Order acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    /// Exchange order ID
    pub order_id: String,
    /// Client order ID
    pub client_order_id: Option<String>,
}

/// Filled order from the account history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Trading symbol
    pub symbol: String,
    /// Order side
    pub side: OrderSide,
    /// Order quantity
    pub quantity: Decimal,
    /// Creation time in milliseconds since the epoch
    pub created_time_ms: i64,
}

/// One page of the order history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeHistoryPage {
    /// Records, newest first
    pub records: Vec<TradeRecord>,
    /// Cursor of the next page, if any
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_side_display() {
        assert_eq!(OrderSide::Buy.to_string(), "Buy");
        assert_eq!(OrderSide::Sell.to_string(), "Sell");
    }

    #[test]
    fn test_order_side_parse() {
        assert_eq!("Buy".parse::<OrderSide>().unwrap(), OrderSide::Buy);
        assert_eq!("Sell".parse::<OrderSide>().unwrap(), OrderSide::Sell);
        assert!("BUY".parse::<OrderSide>().is_err());
    }
}

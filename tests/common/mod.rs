//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pair_lifecycle::{
    connectors::{interval, ExchangeGateway, MarketOrder, OrderAck, OrderSide, TradeHistoryPage},
    strategy::{Legs, PairOrchestrator, RelationshipTest, TradePair},
    PairTradingConfig, PairTradingError, Result,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Scripted exchange state
#[derive(Default)]
pub struct FakeState {
    /// Tradable universe in listing order
    pub universe: Vec<String>,
    /// Full history per (symbol, interval), most recent first
    pub series: HashMap<(String, u32), Vec<f64>>,
    /// Short hourly requests are served from here when present
    pub recent: HashMap<String, Vec<f64>>,
    pub steps: HashMap<String, Decimal>,
    pub balance: Decimal,
    pub positions: Vec<String>,
    /// History pages keyed by the cursor that requests them
    pub history: HashMap<Option<String>, TradeHistoryPage>,
    pub orders: Vec<MarketOrder>,
    pub calls: Vec<&'static str>,
    pub fail_prices_for: HashSet<String>,
    pub fail_orders_for: HashSet<String>,
    pub fail_universe: bool,
    pub fail_positions: bool,
}

/// In-memory gateway driven by [`FakeState`]
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Register an instrument with full hourly and four-hourly history whose latest price is `tag`
    pub fn add_instrument(&self, symbol: &str, tag: f64) {
        self.with(|s| {
            s.universe.push(symbol.to_string());
            s.series.insert((symbol.to_string(), interval::HOURLY), history(tag, 720));
            s.series.insert((symbol.to_string(), interval::FOUR_HOURLY), history(tag, 180));
            s.steps.insert(symbol.to_string(), dec!(0.01));
        });
    }

    pub fn set_recent(&self, symbol: &str, prices: Vec<f64>) {
        self.with(|s| s.recent.insert(symbol.to_string(), prices));
    }

    pub fn orders(&self) -> Vec<MarketOrder> {
        self.with(|s| s.orders.clone())
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.with(|s| s.calls.iter().filter(|c| **c == name).count())
    }
}

fn history(tag: f64, len: usize) -> Vec<f64> {
    let mut prices = vec![tag; len];
    for (i, price) in prices.iter_mut().enumerate().skip(1) {
        *price = tag + (i % 7) as f64 * 0.01;
    }
    prices
}

#[async_trait]
impl ExchangeGateway for FakeGateway {
    async fn list_tradable_pairs(&self) -> Result<Vec<String>> {
        self.with(|s| -> Result<Vec<String>> {
            s.calls.push("list_tradable_pairs");
            if s.fail_universe {
                return Err(PairTradingError::Connection("tickers unavailable".to_string()).into());
            }
            Ok(s.universe.clone())
        })
    }

    async fn get_price_series(&self, symbol: &str, interval_minutes: u32, count: usize) -> Result<Vec<f64>> {
        self.with(|s| -> Result<Vec<f64>> {
            s.calls.push("get_price_series");
            if s.fail_prices_for.contains(symbol) {
                return Err(PairTradingError::Connection(format!("no klines for {}", symbol)).into());
            }
            if interval_minutes == interval::HOURLY && count <= 20 {
                if let Some(recent) = s.recent.get(symbol) {
                    return Ok(recent.iter().take(count).copied().collect());
                }
            }
            let series = s
                .series
                .get(&(symbol.to_string(), interval_minutes))
                .cloned()
                .unwrap_or_default();
            Ok(series.into_iter().take(count).collect())
        })
    }

    async fn get_instrument_step(&self, symbol: &str) -> Result<Decimal> {
        self.with(|s| -> Result<Decimal> {
            s.calls.push("get_instrument_step");
            s.steps
                .get(symbol)
                .copied()
                .ok_or_else(|| PairTradingError::EmptyData(format!("no step for {}", symbol)).into())
        })
    }

    async fn get_account_balance(&self) -> Result<Decimal> {
        self.with(|s| -> Result<Decimal> {
            s.calls.push("get_account_balance");
            Ok(s.balance)
        })
    }

    async fn list_open_positions(&self) -> Result<Vec<String>> {
        self.with(|s| -> Result<Vec<String>> {
            s.calls.push("list_open_positions");
            if s.fail_positions {
                return Err(PairTradingError::Exchange {
                    code: 10003,
                    message: "API key is invalid.".to_string(),
                }
                .into());
            }
            Ok(s.positions.clone())
        })
    }

    async fn get_trade_history_page(&self, cursor: Option<String>) -> Result<TradeHistoryPage> {
        self.with(|s| -> Result<TradeHistoryPage> {
            s.calls.push("get_trade_history_page");
            Ok(s.history.get(&cursor).cloned().unwrap_or_default())
        })
    }

    async fn place_order(&self, order: &MarketOrder) -> Result<OrderAck> {
        self.with(|s| -> Result<OrderAck> {
            s.calls.push("place_order");
            if s.fail_orders_for.contains(&order.symbol) {
                return Err(PairTradingError::Exchange {
                    code: 110007,
                    message: "ab not enough for new order".to_string(),
                }
                .into());
            }
            s.orders.push(order.clone());
            Ok(OrderAck {
                order_id: format!("order-{}", s.orders.len()),
                client_order_id: None,
            })
        })
    }
}

/// Relationship decided per pair of latest prices, in either order
#[derive(Default)]
pub struct FixedRelationship {
    passing: Mutex<HashSet<(u64, u64)>>,
}

impl FixedRelationship {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, tag_a: f64, tag_b: f64, passes: bool) {
        let mut passing = self.passing.lock().unwrap();
        for key in [(tag_a.to_bits(), tag_b.to_bits()), (tag_b.to_bits(), tag_a.to_bits())] {
            if passes {
                passing.insert(key);
            } else {
                passing.remove(&key);
            }
        }
    }
}

impl RelationshipTest for FixedRelationship {
    fn is_cointegrated(&self, series_a: &[f64], series_b: &[f64]) -> bool {
        match (series_a.first(), series_b.first()) {
            (Some(a), Some(b)) => self.passing.lock().unwrap().contains(&(a.to_bits(), b.to_bits())),
            _ => false,
        }
    }
}

pub fn orchestrator(gateway: &Arc<FakeGateway>, relationship: &Arc<FixedRelationship>) -> PairOrchestrator {
    PairOrchestrator::new(
        gateway.clone(),
        relationship.clone(),
        PairTradingConfig::default().strategy,
    )
}

pub fn names(a: &str, b: &str) -> Legs<String> {
    Legs::new(a.to_string(), b.to_string())
}

/// An open pair entered `hours_ago`
pub fn open_pair(a: &str, b: &str, sides: Legs<OrderSide>, volumes: Legs<Decimal>, hours_ago: i64) -> TradePair {
    TradePair::reconciled(names(a, b), sides, volumes, Utc::now() - Duration::hours(hours_ago)).unwrap()
}

/// Twenty hourly prices; against a flat leg the ratio scores about +0.5 for 1.25 and -0.5 for 0.75
pub fn mild_up(latest: f64) -> Vec<f64> {
    let mut prices = vec![latest, 1.0];
    prices.extend(vec![1.5; 9]);
    prices.extend(vec![0.5; 9]);
    prices
}

/// Twenty hourly prices with a spike on the latest bar
pub fn spike(latest: f64) -> Vec<f64> {
    let mut prices = vec![latest];
    prices.extend(vec![1.0; 19]);
    prices
}

pub fn flat() -> Vec<f64> {
    vec![1.0; 20]
}

//! Dry-run gateway: real market data, simulated orders

use crate::{
    connectors::{ExchangeGateway, MarketOrder, OrderAck, TradeHistoryPage},
    log_order,
    Result,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Forwards every read to the wrapped gateway and acknowledges orders locally
pub struct DryRunGateway {
    inner: Arc<dyn ExchangeGateway>,
    /// Orders acknowledged so far
    executed: Arc<RwLock<Vec<(MarketOrder, OrderAck)>>>,
}

impl DryRunGateway {
    /// Wrap a gateway
    pub fn new(inner: Arc<dyn ExchangeGateway>) -> Self {
        Self {
            inner,
            executed: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Orders acknowledged so far, oldest first
    pub async fn executed_orders(&self) -> Vec<(MarketOrder, OrderAck)> {
        self.executed.read().await.clone()
    }
}

#[async_trait]
impl ExchangeGateway for DryRunGateway {
    async fn list_tradable_pairs(&self) -> Result<Vec<String>> {
        self.inner.list_tradable_pairs().await
    }

    async fn get_price_series(&self, symbol: &str, interval_minutes: u32, count: usize) -> Result<Vec<f64>> {
        self.inner.get_price_series(symbol, interval_minutes, count).await
    }

    async fn get_instrument_step(&self, symbol: &str) -> Result<Decimal> {
        self.inner.get_instrument_step(symbol).await
    }

    async fn get_account_balance(&self) -> Result<Decimal> {
        self.inner.get_account_balance().await
    }

    async fn list_open_positions(&self) -> Result<Vec<String>> {
        self.inner.list_open_positions().await
    }

    async fn get_trade_history_page(&self, cursor: Option<String>) -> Result<TradeHistoryPage> {
        self.inner.get_trade_history_page(cursor).await
    }

    async fn place_order(&self, order: &MarketOrder) -> Result<OrderAck> {
        let ack = OrderAck {
            order_id: format!("dry-run-{}", Uuid::new_v4()),
            client_order_id: Some(Uuid::new_v4().to_string()),
        };

        log_order!(info, order, order_id = %ack.order_id, "Dry-run order acknowledged");
        self.executed.write().await.push((order.clone(), ack.clone()));

        Ok(ack)
    }
}

//! Bybit v5 REST gateway implementation

use crate::{
    config::ExchangeConfig,
    connectors::{
        auth::AuthHeaders,
        traits::*,
    },
    PairTradingError,
    Result,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

/// Bybit exchange gateway
pub struct BybitConnector {
    config: ExchangeConfig,
    quote_asset: String,
    rest_client: BybitRestClient,
}

impl BybitConnector {
    /// Create a new Bybit gateway for instruments quoted in `quote_asset`
    pub fn new(config: ExchangeConfig, quote_asset: &str) -> Result<Self> {
        let rest_client = BybitRestClient::new(&config)?;

        Ok(Self {
            config,
            quote_asset: quote_asset.to_string(),
            rest_client,
        })
    }

    /// Base URL the gateway talks to
    pub fn base_url(&self) -> &str {
        &self.rest_client.base_url
    }
}

#[async_trait]
impl ExchangeGateway for BybitConnector {
    async fn list_tradable_pairs(&self) -> Result<Vec<String>> {
        let params = [("category", self.config.category.clone())];
        let tickers: BybitList<BybitTicker> = self.rest_client.get("/v5/market/tickers", &params, false).await?;

        let mut quoted = Vec::new();
        for ticker in tickers.list {
            if !ticker.symbol.ends_with(&self.quote_asset) {
                continue;
            }
            let volume = parse_f64("volume24h", &ticker.volume_24h)?;
            quoted.push((ticker.symbol, volume));
        }
        quoted.sort_by(|a, b| a.1.total_cmp(&b.1));

        debug!("Bybit lists {} {} instruments", quoted.len(), self.quote_asset);
        Ok(quoted.into_iter().map(|(symbol, _)| symbol).collect())
    }

    async fn get_price_series(&self, symbol: &str, interval_minutes: u32, count: usize) -> Result<Vec<f64>> {
        let params = [
            ("category", self.config.category.clone()),
            ("symbol", symbol.to_string()),
            ("interval", interval_minutes.to_string()),
            ("limit", count.to_string()),
        ];
        let klines: BybitList<Vec<String>> = self.rest_client
            .get("/v5/market/mark-price-kline", &params, false)
            .await?;

        klines
            .list
            .iter()
            .take(count)
            .map(|kline| -> Result<f64> {
                let close = kline.get(4).ok_or_else(|| {
                    PairTradingError::ParseError(format!("Kline for {} has no close price", symbol))
                })?;
                parse_f64("close", close)
            })
            .collect()
    }

    async fn get_instrument_step(&self, symbol: &str) -> Result<Decimal> {
        let params = [
            ("category", self.config.category.clone()),
            ("symbol", symbol.to_string()),
        ];
        let instruments: BybitList<BybitInstrument> = self.rest_client
            .get("/v5/market/instruments-info", &params, false)
            .await?;

        let instrument = instruments
            .list
            .into_iter()
            .find(|instrument| instrument.symbol == symbol)
            .ok_or_else(|| PairTradingError::EmptyData(format!("No instrument info for {}", symbol)))?;

        parse_decimal("qtyStep", &instrument.lot_size_filter.qty_step)
    }

    async fn get_account_balance(&self) -> Result<Decimal> {
        let params = [
            ("accountType", self.config.account_type.clone()),
            ("coin", self.config.settle_coin.clone()),
        ];
        let wallet: BybitList<BybitWalletAccount> = self.rest_client
            .get("/v5/account/wallet-balance", &params, true)
            .await?;

        let coin = wallet
            .list
            .into_iter()
            .next()
            .and_then(|account| {
                account
                    .coin
                    .into_iter()
                    .find(|coin| coin.coin == self.config.settle_coin)
            })
            .ok_or_else(|| {
                PairTradingError::EmptyData(format!("No {} wallet balance", self.config.settle_coin))
            })?;

        parse_decimal("walletBalance", &coin.wallet_balance)
    }

    async fn list_open_positions(&self) -> Result<Vec<String>> {
        let params = [
            ("category", self.config.category.clone()),
            ("settleCoin", self.config.settle_coin.clone()),
            ("limit", self.config.position_page_limit.to_string()),
        ];
        let positions: BybitList<BybitPosition> = self.rest_client
            .get("/v5/position/list", &params, true)
            .await?;

        Ok(positions
            .list
            .into_iter()
            .filter(|position| match position.size.as_deref() {
                Some(size) => Decimal::from_str(size).map(|s| !s.is_zero()).unwrap_or(true),
                None => true,
            })
            .map(|position| position.symbol)
            .collect())
    }

    async fn get_trade_history_page(&self, cursor: Option<String>) -> Result<TradeHistoryPage> {
        let mut params = vec![
            ("category", self.config.category.clone()),
            ("settleCoin", self.config.settle_coin.clone()),
            ("limit", self.config.history_page_limit.to_string()),
        ];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            params.push(("cursor", cursor));
        }

        let history: BybitOrderHistory = self.rest_client.get("/v5/order/history", &params, true).await?;

        let records = history
            .list
            .iter()
            .map(|entry| -> Result<TradeRecord> {
                Ok(TradeRecord {
                    symbol: entry.symbol.clone(),
                    side: entry.side.parse()?,
                    quantity: parse_decimal("qty", &entry.qty)?,
                    created_time_ms: parse_i64("createdTime", &entry.created_time)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TradeHistoryPage {
            records,
            next_cursor: history.next_page_cursor.filter(|c| !c.is_empty()),
        })
    }

    async fn place_order(&self, order: &MarketOrder) -> Result<OrderAck> {
        let request = BybitOrderRequest {
            category: self.config.category.clone(),
            symbol: order.symbol.clone(),
            side: order.side.as_str().to_string(),
            order_type: "Market".to_string(),
            qty: order.quantity.normalize().to_string(),
            reduce_only: order.reduce_only.then_some(true),
            order_link_id: uuid::Uuid::new_v4().to_string(),
        };

        let created: BybitOrderCreated = self.rest_client.post("/v5/order/create", &request).await?;

        Ok(OrderAck {
            order_id: created.order_id,
            client_order_id: created.order_link_id.or(Some(request.order_link_id)),
        })
    }
}

/// Bybit REST client
struct BybitRestClient {
    base_url: String,
    api_key: String,
    secret_key: String,
    recv_window_ms: u64,
    client: reqwest::Client,
}

impl BybitRestClient {
    fn new(config: &ExchangeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PairTradingError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.rest_url().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            recv_window_ms: config.recv_window_ms,
            client,
        })
    }

    fn auth_headers(&self, payload: &str) -> Result<AuthHeaders> {
        if self.api_key.is_empty() || self.secret_key.is_empty() {
            return Err(PairTradingError::Config("Signed request requires API credentials".to_string()).into());
        }
        AuthHeaders::generate(&self.api_key, &self.secret_key, self.recv_window_ms, payload)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, String)], signed: bool) -> Result<T> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();
        let uri = format!("{}{}?{}", self.base_url, endpoint, query);
        debug!("GET {}", uri);

        let mut request = self.client.get(&uri);
        if signed {
            request = self.auth_headers(&query)?.apply_to_request(request);
        }

        self.execute(request, &uri).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, endpoint: &str, body: &B) -> Result<T> {
        let payload = serde_json::to_string(body)
            .map_err(|e| PairTradingError::ParseError(format!("Failed to encode request: {}", e)))?;
        let uri = format!("{}{}", self.base_url, endpoint);
        debug!("POST {} {}", uri, payload);

        let request = self
            .client
            .post(&uri)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.clone());
        let request = self.auth_headers(&payload)?.apply_to_request(request);

        self.execute(request, &uri).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder, uri: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|e| PairTradingError::Connection(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PairTradingError::Exchange {
                code: i64::from(status.as_u16()),
                message: format!("Http request error uri: {}", uri),
            }
            .into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| PairTradingError::Connection(format!("Failed to read response: {}", e)))?;

        parse_response(&body)
    }
}

/// Unwrap the `{retCode, retMsg, result}` envelope
fn parse_response<T: DeserializeOwned>(body: &str) -> Result<T> {
    let envelope: BybitEnvelope = serde_json::from_str(body)
        .map_err(|e| PairTradingError::ParseError(format!("Failed to parse response: {}", e)))?;

    if envelope.ret_code != 0 {
        warn!("Bybit rejected request: {} {}", envelope.ret_code, envelope.ret_msg);
        return Err(PairTradingError::Exchange {
            code: envelope.ret_code,
            message: envelope.ret_msg,
        }
        .into());
    }

    serde_json::from_value(envelope.result)
        .map_err(|e| PairTradingError::ParseError(format!("Unexpected result shape: {}", e)).into())
}

fn parse_f64(field: &str, value: &str) -> Result<f64> {
    if value.is_empty() {
        return Err(PairTradingError::ParseError(format!("Cant parse empty {} to number", field)).into());
    }
    value
        .parse::<f64>()
        .map_err(|_| PairTradingError::ParseError(format!("Cant parse {} {} to number", field, value)).into())
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal> {
    if value.is_empty() {
        return Err(PairTradingError::ParseError(format!("Cant parse empty {} to decimal", field)).into());
    }
    Decimal::from_str(value)
        .map_err(|_| PairTradingError::ParseError(format!("Cant parse {} {} to decimal", field, value)).into())
}

fn parse_i64(field: &str, value: &str) -> Result<i64> {
    value
        .parse::<i64>()
        .map_err(|_| PairTradingError::ParseError(format!("Cant parse {} {} to long number", field, value)).into())
}

// Bybit API request/response types
#[derive(Debug, Deserialize)]
struct BybitEnvelope {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BybitList<T> {
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct BybitTicker {
    symbol: String,
    #[serde(rename = "volume24h")]
    volume_24h: String,
}

#[derive(Debug, Deserialize)]
struct BybitInstrument {
    symbol: String,
    #[serde(rename = "lotSizeFilter")]
    lot_size_filter: BybitLotSizeFilter,
}

#[derive(Debug, Deserialize)]
struct BybitLotSizeFilter {
    #[serde(rename = "qtyStep")]
    qty_step: String,
}

#[derive(Debug, Deserialize)]
struct BybitWalletAccount {
    coin: Vec<BybitWalletCoin>,
}

#[derive(Debug, Deserialize)]
struct BybitWalletCoin {
    coin: String,
    #[serde(rename = "walletBalance")]
    wallet_balance: String,
}

#[derive(Debug, Deserialize)]
struct BybitPosition {
    symbol: String,
    #[serde(default)]
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BybitOrderHistory {
    list: Vec<BybitOrderHistoryEntry>,
    #[serde(rename = "nextPageCursor", default)]
    next_page_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BybitOrderHistoryEntry {
    symbol: String,
    side: String,
    qty: String,
    #[serde(rename = "createdTime")]
    created_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BybitOrderRequest {
    category: String,
    symbol: String,
    side: String,
    order_type: String,
    qty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reduce_only: Option<bool>,
    order_link_id: String,
}

#[derive(Debug, Deserialize)]
struct BybitOrderCreated {
    #[serde(rename = "orderId")]
    order_id: String,
    #[serde(rename = "orderLinkId", default)]
    order_link_id: Option<String>,
}

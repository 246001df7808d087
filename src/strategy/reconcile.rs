//! Rebuild open pairs from exchange positions and order history

use crate::{
    connectors::{ExchangeGateway, TradeRecord},
    strategy::pair::{Legs, TradePair},
    Result,
};
use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Pair up the open positions of the account from its order history
///
/// History pages are walked newest first until every open symbol is accounted for, a page
/// comes back empty or there is no further cursor. Symbols that never pair up are left
/// untracked.
pub async fn reconcile_open_pairs(gateway: &dyn ExchangeGateway, window_ms: i64) -> Result<Vec<TradePair>> {
    let mut pending: HashSet<String> = gateway.list_open_positions().await?.into_iter().collect();
    let mut pairs = Vec::new();
    let mut cursor = None;

    info!(open_positions = pending.len(), "Reconciling open positions");

    while !pending.is_empty() {
        let page = gateway.get_trade_history_page(cursor.take()).await?;
        if page.records.is_empty() {
            break;
        }

        pairs.extend(pair_records(&page.records, &mut pending, window_ms));

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    if !pending.is_empty() {
        let mut unmatched: Vec<_> = pending.into_iter().collect();
        unmatched.sort();
        warn!(?unmatched, "Open positions without a matching pair");
    }

    Ok(pairs)
}

/// Merge adjacent records of one page into open pairs
///
/// Records come newest first, so each consecutive couple is read as (older, newer). A couple
/// merges when both symbols are still pending and distinct, the fills are closer than
/// `window_ms` and the sides are opposite.
pub fn pair_records(records: &[TradeRecord], pending: &mut HashSet<String>, window_ms: i64) -> Vec<TradePair> {
    let mut pairs = Vec::new();

    for couple in records.chunks_exact(2) {
        let (newer, older) = (&couple[0], &couple[1]);

        if older.symbol == newer.symbol || !pending.contains(&older.symbol) || !pending.contains(&newer.symbol) {
            continue;
        }
        if (newer.created_time_ms - older.created_time_ms).abs() >= window_ms {
            debug!(leg_a = %older.symbol, leg_b = %newer.symbol, "Fills too far apart to pair");
            continue;
        }
        if older.side == newer.side {
            continue;
        }

        let Some(opened_at) = Utc.timestamp_millis_opt(older.created_time_ms).single() else {
            warn!(symbol = %older.symbol, created_time_ms = older.created_time_ms, "Invalid fill time");
            continue;
        };

        let names = Legs::new(older.symbol.clone(), newer.symbol.clone());
        let sides = Legs::new(older.side, newer.side);
        let volumes = Legs::new(older.quantity, newer.quantity);

        match TradePair::reconciled(names, sides, volumes, opened_at) {
            Ok(pair) => {
                pending.remove(&older.symbol);
                pending.remove(&newer.symbol);
                pairs.push(pair);
            }
            Err(e) => warn!(error = %e, "Skipping history records"),
        }
    }

    pairs
}

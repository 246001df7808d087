//! Paired-leg order placement

use crate::{
    connectors::{ExchangeGateway, MarketOrder, OrderAck},
    log_order,
    strategy::pair::{Legs, PairNames, Sides, Volumes},
    utils::metrics,
    PairTradingError, Result,
};

/// Place one market order per leg, first leg first
///
/// The legs are not atomic. When the second leg fails after the first was accepted, the
/// account holds a single unhedged leg; this is logged at error level with the filled leg and
/// the error is returned to the caller.
pub async fn place_pair_orders(
    gateway: &dyn ExchangeGateway,
    names: &PairNames,
    sides: Sides,
    volumes: Volumes,
    reduce_only: bool,
) -> Result<Legs<OrderAck>> {
    let orders = names
        .as_ref()
        .zip(sides)
        .zip(volumes)
        .map(|((symbol, side), quantity)| MarketOrder {
            symbol: symbol.clone(),
            side,
            quantity,
            reduce_only,
        });

    let first = place(gateway, &orders.a).await?;

    let second = match place(gateway, &orders.b).await {
        Ok(ack) => ack,
        Err(e) => {
            log_order!(
                error,
                orders.a,
                order_id = %first.order_id,
                unplaced_symbol = %orders.b.symbol,
                error = %e,
                "Second leg failed, first leg left unhedged"
            );
            return Err(e.context(PairTradingError::Trading(format!(
                "Leg {} filled but leg {} failed",
                orders.a.symbol, orders.b.symbol
            ))));
        }
    };

    Ok(Legs::new(first, second))
}

/// Whether `err` came from a second leg failing after the first was accepted
pub fn second_leg_failed(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<PairTradingError>(), Some(PairTradingError::Trading(_)))
}

async fn place(gateway: &dyn ExchangeGateway, order: &MarketOrder) -> Result<OrderAck> {
    let result = gateway.place_order(order).await;
    metrics::record_order(order.side.as_str(), order.reduce_only, result.is_ok());

    match &result {
        Ok(ack) => {
            log_order!(info, order, order_id = %ack.order_id, "Order placed");
        }
        Err(e) => {
            log_order!(warn, order, error = %e, "Order failed");
        }
    }
    result
}

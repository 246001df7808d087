//! Prometheus metrics for phase runs, orders and tracked pairs

use crate::{PairTradingError, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge, histogram, increment_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Phase runs by phase and outcome
pub const PHASE_RUNS: &str = "pair_trader_phase_runs_total";
/// Phase run duration in seconds
pub const PHASE_DURATION: &str = "pair_trader_phase_duration_seconds";
/// Orders placed by side and outcome
pub const ORDERS: &str = "pair_trader_orders_total";
/// Pairs closed by reason
pub const PAIRS_CLOSED: &str = "pair_trader_pairs_closed_total";
/// Tracked pairs by stage
pub const TRACKED_PAIRS: &str = "pair_trader_tracked_pairs";

/// Install the Prometheus recorder and serve it on `listen_addr`
///
/// Must be called from within a tokio runtime.
pub fn install_exporter(listen_addr: &str) -> Result<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .map_err(|e| PairTradingError::Config(format!("Invalid metrics address {}: {}", listen_addr, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| PairTradingError::Config(format!("Failed to install metrics exporter: {}", e)))?;

    describe_metrics();
    tracing::info!(%addr, "Metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    describe_counter!(PHASE_RUNS, "Completed phase runs by phase and outcome");
    describe_histogram!(PHASE_DURATION, "Phase run duration in seconds");
    describe_counter!(ORDERS, "Market orders by side and outcome");
    describe_counter!(PAIRS_CLOSED, "Closed pairs by reason");
    describe_gauge!(TRACKED_PAIRS, "Tracked pairs by stage");
}

/// Record one phase run
pub fn record_phase(phase: &'static str, succeeded: bool, elapsed: Duration) {
    let outcome = if succeeded { "ok" } else { "error" };
    increment_counter!(PHASE_RUNS, "phase" => phase, "outcome" => outcome);
    histogram!(PHASE_DURATION, elapsed.as_secs_f64(), "phase" => phase);
}

/// Record one order attempt
pub fn record_order(side: &'static str, reduce_only: bool, succeeded: bool) {
    let outcome = if succeeded { "ok" } else { "error" };
    let intent = if reduce_only { "close" } else { "open" };
    increment_counter!(ORDERS, "side" => side, "intent" => intent, "outcome" => outcome);
}

/// Record a closed pair
pub fn record_close(reason: String) {
    increment_counter!(PAIRS_CLOSED, "reason" => reason);
}

/// Publish the number of tracked pairs in `stage`
pub fn set_tracked_pairs(stage: &'static str, count: usize) {
    gauge!(TRACKED_PAIRS, count as f64, "stage" => stage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_phase("screen", true, Duration::from_millis(5));
        record_order("Buy", false, true);
        record_close("Zscore".to_string());
        set_tracked_pairs("open", 3);
    }

    #[test]
    fn test_invalid_listen_address() {
        let err = install_exporter("not-an-address").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PairTradingError>(),
            Some(PairTradingError::Config(_))
        ));
    }
}

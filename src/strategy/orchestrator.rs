//! Pair lifecycle phases over the tracked pair collection

use crate::{
    config::StrategyConfig,
    connectors::{interval, ExchangeGateway},
    log_pair,
    strategy::{
        indicators::{entry_sides, price_ratio, reverted, zscore, RelationshipTest},
        pair::{CloseReason, Legs, PairNames, PairStage, TradePair, Volumes},
        reconcile::reconcile_open_pairs,
        scheduler::Phase,
    },
    trading::legs::{place_pair_orders, second_leg_failed},
    utils::metrics,
    PairTradingError, Result,
};
use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Ratio deviation of a pair together with the latest price of each leg
#[derive(Debug, Clone, Copy)]
struct Evaluation {
    zscore: f64,
    latest: Legs<f64>,
}

/// Price history of one instrument that survived screening
struct History {
    symbol: String,
    hourly: Vec<f64>,
    four_hourly: Vec<f64>,
}

/// Owns the tracked pairs and runs each lifecycle phase against the gateway
///
/// Every phase takes `&mut self`, so phases never interleave. A phase returns the first error
/// it meets; pairs already advanced in that run keep their new state.
pub struct PairOrchestrator {
    gateway: Arc<dyn ExchangeGateway>,
    relationship: Arc<dyn RelationshipTest>,
    strategy: StrategyConfig,
    pairs: Vec<TradePair>,
}

impl PairOrchestrator {
    /// Create an orchestrator with no tracked pairs
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        relationship: Arc<dyn RelationshipTest>,
        strategy: StrategyConfig,
    ) -> Self {
        Self {
            gateway,
            relationship,
            strategy,
            pairs: Vec::new(),
        }
    }

    /// Tracked pairs in insertion order
    pub fn pairs(&self) -> &[TradePair] {
        &self.pairs
    }

    /// Number of tracked pairs in `stage`
    pub fn count(&self, stage: PairStage) -> usize {
        self.pairs.iter().filter(|p| p.stage() == stage).count()
    }

    /// Start tracking a pair
    ///
    /// Rejected when any of its symbols already belongs to a tracked pair.
    pub fn track(&mut self, pair: TradePair) -> Result<()> {
        if let Some(existing) = self.pairs.iter().find(|p| p.shares_any_name(pair.names())) {
            return Err(PairTradingError::InvalidTransition(format!(
                "Pair {} overlaps tracked pair {}",
                pair.names(),
                existing.names()
            ))
            .into());
        }
        self.pairs.push(pair);
        Ok(())
    }

    /// Run one phase
    pub async fn run_phase(&mut self, phase: Phase) -> Result<()> {
        let result = match phase {
            Phase::Reconcile => self.reconcile().await,
            Phase::Screen => self.screen().await,
            Phase::SelectSide => self.select_sides().await,
            Phase::Open => self.open_pairs().await,
            Phase::Close => self.close_pairs().await,
        };
        self.publish_counts();
        result
    }

    /// Rebuild open pairs from exchange positions and history
    pub async fn reconcile(&mut self) -> Result<()> {
        let pairs = reconcile_open_pairs(self.gateway.as_ref(), self.strategy.reconcile_window_ms).await?;
        for pair in pairs {
            self.track(pair)?;
        }
        info!(open_pairs = self.count(PairStage::Open), "Reconciliation complete");
        Ok(())
    }

    /// Test every ordered pair of the tradable universe
    ///
    /// Passing pairs with no symbol in common with a tracked pair start as screened. An open
    /// pair whose relationship no longer passes is closed.
    pub async fn screen(&mut self) -> Result<()> {
        let universe = self.gateway.list_tradable_pairs().await?;
        let mut histories = Vec::with_capacity(universe.len());

        for symbol in universe {
            let hourly = self
                .gateway
                .get_price_series(&symbol, interval::HOURLY, self.strategy.hourly_bars)
                .await?;
            let four_hourly = self
                .gateway
                .get_price_series(&symbol, interval::FOUR_HOURLY, self.strategy.four_hour_bars)
                .await?;

            if hourly.len() < self.strategy.hourly_bars || four_hourly.len() < self.strategy.four_hour_bars {
                debug!(%symbol, hourly = hourly.len(), four_hourly = four_hourly.len(), "Insufficient history");
                continue;
            }
            histories.push(History { symbol, hourly, four_hourly });
        }

        info!(instruments = histories.len(), "Screening universe");

        for (i, first) in histories.iter().enumerate() {
            for (j, second) in histories.iter().enumerate() {
                if i == j {
                    continue;
                }

                let names = Legs::new(first.symbol.clone(), second.symbol.clone());
                let passed = self.relationship.is_cointegrated(&first.hourly, &second.hourly)
                    && self.relationship.is_cointegrated(&first.four_hourly, &second.four_hourly);

                if passed {
                    if !self.pairs.iter().any(|p| p.shares_any_name(&names)) {
                        self.pairs.push(TradePair::new(names)?);
                    }
                } else if let Some(tracked) = self
                    .pairs
                    .iter()
                    .find(|p| p.stage() == PairStage::Open && p.shares_both_names(&names))
                    .map(|p| p.names().clone())
                {
                    // Orders follow the tracked leg order, not the universe order
                    self.close_pair(&tracked, CloseReason::TestFailed).await?;
                }
            }
        }

        Ok(())
    }

    /// Choose an entry direction for screened pairs whose ratio has deviated
    pub async fn select_sides(&mut self) -> Result<()> {
        for names in self.names_in(PairStage::Screened) {
            let evaluation = self.evaluate(&names).await?;
            debug!(pair = %names, zscore = evaluation.zscore, "Side selection");

            if let Some(sides) = entry_sides(evaluation.zscore, self.strategy.entry_zscore) {
                let index = self.index_of(&names)?;
                self.pairs[index].select_side(sides)?;
            }
        }
        Ok(())
    }

    /// Enter side-selected pairs whose ratio is back inside the entry band
    pub async fn open_pairs(&mut self) -> Result<()> {
        let allocation = Decimal::from_f64(self.strategy.allocation_fraction).ok_or_else(|| {
            PairTradingError::Config(format!("Invalid allocation fraction {}", self.strategy.allocation_fraction))
        })?;
        let mut open_count = self.count(PairStage::Open);

        for names in self.names_in(PairStage::SideSelected) {
            let evaluation = self.evaluate(&names).await?;
            if evaluation.zscore.abs() >= self.strategy.entry_zscore {
                debug!(pair = %names, zscore = evaluation.zscore, "Entry postponed");
                continue;
            }

            if open_count >= self.strategy.max_open_pairs {
                self.remove(&names);
                log_pair!(info, names, PairStage::SideSelected, open_count, "Dropped at capacity");
                continue;
            }

            let balance = self.gateway.get_account_balance().await?;
            let steps = Legs::new(
                self.gateway.get_instrument_step(&names.a).await?,
                self.gateway.get_instrument_step(&names.b).await?,
            );
            let volumes = Volumes::sized(balance, allocation, evaluation.latest, steps)?;
            if volumes.is_zero() {
                self.remove(&names);
                log_pair!(info, names, PairStage::SideSelected, %balance, "Dropped with zero volume");
                continue;
            }

            let index = self.index_of(&names)?;
            let pair = &mut self.pairs[index];
            pair.open(volumes)?;
            let sides = pair
                .sides()
                .ok_or_else(|| PairTradingError::InvalidTransition(format!("Pair {} has no sides", names)))?;

            if let Err(e) = place_pair_orders(self.gateway.as_ref(), &names, sides, volumes, false).await {
                // Nothing filled unless the first leg went through
                if !second_leg_failed(&e) {
                    self.remove(&names);
                }
                return Err(e);
            }
            open_count += 1;
        }
        Ok(())
    }

    /// Close open pairs that timed out or whose ratio reverted
    pub async fn close_pairs(&mut self) -> Result<()> {
        let now = Utc::now();
        let max_holding = self.strategy.max_holding();

        for names in self.names_in(PairStage::Open) {
            let index = self.index_of(&names)?;
            let pair = &self.pairs[index];
            let sides = pair
                .sides()
                .ok_or_else(|| PairTradingError::InvalidTransition(format!("Pair {} has no sides", names)))?;

            let reason = if pair.is_timed_out_at(now, max_holding) {
                CloseReason::Timeout
            } else {
                let evaluation = self.evaluate(&names).await?;
                if !reverted(sides, evaluation.zscore) {
                    continue;
                }
                CloseReason::Zscore
            };

            self.close_pair(&names, reason).await?;
        }
        Ok(())
    }

    /// Unwind an open pair with reduce-only orders and stop tracking it
    ///
    /// The pair is kept when the first leg fails so the close is retried, and dropped once
    /// the first leg went through even if the second failed.
    async fn close_pair(&mut self, names: &PairNames, reason: CloseReason) -> Result<()> {
        let index = self.index_of(names)?;
        let pair = &self.pairs[index];
        let (sides, volumes, opened_at) = match (pair.reversed_sides(), pair.volumes(), pair.opened_at()) {
            (Some(sides), Some(volumes), Some(opened_at)) => (sides, volumes, opened_at),
            _ => {
                return Err(PairTradingError::InvalidTransition(format!("Pair {} is not open", names)).into());
            }
        };

        let held_hours = (Utc::now() - opened_at).num_hours();
        log_pair!(info, names, pair.stage(), reason = %reason, held_hours, volumes = %volumes, "Closing pair");

        match place_pair_orders(self.gateway.as_ref(), names, sides, volumes, true).await {
            Ok(_) => {
                self.forget_closed(index, reason);
                Ok(())
            }
            Err(e) => {
                if second_leg_failed(&e) {
                    self.forget_closed(index, reason);
                }
                Err(e)
            }
        }
    }

    fn forget_closed(&mut self, index: usize, reason: CloseReason) {
        self.pairs.remove(index);
        metrics::record_close(reason.to_string());
    }

    async fn evaluate(&self, names: &PairNames) -> Result<Evaluation> {
        let bars = self.strategy.zscore_bars;
        let a = self.gateway.get_price_series(&names.a, interval::HOURLY, bars).await?;
        let b = self.gateway.get_price_series(&names.b, interval::HOURLY, bars).await?;

        let zscore = zscore(&price_ratio(&a, &b), self.strategy.zscore_window)?;
        let latest = match (a.first(), b.first()) {
            (Some(&a), Some(&b)) => Legs::new(a, b),
            _ => return Err(PairTradingError::EmptyData(format!("No prices for {}", names)).into()),
        };

        Ok(Evaluation { zscore, latest })
    }

    fn names_in(&self, stage: PairStage) -> Vec<PairNames> {
        self.pairs
            .iter()
            .filter(|p| p.stage() == stage)
            .map(|p| p.names().clone())
            .collect()
    }

    fn index_of(&self, names: &PairNames) -> Result<usize> {
        self.pairs
            .iter()
            .position(|p| p.names() == names)
            .ok_or_else(|| PairTradingError::InvalidTransition(format!("Pair {} is not tracked", names)).into())
    }

    fn remove(&mut self, names: &PairNames) {
        self.pairs.retain(|p| p.names() != names);
    }

    fn publish_counts(&self) {
        for stage in [PairStage::Screened, PairStage::SideSelected, PairStage::Open] {
            metrics::set_tracked_pairs(stage.as_str(), self.count(stage));
        }
    }
}

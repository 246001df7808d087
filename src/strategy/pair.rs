//! Pair entity and its lifecycle states

use crate::{connectors::OrderSide, log_pair, PairTradingError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places kept on sized volumes
const VOLUME_DECIMALS: u32 = 6;

/// Two values, one per leg, always in the pair's leg order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Legs<T> {
    /// First leg
    pub a: T,
    /// Second leg
    pub b: T,
}

impl<T> Legs<T> {
    /// Create from both legs
    pub fn new(a: T, b: T) -> Self {
        Self { a, b }
    }

    /// Swap the legs
    pub fn swapped(self) -> Self {
        Self { a: self.b, b: self.a }
    }

    /// Apply `f` to each leg
    pub fn map<U, F: FnMut(T) -> U>(self, mut f: F) -> Legs<U> {
        Legs { a: f(self.a), b: f(self.b) }
    }

    /// Borrow each leg
    pub fn as_ref(&self) -> Legs<&T> {
        Legs { a: &self.a, b: &self.b }
    }

    /// Pair each leg with the matching leg of `other`
    pub fn zip<U>(self, other: Legs<U>) -> Legs<(T, U)> {
        Legs { a: (self.a, other.a), b: (self.b, other.b) }
    }
}

impl<T: fmt::Display> fmt::Display for Legs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.a, self.b)
    }
}

/// Instrument symbols of a pair
pub type PairNames = Legs<String>;

/// Directional legs of a pair
pub type Sides = Legs<OrderSide>;

/// Position sizes of a pair
pub type Volumes = Legs<Decimal>;

impl Legs<String> {
    /// Whether the two legs hold the same symbol in either orientation
    pub fn same_names(&self, other: &PairNames) -> bool {
        (self.a == other.a && self.b == other.b) || (self.a == other.b && self.b == other.a)
    }

    /// Whether any symbol appears on both pairs
    pub fn overlaps(&self, other: &PairNames) -> bool {
        self.a == other.a || self.a == other.b || self.b == other.a || self.b == other.b
    }
}

impl Legs<OrderSide> {
    /// Buy the first leg, sell the second
    pub fn long_short() -> Self {
        Self::new(OrderSide::Buy, OrderSide::Sell)
    }

    /// Sell the first leg, buy the second
    pub fn short_long() -> Self {
        Self::new(OrderSide::Sell, OrderSide::Buy)
    }

    /// One leg buys while the other sells
    pub fn is_opposed(&self) -> bool {
        self.a != self.b
    }
}

impl Legs<Decimal> {
    /// Size each leg at `allocation` of `balance`, rounded down to the leg's step
    ///
    /// Each leg receives the full allocation independently. The result can be zero when the
    /// allocation does not cover one step.
    pub fn sized(balance: Decimal, allocation: Decimal, prices: Legs<f64>, steps: Legs<Decimal>) -> Result<Self> {
        Ok(Self {
            a: leg_volume(balance, allocation, prices.a, steps.a)?,
            b: leg_volume(balance, allocation, prices.b, steps.b)?,
        })
    }

    /// Either leg rounded down to nothing
    pub fn is_zero(&self) -> bool {
        self.a.is_zero() || self.b.is_zero()
    }
}

fn leg_volume(balance: Decimal, allocation: Decimal, price: f64, step: Decimal) -> Result<Decimal> {
    let price = Decimal::from_f64(price)
        .filter(|p| p.is_sign_positive() && !p.is_zero())
        .ok_or_else(|| PairTradingError::ParseError(format!("Invalid leg price {}", price)))?;
    if step <= Decimal::ZERO {
        return Err(PairTradingError::ParseError(format!("Invalid instrument step {}", step)).into());
    }

    let coins = balance * allocation / price;
    let steps = (coins / step).floor();
    Ok((steps * step).round_dp(VOLUME_DECIMALS).normalize())
}

/// Lifecycle stage of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PairStage {
    /// Relationship test passed
    Screened,
    /// Entry direction chosen
    SideSelected,
    /// Both legs held
    Open,
}

impl PairStage {
    /// Stable lowercase label
    pub fn as_str(self) -> &'static str {
        match self {
            PairStage::Screened => "screened",
            PairStage::SideSelected => "side_selected",
            PairStage::Open => "open",
        }
    }
}

impl fmt::Display for PairStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a pair with the data each stage defines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PairState {
    /// Relationship test passed
    Screened,
    /// Entry direction chosen
    SideSelected {
        /// Entry sides
        sides: Sides,
    },
    /// Both legs held
    Open {
        /// Entry sides
        sides: Sides,
        /// Held volumes
        volumes: Volumes,
        /// Entry time
        opened_at: DateTime<Utc>,
    },
}

/// Why an open pair was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    /// Ratio reverted past its mean
    Zscore,
    /// Holding period elapsed
    Timeout,
    /// Relationship no longer passes the test
    TestFailed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Zscore => write!(f, "Zscore"),
            CloseReason::Timeout => write!(f, "Timeout"),
            CloseReason::TestFailed => write!(f, "TestFailed"),
        }
    }
}

/// One tracked relationship between two instruments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePair {
    names: PairNames,
    state: PairState,
}

impl TradePair {
    /// Track a freshly screened pair
    pub fn new(names: PairNames) -> Result<Self> {
        Self::check_names(&names)?;
        let pair = Self {
            names,
            state: PairState::Screened,
        };
        log_pair!(info, pair.names, pair.stage(), "Pair screened");
        Ok(pair)
    }

    /// Rebuild an open pair from exchange history
    pub fn reconciled(names: PairNames, sides: Sides, volumes: Volumes, opened_at: DateTime<Utc>) -> Result<Self> {
        Self::check_names(&names)?;
        Self::check_sides(&names, sides)?;
        let pair = Self {
            names,
            state: PairState::Open { sides, volumes, opened_at },
        };
        log_pair!(info, pair.names, "synced", opened_at = %opened_at, "Pair reconciled");
        Ok(pair)
    }

    fn check_names(names: &PairNames) -> Result<()> {
        if names.a == names.b {
            return Err(PairTradingError::InvalidTransition(format!("Pair legs must differ: {}", names)).into());
        }
        Ok(())
    }

    fn check_sides(names: &PairNames, sides: Sides) -> Result<()> {
        if !sides.is_opposed() {
            return Err(PairTradingError::InvalidTransition(format!("Pair {} legs must take opposite sides", names)).into());
        }
        Ok(())
    }

    /// Choose the entry direction
    pub fn select_side(&mut self, sides: Sides) -> Result<()> {
        Self::check_sides(&self.names, sides)?;
        if self.state != PairState::Screened {
            return Err(PairTradingError::InvalidTransition(format!(
                "Pair {} cannot select sides while {}", self.names, self.stage()
            )).into());
        }

        self.state = PairState::SideSelected { sides };
        log_pair!(info, self.names, self.stage(), sides = %sides, "Pair side selected");
        Ok(())
    }

    /// Mark the pair open now with the given volumes
    pub fn open(&mut self, volumes: Volumes) -> Result<()> {
        self.open_at(volumes, Utc::now())
    }

    /// Mark the pair open at `opened_at` with the given volumes
    pub fn open_at(&mut self, volumes: Volumes, opened_at: DateTime<Utc>) -> Result<()> {
        let sides = match self.state {
            PairState::SideSelected { sides } => sides,
            _ => {
                return Err(PairTradingError::InvalidTransition(format!(
                    "Pair {} cannot open while {}", self.names, self.stage()
                )).into())
            }
        };

        self.state = PairState::Open { sides, volumes, opened_at };
        log_pair!(info, self.names, self.stage(), volumes = %volumes, "Pair opened");
        Ok(())
    }

    /// Whether the pair has been open for at least `max_holding`
    pub fn is_timed_out_at(&self, now: DateTime<Utc>, max_holding: chrono::Duration) -> bool {
        match self.state {
            PairState::Open { opened_at, .. } => now - opened_at >= max_holding,
            _ => false,
        }
    }

    /// Whether either symbol of `names` is one of this pair's legs
    pub fn shares_any_name(&self, names: &PairNames) -> bool {
        self.names.overlaps(names)
    }

    /// Whether `names` holds exactly this pair's symbols, in any order
    pub fn shares_both_names(&self, names: &PairNames) -> bool {
        self.names.same_names(names)
    }

    /// Symbols of the pair
    pub fn names(&self) -> &PairNames {
        &self.names
    }

    /// Current state
    pub fn state(&self) -> &PairState {
        &self.state
    }

    /// Current stage
    pub fn stage(&self) -> PairStage {
        match self.state {
            PairState::Screened => PairStage::Screened,
            PairState::SideSelected { .. } => PairStage::SideSelected,
            PairState::Open { .. } => PairStage::Open,
        }
    }

    /// Entry sides once selected
    pub fn sides(&self) -> Option<Sides> {
        match self.state {
            PairState::Screened => None,
            PairState::SideSelected { sides } | PairState::Open { sides, .. } => Some(sides),
        }
    }

    /// Sides that unwind the position
    pub fn reversed_sides(&self) -> Option<Sides> {
        self.sides().map(Legs::swapped)
    }

    /// Held volumes once open
    pub fn volumes(&self) -> Option<Volumes> {
        match self.state {
            PairState::Open { volumes, .. } => Some(volumes),
            _ => None,
        }
    }

    /// Entry time once open
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            PairState::Open { opened_at, .. } => Some(opened_at),
            _ => None,
        }
    }
}

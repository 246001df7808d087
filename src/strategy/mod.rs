//! Pair lifecycle: entity, indicators, reconciliation, phases and scheduling

pub mod indicators;
pub mod orchestrator;
pub mod pair;
pub mod reconcile;
pub mod scheduler;

pub use indicators::{AdfRelationshipTest, RelationshipTest};
pub use orchestrator::PairOrchestrator;
pub use pair::{CloseReason, Legs, PairNames, PairStage, PairState, Sides, TradePair, Volumes};
pub use scheduler::{Phase, PhaseScheduler, PhaseSequencer, SequencerStage};

//! Order execution helpers and gateway wrappers

pub mod dry_run;
pub mod legs;

pub use dry_run::DryRunGateway;
pub use legs::place_pair_orders;

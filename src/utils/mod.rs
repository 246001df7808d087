//! Utility modules

pub mod logger;
pub mod metrics;

pub use self::logger::init as init_logging;
pub use self::metrics::install_exporter;

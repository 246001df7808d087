//! Logging utilities

use crate::{PairTradingError, Result};
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Initialize the global subscriber
///
/// `RUST_LOG` overrides `log_level` when set. With a log file, records are also written to a
/// daily rotated file without ANSI colors.
pub fn init<P: AsRef<Path>>(log_level: &str, log_file: Option<P>) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| PairTradingError::Config(format!("Invalid log level {}: {}", log_level, e)))?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    let file_layer = match log_file {
        Some(path) => {
            let path = path.as_ref();
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            std::fs::create_dir_all(directory)?;

            let file_name = path
                .file_name()
                .unwrap_or(std::ffi::OsStr::new("pair-trader.log"));
            let appender = RollingFileAppender::new(Rotation::DAILY, directory, file_name);

            Some(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .with_writer(appender)
                    .boxed(),
            )
        }
        None => None,
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PairTradingError::Config(format!("Logger already initialized: {}", e)))?;

    Ok(())
}

/// Log a pair event with its legs and stage
#[macro_export]
macro_rules! log_pair {
    ($level:ident, $names:expr, $state:expr, $($field:tt)*) => {
        tracing::$level!(
            leg_a = %$names.a,
            leg_b = %$names.b,
            state = %$state,
            $($field)*
        );
    };
}

/// Log an order with its structured fields
#[macro_export]
macro_rules! log_order {
    ($level:ident, $order:expr, $($field:tt)*) => {
        tracing::$level!(
            symbol = %$order.symbol,
            side = %$order.side,
            quantity = %$order.quantity,
            reduce_only = $order.reduce_only,
            $($field)*
        );
    };
}

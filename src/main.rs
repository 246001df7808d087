use clap::{Parser, Subcommand};
use pair_lifecycle::{
    config::PairTradingConfig,
    connectors::{BybitConnector, ExchangeGateway},
    strategy::{AdfRelationshipTest, PairOrchestrator, PhaseScheduler},
    trading::DryRunGateway,
    utils::{logger, metrics},
    PairTradingError, Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "pair-trader")]
#[command(about = "Statistical-arbitrage pair trading orchestrator")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/pair_trading.toml")]
    config: PathBuf,

    /// Log level, overridden by RUST_LOG
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log file path, console only when omitted
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trade with real orders
    Live,
    /// Read market data and the account but only log orders
    DryRun,
    /// Validate configuration
    Validate,
    /// Show balance and open positions
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    logger::init(&cli.log_level, cli.log_file.as_ref())?;

    info!("Starting {} v{}", pair_lifecycle::APP_NAME, pair_lifecycle::VERSION);

    let config = PairTradingConfig::from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config.display());

    match cli.command {
        Commands::Live => run_live(config).await,
        Commands::DryRun => run_dry_run(config).await,
        Commands::Validate => validate_config(&config),
        Commands::Status => show_status(config).await,
    }
}

async fn run_live(config: PairTradingConfig) -> Result<()> {
    if cfg!(feature = "dry-run-only") {
        return Err(PairTradingError::Config("Live trading is disabled in this build".to_string()).into());
    }
    if !config.exchange.has_credentials() {
        return Err(PairTradingError::Config("Live trading requires API credentials".to_string()).into());
    }

    info!("Starting live trading mode");
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(connect(&config)?);
    run_scheduler(config, gateway).await
}

async fn run_dry_run(config: PairTradingConfig) -> Result<()> {
    info!("Starting dry-run mode, orders are logged only");
    if !config.exchange.has_credentials() {
        warn!("No API credentials, account reads will fail");
    }

    let exchange: Arc<dyn ExchangeGateway> = Arc::new(connect(&config)?);
    let gateway: Arc<dyn ExchangeGateway> = Arc::new(DryRunGateway::new(exchange));
    run_scheduler(config, gateway).await
}

fn connect(config: &PairTradingConfig) -> Result<BybitConnector> {
    config.validate()?;
    BybitConnector::new(config.exchange.clone(), &config.strategy.quote_asset)
}

async fn run_scheduler(config: PairTradingConfig, gateway: Arc<dyn ExchangeGateway>) -> Result<()> {
    if config.monitoring.enable_metrics {
        metrics::install_exporter(&config.monitoring.metrics_listen_addr)?;
    }

    let relationship = Arc::new(AdfRelationshipTest::new(&config.relationship));
    let orchestrator = PairOrchestrator::new(gateway, relationship, config.strategy.clone());
    let mut scheduler = PhaseScheduler::new(orchestrator, &config.schedule);

    if let Err(e) = scheduler.run().await {
        error!("Startup reconciliation failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn validate_config(config: &PairTradingConfig) -> Result<()> {
    info!("Validating configuration...");

    match config.validate() {
        Ok(()) => {
            info!("Configuration is valid");
            println!("Configuration validation passed!");
            if !config.exchange.has_credentials() {
                println!("Note: no API credentials configured, only dry-run market reads will work");
            }
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            Err(e)
        }
    }
}

async fn show_status(config: PairTradingConfig) -> Result<()> {
    info!("Checking account status...");
    let connector = connect(&config)?;

    let balance = connector.get_account_balance().await?;
    let positions = connector.list_open_positions().await?;

    println!("System Status:");
    println!("  Version: {}", pair_lifecycle::VERSION);
    println!("  Exchange: {}", connector.base_url());
    println!("  Balance: {} {}", balance, config.exchange.settle_coin);
    println!("  Open positions: {}", positions.len());
    for symbol in positions {
        println!("    {}", symbol);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert()
    }

    #[test]
    fn parses_dry_run_with_globals() {
        let cli = Cli::try_parse_from([
            "pair-trader",
            "--config",
            "custom.toml",
            "--log-file",
            "logs/trader.log",
            "dry-run",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("custom.toml"));
        assert_eq!(cli.log_file, Some(PathBuf::from("logs/trader.log")));
        assert!(matches!(cli.command, Commands::DryRun));
    }
}

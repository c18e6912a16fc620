//! CLI definition and dispatch.

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::csv_market_data::CsvMarketData;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::sqlite_ledger::SqliteLedger;
use crate::domain::account::{Account, AccountKey, NewAccount};
use crate::domain::broker::{BrokerConfig, VirtualBroker};
use crate::domain::error::PaperError;
use crate::domain::order::{ExecutionRecord, OrderRequest, Side};
use crate::domain::run::{AccountDayOutcome, RunSummary};
use crate::domain::schedule::SchedulerConfig;
use crate::domain::strategy::StrategyRegistry;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::scheduler::SignalScheduler;
use crate::telemetry;

#[derive(Parser, Debug)]
#[command(name = "papertrader", about = "Paper-trading execution engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open a paper account (no-op if it already exists)
    CreateAccount {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        user: String,
        #[arg(long)]
        strategy: String,
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value = "100000")]
        capital: Decimal,
    },
    /// Show an account's cash, positions and version
    Account {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        user: String,
        #[arg(long)]
        strategy: String,
    },
    /// Place a manual market order
    Order {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        user: String,
        #[arg(long)]
        strategy: String,
        /// Defaults to the account's symbol
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long, value_parser = parse_side)]
        side: Side,
        #[arg(long)]
        quantity: i64,
        /// Defaults to the last close from market data
        #[arg(long)]
        price: Option<Decimal>,
    },
    /// Stop an account; it is skipped by the scheduler from then on
    StopAccount {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        user: String,
        #[arg(long)]
        strategy: String,
    },
    /// List an account's execution records
    History {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        user: String,
        #[arg(long)]
        strategy: String,
    },
    /// List registered strategies and their parameters
    Strategies {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Run the daily strategy check once
    RunOnce {
        #[arg(short, long)]
        config: PathBuf,
        /// Trading date, YYYY-MM-DD (default: today in the scheduler timezone)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
    /// Run the daily trigger loop until interrupted
    Schedule {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn parse_side(value: &str) -> Result<Side, String> {
    Side::parse(value).ok_or_else(|| format!("expected buy or sell, got {value:?}"))
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got {value:?}: {e}"))
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::CreateAccount {
            config,
            user,
            strategy,
            symbol,
            capital,
        } => run_create_account(&config, &user, &strategy, &symbol, capital),
        Command::Account {
            config,
            user,
            strategy,
        } => run_account(&config, &AccountKey::new(&user, &strategy)),
        Command::Order {
            config,
            user,
            strategy,
            symbol,
            side,
            quantity,
            price,
        } => run_order(
            &config,
            &AccountKey::new(&user, &strategy),
            symbol.as_deref(),
            side,
            quantity,
            price,
        ),
        Command::StopAccount {
            config,
            user,
            strategy,
        } => run_stop_account(&config, &AccountKey::new(&user, &strategy)),
        Command::History {
            config,
            user,
            strategy,
        } => run_history(&config, &AccountKey::new(&user, &strategy)),
        Command::Strategies { config } => run_strategies(config.as_deref()),
        Command::RunOnce { config, date } => run_once(&config, date),
        Command::Schedule { config } => run_schedule(&config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Load the INI file and install logging from its `[logging]` section.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, PaperError> {
    let config = FileConfigAdapter::from_file(path)?;
    let filter = telemetry::filter_from_config(&config);
    let log_file = config.get_string("logging", "file").map(PathBuf::from);
    if let Err(e) = telemetry::init_tracing(&filter, log_file.as_deref()) {
        eprintln!("warning: {e}");
    }
    Ok(config)
}

/// Everything the commands need, wired from one config file.
pub struct Services {
    pub broker: Arc<VirtualBroker>,
    pub registry: Arc<StrategyRegistry>,
    pub scheduler: SchedulerConfig,
}

pub fn build_services(config: &dyn ConfigPort) -> Result<Services, PaperError> {
    let ledger = SqliteLedger::from_config(config)?;
    ledger.initialize_schema()?;
    let broker = VirtualBroker::new(Arc::new(ledger), BrokerConfig::from_config(config)?);

    Ok(Services {
        broker: Arc::new(broker),
        registry: Arc::new(StrategyRegistry::builtin()),
        scheduler: SchedulerConfig::from_config(config)?,
    })
}

pub fn build_scheduler(config: &dyn ConfigPort) -> Result<SignalScheduler, PaperError> {
    let services = build_services(config)?;
    let market_data: Arc<dyn MarketDataPort> = Arc::new(CsvMarketData::from_config(config)?);
    let catalog = Arc::new(services.registry.catalog(config)?);
    Ok(SignalScheduler::new(
        services.broker,
        market_data,
        services.registry,
        catalog,
        services.scheduler,
    ))
}

fn print_account(account: &Account) {
    println!("account     {} (id {})", account.key, account.id);
    println!("symbol      {}", account.symbol);
    println!("status      {}", account.status);
    println!("capital     {}", account.initial_capital);
    println!("cash        {}", account.cash);
    println!("version     {}", account.version);
    match account.last_run_date {
        Some(date) => println!("last run    {date}"),
        None => println!("last run    never"),
    }
    for position in account.positions.values() {
        println!(
            "position    {} x{} @ {}",
            position.symbol, position.quantity, position.cost_price
        );
    }
}

fn print_record(record: &ExecutionRecord) {
    let id = record.id.map(|id| id.to_string()).unwrap_or_default();
    println!(
        "{:>6}  {}  {:<8} {:<4} {:>8} @ {:<12} fee {:<10} {}{}",
        id,
        record.executed_at.format("%Y-%m-%d %H:%M:%S"),
        record.status,
        record.side,
        record.quantity,
        record.price,
        record.commission,
        record.symbol,
        record
            .reason
            .as_deref()
            .map(|r| format!("  ({r})"))
            .unwrap_or_default(),
    );
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.reports {
        let detail = match &report.outcome {
            AccountDayOutcome::Executed(record) | AccountDayOutcome::Rejected(record) => format!(
                "{} {} x{} @ {}{}",
                record.status,
                record.side,
                record.quantity,
                record.price,
                record
                    .reason
                    .as_deref()
                    .map(|r| format!(" ({r})"))
                    .unwrap_or_default()
            ),
            AccountDayOutcome::Skipped(reason) => format!("skipped: {reason}"),
            AccountDayOutcome::Errored(e) => format!("error: {e}"),
        };
        println!("{:<32} {}", report.key.to_string(), detail);
    }
    println!("{summary}");
}

fn run_create_account(
    config_path: &Path,
    user: &str,
    strategy: &str,
    symbol: &str,
    capital: Decimal,
) -> Result<ExitCode, PaperError> {
    let config = load_config(config_path)?;
    let services = build_services(&config)?;
    if services.registry.get(strategy).is_none() {
        return Err(PaperError::StrategyNotFound {
            strategy_id: strategy.to_string(),
        });
    }

    let account = services.broker.create_account(&NewAccount {
        key: AccountKey::new(user, strategy),
        symbol: symbol.to_string(),
        initial_capital: capital,
    })?;
    print_account(&account);
    Ok(ExitCode::SUCCESS)
}

fn run_account(config_path: &Path, key: &AccountKey) -> Result<ExitCode, PaperError> {
    let config = load_config(config_path)?;
    let services = build_services(&config)?;
    print_account(&services.broker.require_account(key)?);
    Ok(ExitCode::SUCCESS)
}

fn run_order(
    config_path: &Path,
    key: &AccountKey,
    symbol: Option<&str>,
    side: Side,
    quantity: i64,
    price: Option<Decimal>,
) -> Result<ExitCode, PaperError> {
    let config = load_config(config_path)?;
    let services = build_services(&config)?;
    let account = services.broker.require_account(key)?;

    let symbol = match symbol {
        Some(s) => s.trim().to_string(),
        None if account.symbol.trim().is_empty() => {
            return Err(PaperError::MissingSymbol {
                account_id: account.id,
            });
        }
        None => account.symbol.clone(),
    };

    let price = match price {
        Some(p) => p,
        None => {
            let market_data = CsvMarketData::from_config(&config)?;
            let bars = market_data.last_bars(&symbol, 1)?;
            bars.last()
                .map(|b| b.close)
                .ok_or_else(|| PaperError::InvalidRequest {
                    reason: format!("no market price for {symbol}; pass --price"),
                })?
        }
    };

    let record = services.broker.execute(&OrderRequest {
        key: key.clone(),
        symbol,
        side,
        quantity,
        price,
    })?;
    print_record(&record);

    if record.is_filled() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(5))
    }
}

fn run_stop_account(config_path: &Path, key: &AccountKey) -> Result<ExitCode, PaperError> {
    let config = load_config(config_path)?;
    let services = build_services(&config)?;
    let account = services.broker.stop_account(key)?;
    info!(account = account.id, key = %account.key, "account stopped");
    print_account(&account);
    Ok(ExitCode::SUCCESS)
}

fn run_history(config_path: &Path, key: &AccountKey) -> Result<ExitCode, PaperError> {
    let config = load_config(config_path)?;
    let services = build_services(&config)?;
    let records = services.broker.history(key)?;
    if records.is_empty() {
        eprintln!("No executions for {key}");
    }
    for record in &records {
        print_record(record);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_strategies(config_path: Option<&Path>) -> Result<ExitCode, PaperError> {
    let registry = StrategyRegistry::builtin();
    let config = config_path.map(load_config).transpose()?;

    for descriptor in registry.descriptors() {
        println!("{}  {}", descriptor.id, descriptor.name);
        println!("    {}", descriptor.description);
        let params = match &config {
            Some(config) => registry.resolve_params(descriptor.id, config)?,
            None => descriptor.default_params(),
        };
        for param in descriptor.params {
            let value = params.get(param.name).copied().unwrap_or(param.default);
            println!("    {:<14} {:<8} {}", param.name, value, param.description);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn new_runtime() -> Result<tokio::runtime::Runtime, PaperError> {
    tokio::runtime::Runtime::new().map_err(|e| PaperError::Io {
        reason: format!("failed to start async runtime: {e}"),
    })
}

fn run_once(config_path: &Path, date: Option<NaiveDate>) -> Result<ExitCode, PaperError> {
    let config = load_config(config_path)?;
    let scheduler = Arc::new(build_scheduler(&config)?);
    let date = date.unwrap_or_else(|| scheduler.config().trading_date(Utc::now()));

    let summary = new_runtime()?.block_on(scheduler.run_once(date))?;
    print_summary(&summary);

    if summary.errored() > 0 {
        warn!(errored = summary.errored(), %date, "run finished with errors");
        Ok(ExitCode::from(6))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn run_schedule(config_path: &Path) -> Result<ExitCode, PaperError> {
    let config = load_config(config_path)?;
    let scheduler = Arc::new(build_scheduler(&config)?);
    let sched = scheduler.config();
    info!(
        hour = sched.trigger_hour,
        minute = sched.trigger_minute,
        timezone = %sched.timezone,
        workers = sched.workers,
        "scheduler starting"
    );

    new_runtime()?.block_on(async move {
        scheduler
            .run_until(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "ctrl-c handler failed");
                    std::future::pending::<()>().await;
                }
            })
            .await;
    });
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!(parse_side("buy"), Ok(Side::Buy));
        assert_eq!(parse_side("SELL"), Ok(Side::Sell));
        assert!(parse_side("hold").is_err());
    }

    #[test]
    fn date_parsing() {
        assert_eq!(parse_date("2024-06-03"), Ok(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()));
        assert!(parse_date("03/06/2024").is_err());
    }

    #[test]
    fn order_command_parses() {
        let cli = Cli::try_parse_from([
            "papertrader",
            "order",
            "--config",
            "p.ini",
            "--user",
            "alice",
            "--strategy",
            "DualMovingAverage",
            "--side",
            "buy",
            "--quantity",
            "100",
            "--price",
            "10.5",
        ])
        .unwrap();
        match cli.command {
            Command::Order {
                side,
                quantity,
                price,
                symbol,
                ..
            } => {
                assert_eq!(side, Side::Buy);
                assert_eq!(quantity, 100);
                assert_eq!(price, Some(Decimal::new(105, 1)));
                assert_eq!(symbol, None);
            }
            other => panic!("expected order, got {other:?}"),
        }
    }

    #[test]
    fn create_account_defaults_capital() {
        let cli = Cli::try_parse_from([
            "papertrader",
            "create-account",
            "-c",
            "p.ini",
            "--user",
            "alice",
            "--strategy",
            "DualMovingAverage",
            "--symbol",
            "600519",
        ])
        .unwrap();
        match cli.command {
            Command::CreateAccount { capital, .. } => assert_eq!(capital, Decimal::from(100_000)),
            other => panic!("expected create-account, got {other:?}"),
        }
    }

    #[test]
    fn run_once_accepts_date() {
        let cli = Cli::try_parse_from(["papertrader", "run-once", "-c", "p.ini", "--date", "2024-06-03"])
            .unwrap();
        match cli.command {
            Command::RunOnce { date, .. } => assert_eq!(date, NaiveDate::from_ymd_opt(2024, 6, 3)),
            other => panic!("expected run-once, got {other:?}"),
        }
    }
}

//! CLI definition and dispatch.
//!
//! Each subcommand is a function returning `Result<_, SettlerError>`; [`run`]
//! prints the outcome and maps errors onto process exit codes.

use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::fallback_source::FallbackSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::batch::BatchRunner;
use crate::domain::cascade::{self, CascadeReport};
use crate::domain::error::SettlerError;
use crate::domain::price::PriceReading;
use crate::domain::summary::RunSummary;
use crate::domain::trading_window::TradingWindow;
use crate::ports::config_port::ConfigPort;
use crate::ports::forecast_store::ForecastStore;
use crate::ports::price_port::PriceSource;

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
compile_error!("enable the `sqlite` or `postgres` feature to get a forecast store");

pub const CRON_SECRET_ENV: &str = "CRON_SECRET";

#[derive(Parser, Debug)]
#[command(name = "settler", about = "Settles price-bound stock forecasts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one resolution pass and print the summary as JSON
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the forecasts table and indexes
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Fetch the current price of one ticker
    Price {
        ticker: String,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Report whether the trading window is open right now
    Market {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Cascade from a forecast that was already resolved, e.g. by hand
    SettleChain {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        id: String,
    },
    /// Serve the trigger endpoint over HTTP
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Run { config } => resolve_once(&config).and_then(|summary| print_json(&summary)),
        Command::InitDb { config } => init_db(&config).map(|()| {
            println!("schema ready");
        }),
        Command::Price { ticker, config } => {
            fetch_price(&config, &ticker).and_then(|reading| print_json(&reading))
        }
        Command::Market { config } => market_window(config.as_deref()).map(|window| {
            let now = Utc::now();
            let local = now.with_timezone(&window.offset);
            let state = if window.is_open_at(now) { "open" } else { "closed" };
            println!(
                "market {state} at {} (session {}-{})",
                local.format("%a %Y-%m-%d %H:%M %:z"),
                window.open.format("%H:%M"),
                window.close.format("%H:%M"),
            );
        }),
        Command::SettleChain { config, id } => settle_chain(&config, &id).map(|report| {
            println!(
                "{} followed forecasts resolved, {} errors, {} cycles",
                report.resolved, report.errors, report.cycles
            );
        }),
        Command::Serve { config } => serve(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), SettlerError> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{json}");
    Ok(())
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SettlerError> {
    FileConfigAdapter::from_file(path)
}

/// Open the configured store. Postgres wins when it is compiled in and
/// `[postgres] connection_string` is set; otherwise sqlite.
pub fn open_store(
    config: &dyn ConfigPort,
    init_schema: bool,
) -> Result<Arc<dyn ForecastStore + Send + Sync>, SettlerError> {
    #[cfg(feature = "postgres")]
    {
        use crate::adapters::postgres_adapter::PostgresAdapter;

        if !cfg!(feature = "sqlite") || config.get_string("postgres", "connection_string").is_some()
        {
            let store = PostgresAdapter::from_config(config)?;
            if init_schema {
                store.initialize_schema()?;
            }
            return Ok(Arc::new(store));
        }
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let store = SqliteAdapter::from_config(config)?;
        if init_schema {
            store.initialize_schema()?;
        }
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        Err(SettlerError::ConfigMissing {
            section: "postgres".into(),
            key: "connection_string".into(),
        })
    }
}

/// `[web] cron_secret`, else the `CRON_SECRET` environment variable.
pub fn cron_secret(config: &dyn ConfigPort) -> Option<String> {
    config.get_string("web", "cron_secret").or_else(|| {
        std::env::var(CRON_SECRET_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
    })
}

pub fn resolve_once(config_path: &Path) -> Result<RunSummary, SettlerError> {
    let config = load_config(config_path)?;
    let window = TradingWindow::from_config(&config)?;
    let store = open_store(&config, false)?;
    let prices = FallbackSource::from_config(&config)?;

    BatchRunner::new(store.as_ref(), &prices, window).run_once()
}

pub fn init_db(config_path: &Path) -> Result<(), SettlerError> {
    let config = load_config(config_path)?;
    open_store(&config, true)?;
    Ok(())
}

pub fn fetch_price(config_path: &Path, ticker: &str) -> Result<PriceReading, SettlerError> {
    let config = load_config(config_path)?;
    let prices = FallbackSource::from_config(&config)?;
    Ok(prices.fetch(ticker.trim())?)
}

pub fn market_window(config_path: Option<&Path>) -> Result<TradingWindow, SettlerError> {
    match config_path {
        Some(path) => TradingWindow::from_config(&load_config(path)?),
        None => Ok(TradingWindow::default()),
    }
}

pub fn settle_chain(config_path: &Path, id: &str) -> Result<CascadeReport, SettlerError> {
    let config = load_config(config_path)?;
    let store = open_store(&config, false)?;
    cascade::settle_chain(store.as_ref(), id, Utc::now())
}

fn serve(config_path: &Path) -> Result<(), SettlerError> {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{AppState, build_router};
        use std::net::SocketAddr;
        use tracing::info;

        let config = load_config(config_path)?;
        let listen = config
            .get_string("web", "listen")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());
        let addr: SocketAddr = listen.parse().map_err(|_| SettlerError::ConfigInvalid {
            section: "web".into(),
            key: "listen".into(),
            reason: format!("{listen} is not a socket address"),
        })?;

        let cron_secret = cron_secret(&config);
        if cron_secret.is_none() {
            tracing::warn!("no cron secret configured, the trigger endpoint is open");
        }

        // Built outside the runtime: the blocking HTTP client must not be
        // created or dropped on an async worker.
        let prices: Arc<dyn PriceSource + Send + Sync> =
            Arc::new(FallbackSource::from_config(&config)?);
        let state = AppState {
            store: open_store(&config, false)?,
            prices: Arc::clone(&prices),
            window: TradingWindow::from_config(&config)?,
            cron_secret,
        };
        let router = build_router(state);

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(%addr, "listening");
            axum::serve(listener, router).await
        })?;

        drop(runtime);
        drop(prices);
        Ok(())
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        Err(SettlerError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "web feature is required for serve",
        )))
    }
}

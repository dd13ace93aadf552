//! Portopt CLI: price lookups, portfolio optimization, holdings and FX rates.
//!
//! Commands:
//! - `price`: market data for one symbol via the fetch script
//! - `optimize`: persist holdings under a fresh session and run the optimizer
//! - `holdings save|list|delete`: session-scoped holdings management
//! - `rate`: exchange rate (cached, live or fallback)
//!
//! Results are printed to stdout as pretty JSON. On failure a generic message
//! goes to stderr and the process exits with status 1; details are logged.

mod logging;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;

use portopt_core::domain::{HoldingInput, OptimizationRequest, SessionId};
use portopt_runner::{AppConfig, OrchestrationError, Orchestrator};

#[derive(Parser)]
#[command(
    name = "portopt",
    about = "Portfolio optimization through an external optimizer process"
)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch market data for a symbol.
    Price {
        /// Ticker symbol (e.g., AAPL, 005930.KS).
        symbol: String,

        /// Data period passed to the fetch script. Defaults to 1d.
        #[arg(long)]
        period: Option<String>,
    },
    /// Optimize a portfolio from a JSON request file.
    Optimize {
        /// Path to the optimization request (JSON).
        #[arg(long)]
        request: PathBuf,

        /// Optimization method (e.g., MPT, QAOA). Defaults to MPT.
        #[arg(long)]
        method: Option<String>,
    },
    /// Holdings management for a session.
    Holdings {
        #[command(subcommand)]
        action: HoldingsAction,
    },
    /// Exchange rate between two currencies.
    Rate {
        /// Base currency (e.g., USD).
        from: String,

        /// Quote currency (e.g., KRW).
        to: String,
    },
}

#[derive(Subcommand)]
enum HoldingsAction {
    /// Save holdings from a JSON array file.
    Save {
        #[arg(long)]
        session: String,

        /// JSON file with an array of holdings.
        #[arg(long)]
        file: PathBuf,
    },
    /// List the holdings of a session.
    List {
        #[arg(long)]
        session: String,
    },
    /// Delete every holding of a session.
    Delete {
        #[arg(long)]
        session: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init_logging(&config.logging);

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let detail = format!("{e:#}");
            error!(error = %detail, "command failed");
            eprintln!("error: {}", user_message(&e));
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

/// Failures from the computation path get the generic message; local input
/// problems (unreadable or invalid files) are reported as they are.
fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<OrchestrationError>() {
        Some(e) => e.user_message().to_string(),
        None => format!("{err:#}"),
    }
}

fn run(command: Commands, config: &AppConfig) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;

    match command {
        Commands::Price { symbol, period } => {
            let data = match period {
                Some(period) => orchestrator
                    .gateway()
                    .fetch_market_data(&symbol, &period)
                    .map_err(OrchestrationError::from)?,
                None => orchestrator.fetch_price(&symbol)?,
            };
            print_json(&data)
        }
        Commands::Optimize { request, method } => {
            let request: OptimizationRequest = read_json(&request)?;
            let result = orchestrator.optimize(&request, method.as_deref())?;
            print_json(&result)
        }
        Commands::Holdings { action } => run_holdings(&orchestrator, action),
        Commands::Rate { from, to } => print_json(&orchestrator.exchange_rate(&from, &to)),
    }
}

fn run_holdings(orchestrator: &Orchestrator, action: HoldingsAction) -> Result<()> {
    match action {
        HoldingsAction::Save { session, file } => {
            let inputs: Vec<HoldingInput> = read_json(&file)?;
            let saved = orchestrator.save_holdings(&inputs, &SessionId::from(session))?;
            print_json(&saved)
        }
        HoldingsAction::List { session } => {
            print_json(&orchestrator.list_holdings(&SessionId::from(session))?)
        }
        HoldingsAction::Delete { session } => {
            let session = SessionId::from(session);
            orchestrator.delete_holdings(&session)?;
            print_json(&serde_json::json!({ "deleted": true, "session": session }))
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

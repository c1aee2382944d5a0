//! Binance USDT-M futures order bot entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use binance_futures_bot::audit::AuditLog;
use binance_futures_bot::cli::Cli;
use binance_futures_bot::commands::App;
use binance_futures_bot::config::{Config, Network};
use binance_futures_bot::error::BotError;
use binance_futures_bot::exchange::BinanceClient;
use binance_futures_bot::trading::{OrderExecutor, RetryPolicy};
use binance_futures_bot::utils::{shutdown_signal, CancelSignal};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments; clap exits with 2 on usage errors
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(BotError::EXIT_CONFIGURATION);
        }
    };

    init_tracing(&cli, &config);

    match run(cli, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let code = match e.downcast_ref::<BotError>() {
                Some(bot) => {
                    eprintln!("Error: {bot}");
                    if let Some(hint) = bot.hint() {
                        eprintln!("Hint: {hint}");
                    }
                    bot.exit_code()
                }
                None => {
                    eprintln!("Error: {e:#}");
                    BotError::EXIT_OTHER
                }
            };
            error!(exit_code = code, "Command failed");
            ExitCode::from(code)
        }
    }
}

fn init_tracing(cli: &Cli, config: &Config) {
    let filter = if cli.verbose {
        EnvFilter::new("binance_futures_bot=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.rust_log))
    };

    // stdout carries command output only
    if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

async fn run(cli: Cli, mut config: Config) -> anyhow::Result<u8> {
    if let Some(key) = cli.api_key {
        config.binance_api_key = Some(key.clone());
        config.binance_mainnet_api_key = Some(key);
    }
    if let Some(secret) = cli.api_secret {
        config.binance_api_secret = Some(secret.clone());
        config.binance_mainnet_api_secret = Some(secret);
    }
    config.validate().map_err(BotError::from)?;

    let network = Network::from_mainnet_flag(cli.mainnet);
    if network == Network::Mainnet {
        warn!("MAINNET selected: orders use real funds");
        eprintln!("WARNING: trading on MAINNET with real funds");
    }

    let credentials = config.credentials(network).map_err(BotError::from)?;
    let client = BinanceClient::new(&config, network, credentials)?;
    info!(network = network.label(), base_url = client.base_url(), "Exchange client ready");

    let executor = OrderExecutor::new(
        client,
        AuditLog::file(config.audit_log_path.clone()),
        config.validation_policy(),
        RetryPolicy::from_config(&config),
    );
    let app = App::new(executor);

    let command = cli.command;
    let cancel = if command.is_interruptible() {
        shutdown_signal()
    } else {
        CancelSignal::never()
    };
    debug!(command = command.name(), "Dispatching");
    let outcome = app.dispatch(command, &cancel).await?;

    println!("{outcome}");
    Ok(outcome.exit_code())
}

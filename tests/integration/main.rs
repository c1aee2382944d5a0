//! End-to-end tests: CLI arguments through dispatch against the mock exchange.
//!
//! The `live` tests hit the Binance futures testnet and are ignored by default.
//! Run with: cargo test --test integration -- --ignored

mod cli_flow;
mod live;
mod strategies;

use std::sync::Arc;

use binance_futures_bot::audit::AuditLog;
use binance_futures_bot::cli::Cli;
use binance_futures_bot::commands::{App, CommandOutcome};
use binance_futures_bot::exchange::MockExchangeClient;
use binance_futures_bot::trading::{OrderExecutor, RetryPolicy};
use binance_futures_bot::utils::{CancelSignal, ManualClock};
use binance_futures_bot::validation::ValidationPolicy;
use binance_futures_bot::Result;
use clap::Parser;

/// App wired to `mock` with an in-memory audit log and a manual clock.
pub fn mock_app(mock: &MockExchangeClient) -> App<MockExchangeClient> {
    App::new(
        OrderExecutor::new(
            mock.clone(),
            AuditLog::memory(),
            ValidationPolicy::default(),
            RetryPolicy::default(),
        )
        .with_clock(Arc::new(ManualClock::new())),
    )
}

/// Parse `args` as a command line and dispatch it.
pub async fn run_args(app: &App<MockExchangeClient>, args: &[&str]) -> Result<CommandOutcome> {
    let cli = Cli::try_parse_from(std::iter::once("futures-bot").chain(args.iter().copied()))
        .expect("arguments should parse");
    app.dispatch(cli.command, &CancelSignal::never()).await
}

//! Binance USDT-M futures order bot.
//!
//! Places market, limit, stop-limit and take-profit/stop-loss orders on
//! Binance USDT-M futures, plus two client-side strategies (TWAP and grid).
//! Testnet is the default; mainnet is opt-in.
//!
//! Every order goes through the same path:
//!
//! ```text
//! CLI args -> Validator -> OrderExecutor -> ExchangeClient -> Binance
//!                              |
//!                              +-> AuditLog (one JSONL record per attempt)
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types and exit codes
//! - [`cli`]: Command-line surface
//! - [`commands`]: Subcommand dispatch and output
//! - [`validation`]: Pre-flight order checks
//! - [`signing`]: HMAC-SHA256 request signing
//! - [`exchange`]: Exchange client trait, REST client and mock
//! - [`trading`]: Order types and the executor
//! - [`strategy`]: TWAP and grid engines
//! - [`audit`]: Append-only JSONL audit log
//! - [`utils`]: Clocks and cancellation

pub mod audit;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exchange;
pub mod signing;
pub mod strategy;
pub mod trading;
pub mod utils;
pub mod validation;

pub use config::Config;
pub use error::{BotError, Result};

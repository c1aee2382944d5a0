//! Exchange access.
//!
//! This module handles:
//! - The `ExchangeClient` seam every higher layer talks through
//! - The Binance USDT-M futures REST client
//! - Account and position payloads
//! - Mock client for testing

pub mod client;
pub mod mock;
pub mod types;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::trading::order::{OrderRequest, OrderResult};

pub use client::BinanceClient;
pub use mock::{MockCall, MockConfig, MockExchangeClient, MockOutcome};
pub use types::{AccountBalance, Position};

/// Authenticated exchange operations. One call is one HTTP request; retries
/// belong to the caller.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit a new order.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult>;

    /// Cancel one order by exchange id.
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<OrderResult>;

    /// Cancel every open order on `symbol`.
    async fn cancel_all_orders(&self, symbol: &str) -> Result<()>;

    /// Open orders on `symbol`.
    async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderResult>>;

    /// Last traded price.
    async fn ticker_price(&self, symbol: &str) -> Result<Decimal>;

    /// Account balance summary.
    async fn account_balance(&self) -> Result<AccountBalance>;

    /// Open position on `symbol`, if any.
    async fn position(&self, symbol: &str) -> Result<Option<Position>>;

    /// Exchange clock in epoch milliseconds.
    async fn server_time(&self) -> Result<i64>;
}

//! Mock exchange client for unit testing.
//!
//! This module provides a mock client that can be used in tests
//! without making real network requests. Order placement and cancellation
//! outcomes can be scripted, and every call is logged for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use super::types::{AccountBalance, Position};
use super::ExchangeClient;
use crate::error::{ExchangeError, NetworkError, Result};
use crate::trading::order::{OrderRequest, OrderResult, OrderStatus, OrderType};

/// Scripted result for the next placement or cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Behave like the exchange would.
    Accept,
    /// HTTP 400 with this Binance code and message.
    Reject {
        /// Binance error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// Request timed out.
    NetworkFailure,
}

impl MockOutcome {
    /// Shorthand for a rejection.
    pub fn reject(code: i64, message: impl Into<String>) -> Self {
        MockOutcome::Reject {
            code,
            message: message.into(),
        }
    }
}

/// One call made against the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// `place_order`.
    PlaceOrder(OrderRequest),
    /// `cancel_order`.
    CancelOrder {
        /// Symbol.
        symbol: String,
        /// Exchange order id.
        order_id: String,
    },
    /// `cancel_all_orders`.
    CancelAll(String),
    /// `open_orders`.
    OpenOrders(String),
    /// `ticker_price`.
    TickerPrice(String),
    /// `account_balance`.
    AccountBalance,
    /// `position`.
    Position(String),
    /// `server_time`.
    ServerTime,
}

/// Configuration for mock client behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Balance to return.
    pub balance: AccountBalance,
    /// Whether ticker requests fail with a network error.
    pub fail_ticker: bool,
    /// Whether every request fails with a network error.
    pub offline: bool,
    /// Server clock minus local clock, in milliseconds.
    pub server_time_offset_ms: i64,
    /// Simulated latency in milliseconds.
    pub latency_ms: u64,
}

#[derive(Debug, Default)]
struct MockState {
    next_order_id: u64,
    open_orders: Vec<OrderResult>,
    tickers: HashMap<String, Decimal>,
    positions: HashMap<String, Position>,
    place_script: VecDeque<MockOutcome>,
    cancel_script: VecDeque<MockOutcome>,
    calls: Vec<MockCall>,
}

/// Mock exchange client for testing. Clones share state.
#[derive(Debug, Clone)]
pub struct MockExchangeClient {
    /// Mock configuration.
    config: MockConfig,
    state: Arc<Mutex<MockState>>,
}

impl MockExchangeClient {
    /// Create a new mock client with default configuration.
    pub fn new() -> Self {
        Self::with_config(MockConfig::default())
    }

    /// Create a mock client with custom configuration.
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MockState {
                next_order_id: 1000,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the ticker price for a symbol.
    pub fn set_ticker(&self, symbol: &str, price: Decimal) {
        self.state().tickers.insert(symbol.to_string(), price);
    }

    /// Set an open position.
    pub fn set_position(&self, position: Position) {
        self.state().positions.insert(position.symbol.clone(), position);
    }

    /// Queue outcomes for the next placements. Unscripted placements are accepted.
    pub fn script_placements(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.state().place_script.extend(outcomes);
    }

    /// Queue outcomes for the next cancellations. Unscripted cancellations are accepted.
    pub fn script_cancellations(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        self.state().cancel_script.extend(outcomes);
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Requests passed to `place_order`, in order.
    pub fn placed_requests(&self) -> Vec<OrderRequest> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::PlaceOrder(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Orders currently resting on the mock book.
    pub fn resting_orders(&self) -> Vec<OrderResult> {
        self.state().open_orders.clone()
    }

    async fn enter(&self, call: MockCall) -> Result<()> {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
        self.state().calls.push(call);
        if self.config.offline {
            return Err(NetworkError::Connection("mock exchange offline".to_string()).into());
        }
        Ok(())
    }

    fn apply(outcome: Option<MockOutcome>) -> Result<()> {
        match outcome.unwrap_or(MockOutcome::Accept) {
            MockOutcome::Accept => Ok(()),
            MockOutcome::Reject { code, message } => Err(ExchangeError::Rejected {
                status: 400,
                code,
                message,
            }
            .into()),
            MockOutcome::NetworkFailure => {
                Err(NetworkError::Timeout("mock request timed out".to_string()).into())
            }
        }
    }
}

impl Default for MockExchangeClient {
    fn default() -> Self {
        Self::new()
    }
}

fn order_payload(
    order_id: u64,
    request: &OrderRequest,
    status: OrderStatus,
    filled: Decimal,
    avg_price: Decimal,
) -> serde_json::Value {
    json!({
        "orderId": order_id,
        "symbol": request.symbol,
        "status": status.to_string(),
        "clientOrderId": request.client_order_id.clone().unwrap_or_default(),
        "side": request.side.as_str(),
        "type": request.order_type.wire_type(),
        "origQty": request.quantity.to_string(),
        "executedQty": filled.to_string(),
        "avgPrice": avg_price.to_string(),
        "price": request.price.unwrap_or_default().to_string(),
        "stopPrice": request.stop_price.unwrap_or_default().to_string(),
        "reduceOnly": request.reduce_only,
    })
}

#[async_trait]
impl ExchangeClient for MockExchangeClient {
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        self.enter(MockCall::PlaceOrder(request.clone())).await?;
        let mut state = self.state();
        Self::apply(state.place_script.pop_front())?;

        state.next_order_id += 1;
        let order_id = state.next_order_id;

        let raw = match request.order_type {
            OrderType::Market => {
                let price = state.tickers.get(&request.symbol).copied().unwrap_or_default();
                order_payload(order_id, request, OrderStatus::Filled, request.quantity, price)
            }
            OrderType::Limit | OrderType::StopLimit | OrderType::OcoLeg(_) => {
                order_payload(order_id, request, OrderStatus::New, Decimal::ZERO, Decimal::ZERO)
            }
        };
        let result = OrderResult::from_payload(raw)?;
        if result.status.is_open() {
            state.open_orders.push(result.clone());
        }
        Ok(result)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<OrderResult> {
        self.enter(MockCall::CancelOrder {
            symbol: symbol.to_string(),
            order_id: order_id.to_string(),
        })
        .await?;
        let mut state = self.state();
        Self::apply(state.cancel_script.pop_front())?;

        let index = state
            .open_orders
            .iter()
            .position(|o| o.symbol == symbol && o.order_id == order_id)
            .ok_or_else(|| ExchangeError::Rejected {
                status: 400,
                code: -2011,
                message: "Unknown order sent.".to_string(),
            })?;
        let mut canceled = state.open_orders.remove(index);
        canceled.status = OrderStatus::Canceled;
        if let Some(obj) = canceled.raw.as_object_mut() {
            obj.insert("status".to_string(), json!("CANCELED"));
        }
        Ok(canceled)
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        self.enter(MockCall::CancelAll(symbol.to_string())).await?;
        let mut state = self.state();
        Self::apply(state.cancel_script.pop_front())?;
        state.open_orders.retain(|o| o.symbol != symbol);
        Ok(())
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderResult>> {
        self.enter(MockCall::OpenOrders(symbol.to_string())).await?;
        Ok(self
            .state()
            .open_orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        self.enter(MockCall::TickerPrice(symbol.to_string())).await?;
        if self.config.fail_ticker {
            return Err(NetworkError::Timeout("mock ticker timed out".to_string()).into());
        }
        self.state().tickers.get(symbol).copied().ok_or_else(|| {
            ExchangeError::Rejected {
                status: 400,
                code: -1121,
                message: "Invalid symbol.".to_string(),
            }
            .into()
        })
    }

    async fn account_balance(&self) -> Result<AccountBalance> {
        self.enter(MockCall::AccountBalance).await?;
        Ok(self.config.balance.clone())
    }

    async fn position(&self, symbol: &str) -> Result<Option<Position>> {
        self.enter(MockCall::Position(symbol.to_string())).await?;
        Ok(self.state().positions.get(symbol).cloned())
    }

    async fn server_time(&self) -> Result<i64> {
        self.enter(MockCall::ServerTime).await?;
        Ok(chrono::Utc::now().timestamp_millis() + self.config.server_time_offset_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use crate::trading::order::Side;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn market_fills_at_ticker_and_limit_rests() {
        let mock = MockExchangeClient::new();
        mock.set_ticker("BTCUSDT", dec!(50000));

        let filled = mock
            .place_order(&OrderRequest::market("BTCUSDT", Side::Buy, dec!(0.01)))
            .await
            .unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);
        assert_eq!(filled.avg_price, dec!(50000));

        let resting = mock
            .place_order(&OrderRequest::limit("BTCUSDT", Side::Buy, dec!(0.01), dec!(49000)))
            .await
            .unwrap();
        assert_eq!(resting.status, OrderStatus::New);
        assert_eq!(mock.open_orders("BTCUSDT").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn scripted_outcomes_are_consumed_in_order() {
        let mock = MockExchangeClient::new();
        mock.script_placements([
            MockOutcome::NetworkFailure,
            MockOutcome::reject(-2019, "Margin is insufficient."),
        ]);
        let request = OrderRequest::limit("BTCUSDT", Side::Sell, dec!(1), dec!(60000));

        let first = mock.place_order(&request).await.unwrap_err();
        assert!(matches!(first, BotError::Network(_)));
        let second = mock.place_order(&request).await.unwrap_err();
        assert!(matches!(
            second,
            BotError::Exchange(ExchangeError::Rejected { code: -2019, .. })
        ));
        assert!(mock.place_order(&request).await.is_ok());
        assert_eq!(mock.placed_requests().len(), 3);
    }

    #[tokio::test]
    async fn cancel_unknown_order_is_rejected() {
        let mock = MockExchangeClient::new();
        let err = mock.cancel_order("BTCUSDT", "42").await.unwrap_err();
        assert!(matches!(
            err,
            BotError::Exchange(ExchangeError::Rejected { code: -2011, .. })
        ));
    }

    #[tokio::test]
    async fn cancel_all_only_touches_its_symbol() {
        let mock = MockExchangeClient::new();
        for symbol in ["BTCUSDT", "ETHUSDT"] {
            mock.place_order(&OrderRequest::limit(symbol, Side::Buy, dec!(1), dec!(100)))
                .await
                .unwrap();
        }
        mock.cancel_all_orders("BTCUSDT").await.unwrap();
        assert!(mock.open_orders("BTCUSDT").await.unwrap().is_empty());
        assert_eq!(mock.open_orders("ETHUSDT").await.unwrap().len(), 1);
    }
}

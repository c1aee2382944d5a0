//! Order execution with bounded retry and auditing.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use super::oco::{OcoPlan, OcoResult};
use super::order::{OrderRequest, OrderResult};
use crate::audit::{AuditLog, AuditRecord, Operation, Outcome};
use crate::config::Config;
use crate::error::{BotError, Result, ValidationError};
use crate::exchange::{AccountBalance, ExchangeClient, Position};
use crate::utils::{Clock, TokioClock};
use crate::validation::{ValidationPolicy, Validator};

/// Retry bound for network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Policy from `MAX_RETRIES` / `RETRY_BACKOFF_MS`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            base_backoff: config.retry_backoff(),
        }
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

fn outcome_of(err: &BotError) -> Outcome {
    match err {
        BotError::Validation(_) => Outcome::ValidationFailed,
        BotError::Exchange(_) => Outcome::ExchangeRejected,
        BotError::Network(_) => Outcome::NetworkFailure,
        BotError::Configuration(_) | BotError::Io(_) => Outcome::LocalError,
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Validates, sends and audits every exchange call.
#[derive(Debug)]
pub struct OrderExecutor<C: ExchangeClient> {
    client: C,
    audit: AuditLog,
    validator: Validator,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    order_seq: AtomicU64,
}

impl<C: ExchangeClient> OrderExecutor<C> {
    /// Create an executor on the wall clock.
    pub fn new(client: C, audit: AuditLog, policy: ValidationPolicy, retry: RetryPolicy) -> Self {
        Self {
            client,
            audit,
            validator: Validator::new(policy),
            retry,
            clock: Arc::new(TokioClock::new()),
            order_seq: AtomicU64::new(1),
        }
    }

    /// Replace the clock used for backoff and scheduling.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Audit trail.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Validator in use.
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Clock in use.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Audit and convert a failed validation; pass through success.
    pub async fn ensure_valid<T: Serialize>(
        &self,
        input: &T,
        verdict: std::result::Result<(), ValidationError>,
    ) -> Result<()> {
        if let Err(err) = verdict {
            warn!(violations = %err, "Validation failed");
            self.audit
                .record(AuditRecord::failure(
                    Operation::Validate,
                    0,
                    to_json(input),
                    Outcome::ValidationFailed,
                    &err,
                ))
                .await;
            return Err(err.into());
        }
        Ok(())
    }

    fn next_client_order_id(&self) -> String {
        let seq = self.order_seq.fetch_add(1, Ordering::Relaxed);
        format!("fbot-{}-{seq}", chrono::Utc::now().timestamp_millis())
    }

    /// Run `send` with retry on network failures, auditing every attempt.
    async fn call<T, F, Fut>(
        &self,
        operation: Operation,
        request: Value,
        render: fn(&T) -> Value,
        mut send: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match send().await {
                Ok(value) => {
                    self.audit
                        .record(AuditRecord::success(
                            operation,
                            attempt,
                            request.clone(),
                            render(&value),
                        ))
                        .await;
                    return Ok(value);
                }
                Err(err) => {
                    self.audit
                        .record(AuditRecord::failure(
                            operation,
                            attempt,
                            request.clone(),
                            outcome_of(&err),
                            &err,
                        ))
                        .await;

                    if !err.is_retryable() || attempt > self.retry.max_retries {
                        return Err(err);
                    }
                    let delay = self.retry.delay(attempt);
                    warn!(
                        %operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Network failure, retrying"
                    );
                    self.clock.sleep(delay).await;
                }
            }
        }
    }

    /// Validate and place one order.
    #[instrument(
        skip(self, request),
        fields(symbol = %request.symbol, side = %request.side, kind = request.order_type.label())
    )]
    pub async fn execute(&self, request: &OrderRequest) -> Result<OrderResult> {
        self.ensure_valid(request, self.validator.validate(request)).await?;

        let mut request = request.clone();
        if request.client_order_id.is_none() {
            request.client_order_id = Some(self.next_client_order_id());
        }
        debug!(client_order_id = ?request.client_order_id, "Placing order");

        let result = self
            .call(
                Operation::PlaceOrder,
                to_json(&request),
                |r: &OrderResult| r.raw.clone(),
                || self.client.place_order(&request),
            )
            .await?;

        info!(
            order_id = %result.order_id,
            status = %result.status,
            filled = %result.filled_quantity,
            "Order accepted"
        );
        Ok(result)
    }

    /// Place the take-profit leg, then the stop-loss leg.
    ///
    /// If the stop-loss leg fails the take-profit leg is cancelled and the
    /// stop-loss error is returned.
    #[instrument(skip(self, plan), fields(symbol = %plan.symbol, side = %plan.side))]
    pub async fn execute_oco(&self, plan: &OcoPlan) -> Result<OcoResult> {
        self.ensure_valid(plan, self.validator.validate_oco(plan)).await?;

        let take_profit = self.execute(&plan.take_profit_request()).await?;

        match self.execute(&plan.stop_loss_request()).await {
            Ok(stop_loss) => Ok(OcoResult {
                take_profit,
                stop_loss,
            }),
            Err(err) => {
                warn!(
                    order_id = %take_profit.order_id,
                    error = %err,
                    "Stop-loss leg failed, cancelling take-profit leg"
                );
                if let Err(cancel_err) = self.cancel_order(&plan.symbol, &take_profit.order_id).await
                {
                    error!(
                        symbol = %plan.symbol,
                        order_id = %take_profit.order_id,
                        error = %cancel_err,
                        "Orphaned take-profit leg left open"
                    );
                }
                Err(err)
            }
        }
    }

    /// Cancel one order.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<OrderResult> {
        self.ensure_valid(&symbol, self.validator.validate_symbol(symbol))
            .await?;
        self.call(
            Operation::CancelOrder,
            json!({"symbol": symbol, "orderId": order_id}),
            |r: &OrderResult| r.raw.clone(),
            || self.client.cancel_order(symbol, order_id),
        )
        .await
    }

    /// Cancel every open order on `symbol`.
    #[instrument(skip(self))]
    pub async fn cancel_all(&self, symbol: &str) -> Result<()> {
        self.ensure_valid(&symbol, self.validator.validate_symbol(symbol))
            .await?;
        self.call(
            Operation::CancelAll,
            json!({"symbol": symbol}),
            |_: &()| json!({"cancelled": "all"}),
            || self.client.cancel_all_orders(symbol),
        )
        .await
    }

    /// Open orders on `symbol`.
    pub async fn open_orders(&self, symbol: &str) -> Result<Vec<OrderResult>> {
        self.ensure_valid(&symbol, self.validator.validate_symbol(symbol))
            .await?;
        self.call(
            Operation::OpenOrders,
            json!({"symbol": symbol}),
            |orders: &Vec<OrderResult>| Value::Array(orders.iter().map(|o| o.raw.clone()).collect()),
            || self.client.open_orders(symbol),
        )
        .await
    }

    /// Last traded price of `symbol`.
    pub async fn ticker_price(&self, symbol: &str) -> Result<Decimal> {
        self.ensure_valid(&symbol, self.validator.validate_symbol(symbol))
            .await?;
        self.call(
            Operation::TickerPrice,
            json!({"symbol": symbol}),
            |price: &Decimal| json!({"price": price.to_string()}),
            || self.client.ticker_price(symbol),
        )
        .await
    }

    /// Account balance summary.
    pub async fn account_balance(&self) -> Result<AccountBalance> {
        self.call(
            Operation::AccountBalance,
            json!({}),
            |b: &AccountBalance| to_json(b),
            || self.client.account_balance(),
        )
        .await
    }

    /// Open position on `symbol`.
    pub async fn position(&self, symbol: &str) -> Result<Option<Position>> {
        self.ensure_valid(&symbol, self.validator.validate_symbol(symbol))
            .await?;
        self.call(
            Operation::Position,
            json!({"symbol": symbol}),
            |p: &Option<Position>| to_json(p),
            || self.client.position(symbol),
        )
        .await
    }

    /// Exchange clock in epoch milliseconds.
    pub async fn server_time(&self) -> Result<i64> {
        self.call(
            Operation::ServerTime,
            json!({}),
            |t: &i64| json!({"serverTime": t}),
            || self.client.server_time(),
        )
        .await
    }
}

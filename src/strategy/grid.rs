//! Grid placement: resting limit orders at evenly spaced price levels.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::RunState;
use crate::error::{BotError, Result, ValidationError};
use crate::exchange::ExchangeClient;
use crate::trading::{OrderExecutor, OrderRequest, OrderResult, Side, TimeInForce};
use crate::utils::CancelSignal;

/// A grid request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridPlan {
    /// Trading pair.
    pub symbol: String,
    /// Lowest level.
    pub lower_price: Decimal,
    /// Highest level.
    pub upper_price: Decimal,
    /// Number of levels, endpoints included.
    pub grid_levels: u32,
    /// Quantity at each level.
    pub quantity_per_level: Decimal,
}

impl GridPlan {
    /// Level prices from lower to upper, rounded to `price_precision`.
    ///
    /// `None` when the range overflows decimal arithmetic.
    pub fn levels(&self, price_precision: u32) -> Option<Vec<Decimal>> {
        let round =
            |p: Decimal| p.round_dp_with_strategy(price_precision, RoundingStrategy::MidpointAwayFromZero);
        match self.grid_levels {
            0 => Some(Vec::new()),
            1 => Some(vec![round(self.lower_price)]),
            n => {
                let span = self.upper_price.checked_sub(self.lower_price)?;
                let steps = Decimal::from(n - 1);
                (0..n)
                    .map(|i| {
                        let step = span.checked_mul(Decimal::from(i))?.checked_div(steps)?;
                        self.lower_price.checked_add(step).map(round)
                    })
                    .collect()
            }
        }
    }
}

/// A level that got an order.
#[derive(Debug, Clone)]
pub struct GridOrder {
    /// 0-based level index.
    pub level: usize,
    /// Level price.
    pub price: Decimal,
    /// Order side.
    pub side: Side,
    /// Exchange result.
    pub result: OrderResult,
}

/// A level that did not get an order.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLevel {
    /// 0-based level index.
    pub level: usize,
    /// Level price.
    pub price: Decimal,
    /// Why it was skipped.
    pub reason: String,
}

/// Outcome of a grid run.
#[derive(Debug)]
pub struct GridReport {
    /// Final state.
    pub state: RunState,
    /// Ticker price the sides were chosen against.
    pub reference_price: Option<Decimal>,
    /// Accepted orders.
    pub placed: Vec<GridOrder>,
    /// Levels without an order.
    pub skipped: Vec<SkippedLevel>,
    /// Error that aborted the run before any placement.
    pub failure: Option<BotError>,
    /// Whether the user stopped the run.
    pub interrupted: bool,
}

impl GridReport {
    /// Process exit code for this run.
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            return BotError::EXIT_INTERRUPTED;
        }
        match &self.failure {
            Some(e) => e.exit_code(),
            None if self.placed.is_empty() => BotError::EXIT_EXCHANGE,
            None => 0,
        }
    }
}

/// Runs grid plans through an executor.
#[derive(Debug)]
pub struct GridEngine<'a, C: ExchangeClient> {
    executor: &'a OrderExecutor<C>,
}

impl<'a, C: ExchangeClient> GridEngine<'a, C> {
    /// Create an engine.
    pub fn new(executor: &'a OrderExecutor<C>) -> Self {
        Self { executor }
    }

    /// Place BUY limits below and SELL limits above the current price.
    ///
    /// `cancel` is checked before each level; levels not yet placed are reported as skipped.
    #[instrument(skip(self, plan, cancel), fields(symbol = %plan.symbol, levels = plan.grid_levels))]
    pub async fn run(&self, plan: &GridPlan, cancel: &CancelSignal) -> Result<GridReport> {
        let validator = self.executor.validator();
        self.executor
            .ensure_valid(plan, validator.validate_grid(plan))
            .await?;

        let mut report = GridReport {
            state: RunState::Pending,
            reference_price: None,
            placed: Vec::new(),
            skipped: Vec::new(),
            failure: None,
            interrupted: false,
        };
        report.state.advance(RunState::Running);

        let reference = match self.executor.ticker_price(&plan.symbol).await {
            Ok(price) => price,
            Err(e) => {
                error!(error = %e, "No reference price, aborting grid");
                report.failure = Some(e);
                report.state.advance(RunState::Aborted);
                return Ok(report);
            }
        };
        report.reference_price = Some(reference);
        info!(reference = %reference, "Grid reference price");

        let levels = plan.levels(validator.policy().price_precision).ok_or_else(|| {
            ValidationError::single("upper_price", "range is too wide to split into levels")
        })?;
        for (level, price) in levels.into_iter().enumerate() {
            if cancel.is_cancelled() {
                report.interrupted = true;
                report.skipped.push(SkippedLevel {
                    level,
                    price,
                    reason: "interrupted".to_string(),
                });
                continue;
            }

            let side = match price.cmp(&reference) {
                std::cmp::Ordering::Less => Side::Buy,
                std::cmp::Ordering::Greater => Side::Sell,
                std::cmp::Ordering::Equal => {
                    info!(level, price = %price, "Level at reference price, skipped");
                    report.skipped.push(SkippedLevel {
                        level,
                        price,
                        reason: "at reference price".to_string(),
                    });
                    continue;
                }
            };

            let request =
                OrderRequest::limit(plan.symbol.clone(), side, plan.quantity_per_level, price)
                    .with_tif(TimeInForce::GTC);
            match self.executor.execute(&request).await {
                Ok(result) => {
                    info!(level, price = %price, %side, order_id = %result.order_id, "Grid level placed");
                    report.placed.push(GridOrder {
                        level,
                        price,
                        side,
                        result,
                    });
                }
                Err(e) => {
                    warn!(level, price = %price, error = %e, "Grid level failed, skipped");
                    report.skipped.push(SkippedLevel {
                        level,
                        price,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.interrupted {
            warn!(placed = report.placed.len(), "Grid interrupted");
            report.state.advance(RunState::Aborted);
        } else {
            report.state.advance(RunState::Completed);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::audit::AuditLog;
    use crate::exchange::{MockConfig, MockExchangeClient, MockOutcome};
    use crate::trading::RetryPolicy;
    use crate::utils::ManualClock;
    use crate::validation::ValidationPolicy;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn plan() -> GridPlan {
        GridPlan {
            symbol: "BTCUSDT".into(),
            lower_price: dec!(48000),
            upper_price: dec!(52000),
            grid_levels: 10,
            quantity_per_level: dec!(0.01),
        }
    }

    fn executor(mock: &MockExchangeClient) -> OrderExecutor<MockExchangeClient> {
        OrderExecutor::new(
            mock.clone(),
            AuditLog::memory(),
            ValidationPolicy::default(),
            RetryPolicy::default(),
        )
        .with_clock(Arc::new(ManualClock::new()))
    }

    #[test]
    fn levels_hit_both_endpoints_exactly() {
        let levels = plan().levels(2).unwrap();
        assert_eq!(levels.len(), 10);
        assert_eq!(levels[0], dec!(48000));
        assert_eq!(levels[1], dec!(48444.44));
        assert_eq!(levels[9], dec!(52000));
        assert_eq!(levels[1] - levels[0], dec!(444.44));
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn buys_below_and_sells_above_reference() {
        let mock = MockExchangeClient::new();
        mock.set_ticker("BTCUSDT", dec!(50100));
        let executor = executor(&mock);

        let report = GridEngine::new(&executor).run(&plan(), &CancelSignal::never()).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.placed.len(), 10);
        let buys = report.placed.iter().filter(|o| o.side == Side::Buy).count();
        assert_eq!(buys, 5);
        assert!(report
            .placed
            .iter()
            .all(|o| (o.side == Side::Buy) == (o.price < dec!(50100))));
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn level_at_reference_price_is_skipped() {
        let mock = MockExchangeClient::new();
        mock.set_ticker("BTCUSDT", dec!(50000));
        let executor = executor(&mock);
        let three = GridPlan {
            grid_levels: 3,
            ..plan()
        };

        let report = GridEngine::new(&executor).run(&three, &CancelSignal::never()).await.unwrap();

        assert_eq!(report.placed.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].price, dec!(50000));
    }

    #[tokio::test]
    async fn failing_level_is_skipped_and_run_completes() {
        let mock = MockExchangeClient::new();
        mock.set_ticker("BTCUSDT", dec!(50100));
        mock.script_placements([
            MockOutcome::Accept,
            MockOutcome::reject(-4016, "Limit price can't be higher than 52000."),
        ]);
        let executor = executor(&mock);

        let report = GridEngine::new(&executor).run(&plan(), &CancelSignal::never()).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.placed.len(), 9);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].level, 1);
        assert!(report.skipped[0].reason.contains("-4016"));
    }

    #[tokio::test]
    async fn missing_reference_price_aborts_before_placing() {
        let mock = MockExchangeClient::with_config(MockConfig {
            fail_ticker: true,
            ..Default::default()
        });
        let executor = executor(&mock);

        let report = GridEngine::new(&executor).run(&plan(), &CancelSignal::never()).await.unwrap();

        assert_eq!(report.state, RunState::Aborted);
        assert!(report.placed.is_empty());
        assert!(mock.placed_requests().is_empty());
        assert_eq!(report.exit_code(), BotError::EXIT_NETWORK);
    }

    #[test]
    fn overflowing_range_has_no_levels() {
        let wide = GridPlan {
            lower_price: dec!(1),
            upper_price: Decimal::MAX,
            grid_levels: 3,
            ..plan()
        };
        assert_eq!(wide.levels(2), None);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_stops_placing_further_levels() {
        let mock = MockExchangeClient::with_config(MockConfig {
            latency_ms: 10,
            ..Default::default()
        });
        mock.set_ticker("BTCUSDT", dec!(50100));
        let executor = executor(&mock);
        let (handle, signal) = CancelSignal::channel();

        // ticker at 10ms, level 0 at 20ms, level 1 in flight when the interrupt lands
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
            handle.cancel();
        });
        let report = GridEngine::new(&executor).run(&plan(), &signal).await.unwrap();

        assert_eq!(report.state, RunState::Aborted);
        assert!(report.interrupted);
        assert_eq!(report.placed.len(), 2);
        assert_eq!(mock.placed_requests().len(), 2);
        assert_eq!(report.skipped.len(), 8);
        assert!(report.skipped.iter().all(|s| s.reason == "interrupted"));
        assert_eq!(report.exit_code(), BotError::EXIT_INTERRUPTED);
    }

    #[tokio::test]
    async fn all_levels_rejected_exits_as_exchange_error() {
        let mock = MockExchangeClient::new();
        mock.set_ticker("BTCUSDT", dec!(50100));
        mock.script_placements(vec![MockOutcome::reject(-2019, "Margin is insufficient."); 10]);
        let executor = executor(&mock);

        let report = GridEngine::new(&executor).run(&plan(), &CancelSignal::never()).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert!(report.placed.is_empty());
        assert_eq!(report.exit_code(), BotError::EXIT_EXCHANGE);
    }
}

//! Time-weighted execution: one order split into evenly spaced slices.

use std::time::Duration;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use strum::{Display, EnumString};
use tracing::{error, info, instrument, warn};

use super::RunState;
use crate::error::{BotError, Result};
use crate::exchange::ExchangeClient;
use crate::trading::{OrderExecutor, OrderRequest, OrderResult, Side, TimeInForce};
use crate::utils::CancelSignal;

/// Offset applied to the ticker when pricing LIMIT slices.
const LIMIT_SLICE_OFFSET: Decimal = dec!(0.001);

/// How each slice is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display, EnumString)]
pub enum TwapOrderStyle {
    /// Market order per slice.
    #[default]
    #[strum(to_string = "MARKET", serialize = "market")]
    Market,
    /// LIMIT IOC per slice, priced just through the ticker.
    #[strum(to_string = "LIMIT", serialize = "limit")]
    Limit,
}

/// A TWAP request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TwapPlan {
    /// Trading pair.
    pub symbol: String,
    /// Side of every slice.
    pub side: Side,
    /// Quantity across all slices.
    pub total_quantity: Decimal,
    /// Time from first to last slice start, plus one interval.
    pub duration_secs: u64,
    /// Number of slices.
    pub interval_count: u32,
    /// Order style per slice.
    pub style: TwapOrderStyle,
}

/// One planned slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledSlice {
    /// 0-based slice index.
    pub index: usize,
    /// Delay from the start of the run.
    pub offset: Duration,
    /// Slice quantity.
    pub quantity: Decimal,
}

impl TwapPlan {
    /// Slice size for all but the final slice.
    pub fn base_slice(&self, quantity_precision: u32) -> Decimal {
        if self.interval_count == 0 {
            return Decimal::ZERO;
        }
        (self.total_quantity / Decimal::from(self.interval_count))
            .round_dp_with_strategy(quantity_precision, RoundingStrategy::ToZero)
    }

    /// Quantities per slice; the last absorbs the rounding remainder.
    pub fn slice_quantities(&self, quantity_precision: u32) -> Vec<Decimal> {
        let n = self.interval_count as usize;
        if n == 0 {
            return Vec::new();
        }
        let base = self.base_slice(quantity_precision);
        let mut slices = vec![base; n];
        slices[n - 1] = self.total_quantity - base * Decimal::from(self.interval_count - 1);
        slices
    }

    /// Start of slice `index`, `None` if the offset does not fit a `Duration`.
    fn offset(&self, index: u32) -> Option<Duration> {
        Duration::from_secs(self.duration_secs)
            .checked_mul(index)
            .map(|d| d / self.interval_count.max(1))
    }

    /// Start of the final slice; `None` when the duration is too long to schedule.
    pub fn last_offset(&self) -> Option<Duration> {
        self.offset(self.interval_count.saturating_sub(1))
    }

    /// Slice `i` starts at `i * duration / interval_count`.
    ///
    /// Offsets that overflow saturate at `Duration::MAX`; validated plans never do.
    pub fn schedule(&self, quantity_precision: u32) -> Vec<ScheduledSlice> {
        self.slice_quantities(quantity_precision)
            .into_iter()
            .enumerate()
            .map(|(index, quantity)| ScheduledSlice {
                index,
                offset: self.offset(index as u32).unwrap_or(Duration::MAX),
                quantity,
            })
            .collect()
    }
}

/// A slice the exchange accepted.
#[derive(Debug, Clone)]
pub struct SliceFill {
    /// Slice index.
    pub index: usize,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Exchange result.
    pub result: OrderResult,
}

/// The slice that stopped the run.
#[derive(Debug)]
pub struct SliceFailure {
    /// Slice index.
    pub index: usize,
    /// Final error after retries.
    pub error: BotError,
}

/// Outcome of a TWAP run.
#[derive(Debug)]
pub struct TwapReport {
    /// Final state.
    pub state: RunState,
    /// Slices planned.
    pub planned: usize,
    /// Accepted slices, in order. Never rolled back.
    pub completed: Vec<SliceFill>,
    /// Slice failure that aborted the run.
    pub failure: Option<SliceFailure>,
    /// Whether the user interrupted the run.
    pub interrupted: bool,
}

impl TwapReport {
    /// Quantity actually executed across accepted slices.
    pub fn filled_quantity(&self) -> Decimal {
        self.completed.iter().map(|s| s.result.filled_quantity).sum()
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            BotError::EXIT_INTERRUPTED
        } else if let Some(failure) = &self.failure {
            failure.error.exit_code()
        } else {
            0
        }
    }
}

/// Runs TWAP plans through an executor.
#[derive(Debug)]
pub struct TwapEngine<'a, C: ExchangeClient> {
    executor: &'a OrderExecutor<C>,
}

impl<'a, C: ExchangeClient> TwapEngine<'a, C> {
    /// Create an engine.
    pub fn new(executor: &'a OrderExecutor<C>) -> Self {
        Self { executor }
    }

    /// Execute `plan` until every slice is placed, one fails, or `cancel` fires.
    #[instrument(skip(self, plan, cancel), fields(symbol = %plan.symbol, side = %plan.side, slices = plan.interval_count))]
    pub async fn run(&self, plan: &TwapPlan, cancel: &CancelSignal) -> Result<TwapReport> {
        let validator = self.executor.validator();
        self.executor
            .ensure_valid(plan, validator.validate_twap(plan))
            .await?;

        let policy = validator.policy().clone();
        let schedule = plan.schedule(policy.quantity_precision);
        let mut report = TwapReport {
            state: RunState::Pending,
            planned: schedule.len(),
            completed: Vec::with_capacity(schedule.len()),
            failure: None,
            interrupted: false,
        };
        report.state.advance(RunState::Running);

        let clock = self.executor.clock();
        let start = clock.elapsed();
        info!(total = %plan.total_quantity, duration_secs = plan.duration_secs, "TWAP started");

        for slice in schedule {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            let due = start + slice.offset;
            let now = clock.elapsed();
            if due > now {
                tokio::select! {
                    _ = clock.sleep(due - now) => {}
                    _ = cancel.cancelled() => {
                        report.interrupted = true;
                        break;
                    }
                }
            }

            let placed = match self.slice_request(plan, &slice, policy.price_precision).await {
                Ok(request) => self.executor.execute(&request).await,
                Err(e) => Err(e),
            };

            match placed {
                Ok(result) => {
                    info!(
                        slice = slice.index + 1,
                        of = report.planned,
                        quantity = %slice.quantity,
                        order_id = %result.order_id,
                        "TWAP slice placed"
                    );
                    report.completed.push(SliceFill {
                        index: slice.index,
                        quantity: slice.quantity,
                        result,
                    });
                }
                Err(e) => {
                    error!(slice = slice.index + 1, error = %e, "TWAP slice failed, aborting");
                    report.failure = Some(SliceFailure {
                        index: slice.index,
                        error: e,
                    });
                    break;
                }
            }
        }

        if report.interrupted {
            warn!(completed = report.completed.len(), "TWAP interrupted");
        }
        let end = if report.interrupted || report.failure.is_some() {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        report.state.advance(end);
        Ok(report)
    }

    async fn slice_request(
        &self,
        plan: &TwapPlan,
        slice: &ScheduledSlice,
        price_precision: u32,
    ) -> Result<OrderRequest> {
        match plan.style {
            TwapOrderStyle::Market => Ok(OrderRequest::market(
                plan.symbol.clone(),
                plan.side,
                slice.quantity,
            )),
            TwapOrderStyle::Limit => {
                let ticker = self.executor.ticker_price(&plan.symbol).await?;
                let factor = match plan.side {
                    Side::Buy => Decimal::ONE - LIMIT_SLICE_OFFSET,
                    Side::Sell => Decimal::ONE + LIMIT_SLICE_OFFSET,
                };
                let price = (ticker * factor)
                    .round_dp_with_strategy(price_precision, RoundingStrategy::MidpointAwayFromZero);
                Ok(
                    OrderRequest::limit(plan.symbol.clone(), plan.side, slice.quantity, price)
                        .with_tif(TimeInForce::IOC),
                )
            }
        }
    }
}

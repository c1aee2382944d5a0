//! Subcommand dispatch and result rendering.

use std::fmt;

use tracing::{info, instrument, warn};

use crate::cli::Command;
use crate::error::{Result, ValidationError};
use crate::exchange::{AccountBalance, ExchangeClient, Position};
use crate::strategy::{GridEngine, GridPlan, GridReport, TwapEngine, TwapPlan, TwapReport};
use crate::trading::{OcoPlan, OcoResult, OrderExecutor, OrderRequest, OrderResult};
use crate::utils::CancelSignal;

/// Largest clock offset still considered in sync.
pub const TIME_SYNC_THRESHOLD_MS: i64 = 1000;

const HEAVY_RULE: &str = "======================================================================";
const LIGHT_RULE: &str = "----------------------------------------------------------------------";

/// Position and open orders on one symbol.
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    /// Trading pair.
    pub symbol: String,
    /// Open position, if any.
    pub position: Option<Position>,
    /// Resting orders.
    pub open_orders: Vec<OrderResult>,
}

/// Local vs exchange clock comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSyncReport {
    /// Exchange time, epoch ms.
    pub server_ms: i64,
    /// Local time at the request midpoint, epoch ms.
    pub local_ms: i64,
    /// `server_ms - local_ms`.
    pub offset_ms: i64,
}

impl TimeSyncReport {
    /// Whether the offset is within [`TIME_SYNC_THRESHOLD_MS`].
    pub fn in_sync(&self) -> bool {
        self.offset_ms.abs() <= TIME_SYNC_THRESHOLD_MS
    }
}

/// What a command produced.
#[derive(Debug)]
pub enum CommandOutcome {
    /// Single order accepted.
    Order {
        /// Request as placed.
        request: OrderRequest,
        /// Exchange result.
        result: OrderResult,
    },
    /// Both OCO legs accepted.
    Oco {
        /// Plan.
        plan: OcoPlan,
        /// Both legs.
        result: OcoResult,
    },
    /// TWAP run finished (possibly aborted).
    Twap {
        /// Plan.
        plan: TwapPlan,
        /// Run report.
        report: TwapReport,
    },
    /// Grid run finished (possibly aborted).
    Grid {
        /// Plan.
        plan: GridPlan,
        /// Run report.
        report: GridReport,
    },
    /// Account overview.
    Info {
        /// Balances.
        balance: AccountBalance,
        /// Symbol details when requested.
        symbol: Option<SymbolInfo>,
    },
    /// One order cancelled.
    Cancelled(OrderResult),
    /// Every open order on a symbol cancelled.
    CancelledAll {
        /// Trading pair.
        symbol: String,
    },
    /// Clock comparison.
    TimeSync(TimeSyncReport),
}

impl CommandOutcome {
    /// Process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            CommandOutcome::Twap { report, .. } => report.exit_code(),
            CommandOutcome::Grid { report, .. } => report.exit_code(),
            _ => 0,
        }
    }
}

/// Maps subcommands onto the executor and the strategy engines.
#[derive(Debug)]
pub struct App<C: ExchangeClient> {
    executor: OrderExecutor<C>,
}

impl<C: ExchangeClient> App<C> {
    /// Create an app around an executor.
    pub fn new(executor: OrderExecutor<C>) -> Self {
        Self { executor }
    }

    /// Executor in use.
    pub fn executor(&self) -> &OrderExecutor<C> {
        &self.executor
    }

    /// Run one subcommand.
    #[instrument(skip_all, fields(command = command.name()))]
    pub async fn dispatch(&self, command: Command, cancel: &CancelSignal) -> Result<CommandOutcome> {
        match command {
            Command::Market {
                side,
                symbol,
                quantity,
                flags,
            } => {
                let request =
                    OrderRequest::market(symbol, side, quantity).with_reduce_only(flags.reduce_only);
                self.place(request).await
            }
            Command::Limit {
                side,
                symbol,
                quantity,
                price,
                time_in_force,
                flags,
            } => {
                let request = OrderRequest::limit(symbol, side, quantity, price)
                    .with_tif(time_in_force)
                    .with_reduce_only(flags.reduce_only);
                self.place(request).await
            }
            Command::StopLimit {
                side,
                symbol,
                quantity,
                price,
                stop_price,
                flags,
            } => {
                let request = OrderRequest::stop_limit(symbol, side, quantity, price, stop_price)
                    .with_reduce_only(flags.reduce_only);
                self.place(request).await
            }
            Command::Oco {
                side,
                symbol,
                quantity,
                entry_price,
                stop_loss_price,
                take_profit_price,
                flags,
            } => {
                let plan = OcoPlan {
                    symbol,
                    side,
                    quantity,
                    entry_price,
                    stop_loss_price,
                    take_profit_price,
                    reduce_only: flags.reduce_only,
                };
                let result = self.executor.execute_oco(&plan).await?;
                Ok(CommandOutcome::Oco { plan, result })
            }
            Command::Twap {
                side,
                symbol,
                quantity,
                duration_sec,
                intervals,
                order_type,
            } => {
                let plan = TwapPlan {
                    symbol,
                    side,
                    total_quantity: quantity,
                    duration_secs: duration_sec,
                    interval_count: intervals,
                    style: order_type,
                };
                let report = TwapEngine::new(&self.executor).run(&plan, cancel).await?;
                Ok(CommandOutcome::Twap { plan, report })
            }
            Command::Grid {
                symbol,
                lower_price,
                upper_price,
                levels,
                quantity_per_level,
            } => {
                let plan = GridPlan {
                    symbol,
                    lower_price,
                    upper_price,
                    grid_levels: levels,
                    quantity_per_level,
                };
                let report = GridEngine::new(&self.executor).run(&plan, cancel).await?;
                Ok(CommandOutcome::Grid { plan, report })
            }
            Command::Info { symbol } => self.info(symbol).await,
            Command::Cancel {
                symbol,
                order_id,
                all,
            } => {
                if all {
                    self.executor.cancel_all(&symbol).await?;
                    info!(%symbol, "Cancelled all open orders");
                    Ok(CommandOutcome::CancelledAll { symbol })
                } else if let Some(order_id) = order_id {
                    let result = self.executor.cancel_order(&symbol, &order_id).await?;
                    Ok(CommandOutcome::Cancelled(result))
                } else {
                    Err(ValidationError::single("order_id", "give an order id or --all").into())
                }
            }
            Command::TimeSync => self.time_sync().await,
        }
    }

    async fn place(&self, request: OrderRequest) -> Result<CommandOutcome> {
        let result = self.executor.execute(&request).await?;
        Ok(CommandOutcome::Order { request, result })
    }

    async fn info(&self, symbol: Option<String>) -> Result<CommandOutcome> {
        let balance = self.executor.account_balance().await?;
        let symbol = match symbol {
            Some(symbol) => {
                let position = self.executor.position(&symbol).await?;
                let open_orders = self.executor.open_orders(&symbol).await?;
                Some(SymbolInfo {
                    symbol,
                    position,
                    open_orders,
                })
            }
            None => None,
        };
        Ok(CommandOutcome::Info { balance, symbol })
    }

    async fn time_sync(&self) -> Result<CommandOutcome> {
        let before = chrono::Utc::now().timestamp_millis();
        let server_ms = self.executor.server_time().await?;
        let after = chrono::Utc::now().timestamp_millis();

        let local_ms = before + (after - before) / 2;
        let report = TimeSyncReport {
            server_ms,
            local_ms,
            offset_ms: server_ms - local_ms,
        };
        if !report.in_sync() {
            warn!(offset_ms = report.offset_ms, "Local clock is out of sync with the exchange");
        }
        Ok(CommandOutcome::TimeSync(report))
    }
}

fn header(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "{HEAVY_RULE}")?;
    writeln!(f, "{title}")?;
    writeln!(f, "{LIGHT_RULE}")
}

fn order_lines(f: &mut fmt::Formatter<'_>, result: &OrderResult) -> fmt::Result {
    writeln!(f, "  Order ID:   {}", result.order_id)?;
    writeln!(f, "  Status:     {}", result.status)?;
    writeln!(f, "  Filled:     {}", result.filled_quantity.normalize())?;
    if !result.avg_price.is_zero() {
        writeln!(f, "  Avg Price:  {}", result.avg_price.normalize())?;
    }
    Ok(())
}

fn order_title(request: &OrderRequest) -> String {
    let mut title = format!(
        "{} {} {} {}",
        request.order_type.label(),
        request.side,
        request.quantity.normalize(),
        request.symbol
    );
    if let Some(price) = request.price {
        title.push_str(&format!(" @ {}", price.normalize()));
    }
    if let Some(stop) = request.stop_price {
        title.push_str(&format!(" (stop {})", stop.normalize()));
    }
    if request.reduce_only {
        title.push_str(" [reduce-only]");
    }
    title
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Order { request, result } => {
                header(f, &order_title(request))?;
                order_lines(f, result)?;
            }
            CommandOutcome::Oco { plan, result } => {
                header(
                    f,
                    &format!(
                        "OCO {} {} {} (entry {})",
                        plan.side,
                        plan.quantity.normalize(),
                        plan.symbol,
                        plan.entry_price.normalize()
                    ),
                )?;
                writeln!(f, "Take-profit @ {}", plan.take_profit_price.normalize())?;
                order_lines(f, &result.take_profit)?;
                writeln!(f, "Stop-loss @ {}", plan.stop_loss_price.normalize())?;
                order_lines(f, &result.stop_loss)?;
            }
            CommandOutcome::Twap { plan, report } => {
                header(
                    f,
                    &format!(
                        "TWAP {} {} {} over {}s in {} slices ({})",
                        plan.side,
                        plan.total_quantity.normalize(),
                        plan.symbol,
                        plan.duration_secs,
                        plan.interval_count,
                        plan.style
                    ),
                )?;
                for slice in &report.completed {
                    writeln!(
                        f,
                        "  Slice {}/{}: {} -> order {} {} filled {}",
                        slice.index + 1,
                        report.planned,
                        slice.quantity.normalize(),
                        slice.result.order_id,
                        slice.result.status,
                        slice.result.filled_quantity.normalize()
                    )?;
                }
                if let Some(failure) = &report.failure {
                    writeln!(
                        f,
                        "  Slice {}/{} FAILED: {}",
                        failure.index + 1,
                        report.planned,
                        failure.error
                    )?;
                }
                if report.interrupted {
                    writeln!(f, "  Interrupted by user")?;
                }
                writeln!(f, "{LIGHT_RULE}")?;
                writeln!(
                    f,
                    "{}: {} of {} slices, filled {}",
                    report.state,
                    report.completed.len(),
                    report.planned,
                    report.filled_quantity().normalize()
                )?;
            }
            CommandOutcome::Grid { plan, report } => {
                header(
                    f,
                    &format!(
                        "GRID {} {}..{} x{} levels, {} each",
                        plan.symbol,
                        plan.lower_price.normalize(),
                        plan.upper_price.normalize(),
                        plan.grid_levels,
                        plan.quantity_per_level.normalize()
                    ),
                )?;
                if let Some(price) = report.reference_price {
                    writeln!(f, "  Reference price: {}", price.normalize())?;
                }
                for order in &report.placed {
                    writeln!(
                        f,
                        "  Level {:>2} {:<4} @ {} -> order {}",
                        order.level + 1,
                        order.side,
                        order.price.normalize(),
                        order.result.order_id
                    )?;
                }
                for skipped in &report.skipped {
                    writeln!(
                        f,
                        "  Level {:>2} skipped @ {}: {}",
                        skipped.level + 1,
                        skipped.price.normalize(),
                        skipped.reason
                    )?;
                }
                if let Some(failure) = &report.failure {
                    writeln!(f, "  ABORTED: {failure}")?;
                }
                if report.interrupted {
                    writeln!(f, "  Interrupted by user")?;
                }
                writeln!(f, "{LIGHT_RULE}")?;
                writeln!(
                    f,
                    "{}: {} placed, {} skipped",
                    report.state,
                    report.placed.len(),
                    report.skipped.len()
                )?;
            }
            CommandOutcome::Info { balance, symbol } => {
                header(f, "ACCOUNT")?;
                writeln!(f, "  Wallet balance:     {}", balance.total_wallet_balance.normalize())?;
                writeln!(f, "  Available balance:  {}", balance.available_balance.normalize())?;
                writeln!(f, "  Unrealized PnL:     {}", balance.total_unrealized_profit.normalize())?;
                writeln!(f, "  Margin balance:     {}", balance.total_margin_balance.normalize())?;
                if let Some(info) = symbol {
                    writeln!(f, "{LIGHT_RULE}")?;
                    writeln!(f, "{}", info.symbol)?;
                    match &info.position {
                        Some(p) => {
                            writeln!(f, "  Position:       {}", p.position_amount.normalize())?;
                            writeln!(f, "  Entry price:    {}", p.entry_price.normalize())?;
                            writeln!(f, "  Unrealized PnL: {}", p.unrealized_profit.normalize())?;
                            writeln!(f, "  Leverage:       {}x", p.leverage)?;
                        }
                        None => writeln!(f, "  Position:       none")?,
                    }
                    writeln!(f, "  Open orders:    {}", info.open_orders.len())?;
                    for order in &info.open_orders {
                        writeln!(
                            f,
                            "    {} {} executed {}",
                            order.order_id,
                            order.status,
                            order.filled_quantity.normalize()
                        )?;
                    }
                }
            }
            CommandOutcome::Cancelled(result) => {
                header(f, &format!("CANCEL {} {}", result.symbol, result.order_id))?;
                order_lines(f, result)?;
            }
            CommandOutcome::CancelledAll { symbol } => {
                header(f, &format!("CANCEL ALL {symbol}"))?;
                writeln!(f, "  All open orders cancelled")?;
            }
            CommandOutcome::TimeSync(report) => {
                header(f, "TIME SYNC")?;
                writeln!(f, "  Server time:  {} ms", report.server_ms)?;
                writeln!(f, "  Local time:   {} ms", report.local_ms)?;
                writeln!(f, "  Offset:       {} ms", report.offset_ms)?;
                if report.in_sync() {
                    writeln!(f, "  In sync (within {TIME_SYNC_THRESHOLD_MS} ms)")?;
                } else {
                    writeln!(
                        f,
                        "  WARNING: clock differs by more than {TIME_SYNC_THRESHOLD_MS} ms; signed requests may fail with -1021"
                    )?;
                }
            }
        }
        write!(f, "{HEAVY_RULE}")
    }
}

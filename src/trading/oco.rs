//! One-cancels-the-other protection pair.
//!
//! Binance futures has no native OCO, so a plan becomes two conditional
//! market orders on the closing side: a take-profit and a stop-loss.

use rust_decimal::Decimal;
use serde::Serialize;

use super::order::{OcoLeg, OrderRequest, OrderResult, Side};

/// Protection around a position opened (or to be opened) on `side` at `entry_price`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcoPlan {
    /// Trading pair.
    pub symbol: String,
    /// Side of the position being protected.
    pub side: Side,
    /// Quantity each leg closes.
    pub quantity: Decimal,
    /// Reference entry price.
    pub entry_price: Decimal,
    /// Stop-loss trigger.
    pub stop_loss_price: Decimal,
    /// Take-profit trigger.
    pub take_profit_price: Decimal,
    /// Mark both legs reduce-only.
    pub reduce_only: bool,
}

impl OcoPlan {
    /// Side both legs trade on.
    pub fn closing_side(&self) -> Side {
        self.side.opposite()
    }

    /// Take-profit request, placed first.
    pub fn take_profit_request(&self) -> OrderRequest {
        self.leg(OcoLeg::TakeProfit, self.take_profit_price)
    }

    /// Stop-loss request, placed second.
    pub fn stop_loss_request(&self) -> OrderRequest {
        self.leg(OcoLeg::StopLoss, self.stop_loss_price)
    }

    fn leg(&self, leg: OcoLeg, trigger: Decimal) -> OrderRequest {
        OrderRequest::oco_leg(
            self.symbol.clone(),
            self.closing_side(),
            leg,
            self.quantity,
            trigger,
        )
        .with_reduce_only(self.reduce_only)
    }
}

/// Both accepted legs.
#[derive(Debug, Clone, PartialEq)]
pub struct OcoResult {
    /// Take-profit leg.
    pub take_profit: OrderResult,
    /// Stop-loss leg.
    pub stop_loss: OrderResult,
}

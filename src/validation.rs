//! Pure pre-flight checks on orders and plans.
//!
//! Nothing in here touches the network. Every check runs even after an
//! earlier one failed so the caller sees all violations at once.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{ValidationError, Violation};
use crate::strategy::grid::GridPlan;
use crate::strategy::twap::TwapPlan;
use crate::trading::oco::OcoPlan;
use crate::trading::order::{OrderRequest, OrderType, Side};

static SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]+$").expect("static symbol pattern is valid"));

/// Required relation between a stop-limit order's stop price and limit price.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StopPricePolicy {
    /// SELL stop at or below the limit price, BUY stop at or above.
    #[default]
    Conventional,
    /// SELL stop at or above the limit price, BUY stop at or below.
    Inverted,
    /// No relation enforced.
    Unchecked,
}

impl StopPricePolicy {
    /// Check `stop` against `price` for `side`; returns the reason on failure.
    fn check(&self, side: Side, stop: Decimal, price: Decimal) -> Option<String> {
        let stop_at_or_below = match self {
            StopPricePolicy::Unchecked => return None,
            StopPricePolicy::Conventional => side == Side::Sell,
            StopPricePolicy::Inverted => side == Side::Buy,
        };
        if stop_at_or_below && stop > price {
            Some(format!("must be <= price {price} for {side} ({self} policy)"))
        } else if !stop_at_or_below && stop < price {
            Some(format!("must be >= price {price} for {side} ({self} policy)"))
        } else {
            None
        }
    }
}

/// Tunables the validator applies.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationPolicy {
    /// Smallest accepted quantity.
    pub min_quantity: Decimal,
    /// Decimal places for computed quantities.
    pub quantity_precision: u32,
    /// Decimal places for computed prices.
    pub price_precision: u32,
    /// Stop/limit price relation for stop-limit orders.
    pub stop_price_policy: StopPricePolicy,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            min_quantity: Decimal::new(1, 3),
            quantity_precision: 3,
            price_precision: 2,
            stop_price_policy: StopPricePolicy::Conventional,
        }
    }
}

/// Stateless validator bound to one policy.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    policy: ValidationPolicy,
}

impl Validator {
    /// Create a validator for `policy`.
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    /// Active policy.
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Validate a bare symbol (cancel, info).
    pub fn validate_symbol(&self, symbol: &str) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        check_symbol(symbol, &mut violations);
        finish(violations)
    }

    /// Validate a single order request.
    pub fn validate(&self, request: &OrderRequest) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        check_symbol(&request.symbol, &mut violations);
        self.check_quantity("quantity", request.quantity, &mut violations);

        let kind = request.order_type;
        match request.price {
            None if kind.requires_price() => {
                violations.push(Violation::new("price", format!("required for {}", kind.label())))
            }
            Some(_) if !kind.requires_price() => violations.push(Violation::new(
                "price",
                format!("not allowed for {}", kind.label()),
            )),
            Some(p) if p <= Decimal::ZERO => {
                violations.push(Violation::new("price", format!("must be positive, got {p}")))
            }
            _ => {}
        }

        match request.stop_price {
            None if kind.requires_stop_price() => violations.push(Violation::new(
                "stop_price",
                format!("required for {}", kind.label()),
            )),
            Some(_) if !kind.requires_stop_price() => violations.push(Violation::new(
                "stop_price",
                format!("not allowed for {}", kind.label()),
            )),
            Some(s) if s <= Decimal::ZERO => violations.push(Violation::new(
                "stop_price",
                format!("must be positive, got {s}"),
            )),
            Some(s) => {
                if let (OrderType::StopLimit, Some(p)) = (kind, request.price) {
                    if p > Decimal::ZERO {
                        if let Some(reason) = self.policy.stop_price_policy.check(request.side, s, p)
                        {
                            violations.push(Violation::new("stop_price", reason));
                        }
                    }
                }
            }
            None => {}
        }

        finish(violations)
    }

    /// Validate a TWAP plan.
    pub fn validate_twap(&self, plan: &TwapPlan) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        check_symbol(&plan.symbol, &mut violations);
        self.check_quantity("quantity", plan.total_quantity, &mut violations);

        if plan.interval_count == 0 {
            violations.push(Violation::new("intervals", "must be at least 1"));
        } else if plan.last_offset().is_none() {
            violations.push(Violation::new(
                "duration",
                format!("{}s cannot be scheduled over {} slices", plan.duration_secs, plan.interval_count),
            ));
        }
        if plan.interval_count > 0 && plan.total_quantity > Decimal::ZERO {
            let slice = plan.base_slice(self.policy.quantity_precision);
            if slice < self.policy.min_quantity {
                violations.push(Violation::new(
                    "intervals",
                    format!(
                        "slice size {slice} is below minimum quantity {}; use fewer intervals",
                        self.policy.min_quantity
                    ),
                ));
            }
        }

        finish(violations)
    }

    /// Validate a grid plan.
    pub fn validate_grid(&self, plan: &GridPlan) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        check_symbol(&plan.symbol, &mut violations);
        self.check_quantity("quantity_per_level", plan.quantity_per_level, &mut violations);

        let mut prices_ok = true;
        if plan.lower_price <= Decimal::ZERO {
            violations.push(Violation::new("lower_price", "must be positive"));
            prices_ok = false;
        }
        if plan.upper_price <= plan.lower_price {
            violations.push(Violation::new(
                "upper_price",
                format!("must be greater than lower price {}", plan.lower_price),
            ));
            prices_ok = false;
        }
        if plan.grid_levels < 2 {
            violations.push(Violation::new("levels", "must be at least 2"));
        } else if prices_ok {
            match plan.levels(self.policy.price_precision) {
                None => violations.push(Violation::new(
                    "upper_price",
                    format!("range {}..{} is too wide to split into levels", plan.lower_price, plan.upper_price),
                )),
                Some(levels) if levels.windows(2).any(|w| w[0] >= w[1]) => {
                    violations.push(Violation::new(
                        "levels",
                        format!(
                            "adjacent levels collapse at {} decimal places; use fewer levels or a wider range",
                            self.policy.price_precision
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        finish(violations)
    }

    /// Validate an OCO plan.
    pub fn validate_oco(&self, plan: &OcoPlan) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        check_symbol(&plan.symbol, &mut violations);
        self.check_quantity("quantity", plan.quantity, &mut violations);

        let prices = [
            ("entry_price", plan.entry_price),
            ("stop_loss_price", plan.stop_loss_price),
            ("take_profit_price", plan.take_profit_price),
        ];
        let mut all_positive = true;
        for (field, value) in prices {
            if value <= Decimal::ZERO {
                violations.push(Violation::new(field, format!("must be positive, got {value}")));
                all_positive = false;
            }
        }

        if all_positive {
            let (sl, entry, tp) = (plan.stop_loss_price, plan.entry_price, plan.take_profit_price);
            match plan.side {
                Side::Buy => {
                    if sl >= entry {
                        violations.push(Violation::new(
                            "stop_loss_price",
                            format!("must be below entry {entry} for BUY"),
                        ));
                    }
                    if tp <= entry {
                        violations.push(Violation::new(
                            "take_profit_price",
                            format!("must be above entry {entry} for BUY"),
                        ));
                    }
                }
                Side::Sell => {
                    if sl <= entry {
                        violations.push(Violation::new(
                            "stop_loss_price",
                            format!("must be above entry {entry} for SELL"),
                        ));
                    }
                    if tp >= entry {
                        violations.push(Violation::new(
                            "take_profit_price",
                            format!("must be below entry {entry} for SELL"),
                        ));
                    }
                }
            }
        }

        finish(violations)
    }

    fn check_quantity(&self, field: &'static str, quantity: Decimal, out: &mut Vec<Violation>) {
        if quantity <= Decimal::ZERO {
            out.push(Violation::new(field, format!("must be positive, got {quantity}")));
        } else if quantity < self.policy.min_quantity {
            out.push(Violation::new(
                field,
                format!("{quantity} is below minimum {}", self.policy.min_quantity),
            ));
        }
    }
}

fn check_symbol(symbol: &str, out: &mut Vec<Violation>) {
    if symbol.is_empty() {
        out.push(Violation::new("symbol", "must not be empty"));
    } else if !SYMBOL_RE.is_match(symbol) {
        out.push(Violation::new(
            "symbol",
            format!("{symbol:?} must be uppercase letters and digits only"),
        ));
    }
}

fn finish(violations: Vec<Violation>) -> Result<(), ValidationError> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(violations))
    }
}

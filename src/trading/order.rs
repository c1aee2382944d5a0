//! Order types and creation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ExchangeError;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(to_string = "BUY", serialize = "buy", serialize = "Buy")]
    Buy,
    /// Sell order.
    #[strum(to_string = "SELL", serialize = "sell", serialize = "Sell")]
    Sell,
}

impl Side {
    /// Side that closes a position opened on this side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Order time-in-force.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good-till-cancelled: stays on book until filled or cancelled.
    #[default]
    #[strum(to_string = "GTC", serialize = "gtc")]
    GTC,
    /// Immediate-or-cancel: fill what's available, cancel rest.
    #[strum(to_string = "IOC", serialize = "ioc")]
    IOC,
    /// Fill-or-kill: must fill entirely or cancel.
    #[strum(to_string = "FOK", serialize = "fok")]
    FOK,
}

/// Which half of an OCO pair a leg is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OcoLeg {
    /// Closes the position in profit.
    #[strum(serialize = "take-profit")]
    TakeProfit,
    /// Closes the position at a loss.
    #[strum(serialize = "stop-loss")]
    StopLoss,
}

/// Closed set of order types this client submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Fill at market.
    Market,
    /// Rest at `price`.
    Limit,
    /// Becomes a limit order at `price` once `stop_price` trades.
    StopLimit,
    /// One leg of an OCO pair; `price` is the trigger.
    OcoLeg(OcoLeg),
}

impl OrderType {
    /// Whether `price` must be present.
    pub fn requires_price(&self) -> bool {
        match self {
            OrderType::Market => false,
            OrderType::Limit | OrderType::StopLimit | OrderType::OcoLeg(_) => true,
        }
    }

    /// Whether `stop_price` must be present.
    pub fn requires_stop_price(&self) -> bool {
        match self {
            OrderType::StopLimit => true,
            OrderType::Market | OrderType::Limit | OrderType::OcoLeg(_) => false,
        }
    }

    /// Binance futures `type` parameter.
    pub fn wire_type(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopLimit => "STOP",
            OrderType::OcoLeg(OcoLeg::TakeProfit) => "TAKE_PROFIT_MARKET",
            OrderType::OcoLeg(OcoLeg::StopLoss) => "STOP_MARKET",
        }
    }

    /// Short label for logs and output.
    pub fn label(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopLimit => "STOP_LIMIT",
            OrderType::OcoLeg(_) => "OCO_LEG",
        }
    }
}

/// A single order as the user asked for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Trading pair, e.g. `BTCUSDT`.
    pub symbol: String,
    /// Order side.
    pub side: Side,
    /// Order type.
    pub order_type: OrderType,
    /// Order quantity in base asset.
    pub quantity: Decimal,
    /// Limit or trigger price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Stop price (stop-limit only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    /// Time-in-force for resting orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,
    /// Only reduce an existing position.
    #[serde(default)]
    pub reduce_only: bool,
    /// Client order id, fixed before the first attempt so retries are idempotent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    fn base(symbol: impl Into<String>, side: Side, order_type: OrderType, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            order_type,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: None,
            reduce_only: false,
            client_order_id: None,
        }
    }

    /// Create a market order.
    pub fn market(symbol: impl Into<String>, side: Side, quantity: Decimal) -> Self {
        Self::base(symbol, side, OrderType::Market, quantity)
    }

    /// Create a GTC limit order.
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            price: Some(price),
            time_in_force: Some(TimeInForce::GTC),
            ..Self::base(symbol, side, OrderType::Limit, quantity)
        }
    }

    /// Create a GTC stop-limit order.
    pub fn stop_limit(
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        stop_price: Decimal,
    ) -> Self {
        Self {
            price: Some(price),
            stop_price: Some(stop_price),
            time_in_force: Some(TimeInForce::GTC),
            ..Self::base(symbol, side, OrderType::StopLimit, quantity)
        }
    }

    /// Create one OCO leg triggered at `trigger_price`.
    pub fn oco_leg(
        symbol: impl Into<String>,
        side: Side,
        leg: OcoLeg,
        quantity: Decimal,
        trigger_price: Decimal,
    ) -> Self {
        Self {
            price: Some(trigger_price),
            ..Self::base(symbol, side, OrderType::OcoLeg(leg), quantity)
        }
    }

    /// Set time-in-force.
    pub fn with_tif(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = Some(tif);
        self
    }

    /// Set reduce-only.
    pub fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    /// Set the client order id.
    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    /// Binance `POST /fapi/v1/order` parameters, excluding timestamp and signature.
    ///
    /// OCO legs send their trigger as `stopPrice`; Binance has no `price` for
    /// `STOP_MARKET` / `TAKE_PROFIT_MARKET`.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("symbol".to_string(), self.symbol.clone()),
            ("side".to_string(), self.side.as_str().to_string()),
            ("type".to_string(), self.order_type.wire_type().to_string()),
            ("quantity".to_string(), self.quantity.normalize().to_string()),
        ];

        match self.order_type {
            OrderType::Market => {}
            OrderType::Limit => {
                push_decimal(&mut params, "price", self.price);
                params.push((
                    "timeInForce".to_string(),
                    self.time_in_force.unwrap_or_default().to_string(),
                ));
            }
            OrderType::StopLimit => {
                push_decimal(&mut params, "price", self.price);
                push_decimal(&mut params, "stopPrice", self.stop_price);
                params.push((
                    "timeInForce".to_string(),
                    self.time_in_force.unwrap_or_default().to_string(),
                ));
            }
            OrderType::OcoLeg(_) => {
                push_decimal(&mut params, "stopPrice", self.price);
            }
        }

        if self.reduce_only {
            params.push(("reduceOnly".to_string(), "true".to_string()));
        }
        if let Some(id) = &self.client_order_id {
            params.push(("newClientOrderId".to_string(), id.clone()));
        }
        params
    }
}

fn push_decimal(params: &mut Vec<(String, String)>, key: &str, value: Option<Decimal>) {
    if let Some(v) = value {
        params.push((key.to_string(), v.normalize().to_string()));
    }
}

/// Order status from the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted, resting or awaiting trigger.
    #[strum(serialize = "NEW")]
    New,
    /// Partially filled.
    #[strum(serialize = "PARTIALLY_FILLED")]
    PartiallyFilled,
    /// Fully filled.
    #[strum(serialize = "FILLED")]
    Filled,
    /// Cancelled.
    #[strum(to_string = "CANCELED", serialize = "CANCELLED")]
    Canceled,
    /// Rejected.
    #[strum(serialize = "REJECTED")]
    Rejected,
    /// Expired (IOC/FOK remainder, or expired in match).
    #[strum(to_string = "EXPIRED", serialize = "EXPIRED_IN_MATCH")]
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (won't change).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// Whether the order still rests on the book.
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

/// Normalized exchange order record. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderResult {
    /// Exchange order id.
    pub order_id: String,
    /// Trading pair.
    pub symbol: String,
    /// Current status.
    pub status: OrderStatus,
    /// Executed quantity.
    pub filled_quantity: Decimal,
    /// Average fill price (zero if nothing filled).
    pub avg_price: Decimal,
    /// Raw exchange payload.
    pub raw: serde_json::Value,
}

/// Wire shape of a Binance futures order response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderPayload {
    order_id: serde_json::Value,
    symbol: String,
    status: String,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    avg_price: Option<String>,
}

impl OrderResult {
    /// Parse a Binance order payload.
    pub fn from_payload(raw: serde_json::Value) -> Result<Self, ExchangeError> {
        let payload: OrderPayload = serde_json::from_value(raw.clone())
            .map_err(|e| ExchangeError::MalformedPayload(format!("order: {e}")))?;

        let order_id = match &payload.order_id {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) if !s.is_empty() => s.clone(),
            other => {
                return Err(ExchangeError::MalformedPayload(format!(
                    "order: unusable orderId {other}"
                )))
            }
        };

        let status = payload.status.parse::<OrderStatus>().map_err(|_| {
            ExchangeError::MalformedPayload(format!("order: unknown status {}", payload.status))
        })?;

        Ok(Self {
            order_id,
            symbol: payload.symbol,
            status,
            filled_quantity: parse_decimal(payload.executed_qty.as_deref(), "executedQty")?,
            avg_price: parse_decimal(payload.avg_price.as_deref(), "avgPrice")?,
            raw,
        })
    }
}

/// Parse an optional decimal string field; absent means zero.
pub(crate) fn parse_decimal(value: Option<&str>, field: &str) -> Result<Decimal, ExchangeError> {
    match value {
        None | Some("") => Ok(Decimal::ZERO),
        Some(s) => s
            .parse::<Decimal>()
            .map_err(|e| ExchangeError::MalformedPayload(format!("{field}={s}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn side_parses_case_insensitively() {
        assert_eq!(Side::from_str("BUY").unwrap(), Side::Buy);
        assert_eq!(Side::from_str("sell").unwrap(), Side::Sell);
        assert!(Side::from_str("HOLD").is_err());
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn market_params_have_no_price() {
        let params = OrderRequest::market("BTCUSDT", Side::Buy, dec!(0.010)).to_params();
        assert_eq!(param(&params, "type"), Some("MARKET"));
        assert_eq!(param(&params, "quantity"), Some("0.01"));
        assert_eq!(param(&params, "price"), None);
        assert_eq!(param(&params, "timeInForce"), None);
    }

    #[test]
    fn stop_limit_maps_to_stop_type() {
        let params =
            OrderRequest::stop_limit("BTCUSDT", Side::Sell, dec!(0.01), dec!(50900), dec!(51000))
                .with_reduce_only(true)
                .to_params();
        assert_eq!(param(&params, "type"), Some("STOP"));
        assert_eq!(param(&params, "price"), Some("50900"));
        assert_eq!(param(&params, "stopPrice"), Some("51000"));
        assert_eq!(param(&params, "timeInForce"), Some("GTC"));
        assert_eq!(param(&params, "reduceOnly"), Some("true"));
    }

    #[test]
    fn oco_leg_sends_trigger_as_stop_price() {
        let params =
            OrderRequest::oco_leg("ETHUSDT", Side::Sell, OcoLeg::TakeProfit, dec!(1), dec!(3500))
                .to_params();
        assert_eq!(param(&params, "type"), Some("TAKE_PROFIT_MARKET"));
        assert_eq!(param(&params, "stopPrice"), Some("3500"));
        assert_eq!(param(&params, "price"), None);
    }

    #[test]
    fn limit_uses_requested_tif() {
        let params = OrderRequest::limit("BTCUSDT", Side::Buy, dec!(0.01), dec!(50000))
            .with_tif(TimeInForce::IOC)
            .with_client_order_id("cli-1")
            .to_params();
        assert_eq!(param(&params, "timeInForce"), Some("IOC"));
        assert_eq!(param(&params, "newClientOrderId"), Some("cli-1"));
    }

    #[test]
    fn order_result_parses_binance_payload() {
        let raw = serde_json::json!({
            "orderId": 22542179,
            "symbol": "BTCUSDT",
            "status": "FILLED",
            "executedQty": "0.010",
            "avgPrice": "50123.40",
            "origQty": "0.010",
            "type": "MARKET"
        });
        let result = OrderResult::from_payload(raw).unwrap();
        assert_eq!(result.order_id, "22542179");
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.filled_quantity, dec!(0.010));
        assert_eq!(result.avg_price, dec!(50123.40));
    }

    #[test]
    fn order_result_rejects_unknown_status() {
        let raw = serde_json::json!({"orderId": 1, "symbol": "BTCUSDT", "status": "WEIRD"});
        assert!(matches!(
            OrderResult::from_payload(raw),
            Err(ExchangeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn order_status_terminal() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(OrderStatus::PartiallyFilled.is_open());
        assert_eq!(OrderStatus::from_str("CANCELLED").unwrap(), OrderStatus::Canceled);
    }
}

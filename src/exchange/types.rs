//! Account and position payloads.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;
use crate::trading::order::parse_decimal;

/// USDT-M account balance summary (`GET /fapi/v2/account`).
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct AccountBalance {
    /// Total wallet balance.
    pub total_wallet_balance: Decimal,
    /// Balance available for new orders.
    pub available_balance: Decimal,
    /// Unrealized PnL across positions.
    pub total_unrealized_profit: Decimal,
    /// Wallet balance plus unrealized PnL.
    pub total_margin_balance: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountPayload {
    total_wallet_balance: Option<String>,
    available_balance: Option<String>,
    total_unrealized_profit: Option<String>,
    total_margin_balance: Option<String>,
}

impl AccountBalance {
    /// Parse the account payload.
    pub fn from_payload(raw: &serde_json::Value) -> Result<Self, ExchangeError> {
        let p: AccountPayload = serde_json::from_value(raw.clone())
            .map_err(|e| ExchangeError::MalformedPayload(format!("account: {e}")))?;
        Ok(Self {
            total_wallet_balance: parse_decimal(p.total_wallet_balance.as_deref(), "totalWalletBalance")?,
            available_balance: parse_decimal(p.available_balance.as_deref(), "availableBalance")?,
            total_unrealized_profit: parse_decimal(
                p.total_unrealized_profit.as_deref(),
                "totalUnrealizedProfit",
            )?,
            total_margin_balance: parse_decimal(p.total_margin_balance.as_deref(), "totalMarginBalance")?,
        })
    }
}

/// Open position on one symbol (`GET /fapi/v2/positionRisk`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    /// Trading pair.
    pub symbol: String,
    /// Signed position size; negative is short.
    pub position_amount: Decimal,
    /// Average entry price.
    pub entry_price: Decimal,
    /// Unrealized PnL.
    pub unrealized_profit: Decimal,
    /// Leverage setting.
    pub leverage: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionPayload {
    symbol: String,
    position_amt: Option<String>,
    entry_price: Option<String>,
    #[serde(rename = "unRealizedProfit")]
    unrealized_profit: Option<String>,
    leverage: Option<String>,
}

impl Position {
    /// Pick the first non-flat position for `symbol` from a positionRisk array.
    pub fn from_payload(raw: &serde_json::Value, symbol: &str) -> Result<Option<Self>, ExchangeError> {
        let entries: Vec<PositionPayload> = serde_json::from_value(raw.clone())
            .map_err(|e| ExchangeError::MalformedPayload(format!("positionRisk: {e}")))?;

        for entry in entries.into_iter().filter(|e| e.symbol == symbol) {
            let position_amount = parse_decimal(entry.position_amt.as_deref(), "positionAmt")?;
            if position_amount.is_zero() {
                continue;
            }
            let leverage = match entry.leverage.as_deref() {
                None | Some("") => 0,
                Some(l) => l.parse::<u32>().map_err(|e| {
                    ExchangeError::MalformedPayload(format!("leverage={l}: {e}"))
                })?,
            };
            return Ok(Some(Self {
                symbol: entry.symbol,
                position_amount,
                entry_price: parse_decimal(entry.entry_price.as_deref(), "entryPrice")?,
                unrealized_profit: parse_decimal(entry.unrealized_profit.as_deref(), "unRealizedProfit")?,
                leverage,
            }));
        }
        Ok(None)
    }
}

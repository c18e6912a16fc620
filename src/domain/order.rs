//! Order intents, requests and the append-only execution record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

use super::account::AccountKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Accepts `BUY`/`SELL` in any case.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trade proposed by strategy evaluation for the final bar of a window.
/// `price == None` means "fill at the current market price".
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub side: Side,
    pub quantity: i64,
    pub price: Option<Decimal>,
}

impl OrderIntent {
    pub fn market(side: Side, quantity: i64) -> Self {
        OrderIntent {
            side,
            quantity,
            price: None,
        }
    }

    pub fn resolve_price(&self, market_price: Decimal) -> Decimal {
        self.price.unwrap_or(market_price)
    }
}

/// A fully priced market order against one account.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub key: AccountKey,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Filled,
    Rejected,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Filled => "FILLED",
            ExecutionStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FILLED" => Some(ExecutionStatus::Filled),
            "REJECTED" => Some(ExecutionStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an order was refused. Rejections leave the account untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    InsufficientFunds { required: Decimal, available: Decimal },
    InsufficientPosition { symbol: String, held: i64, requested: i64 },
    InvalidQuantity(i64),
    InvalidPrice(Decimal),
    /// Order value or resulting holding does not fit the numeric range.
    ValueOutOfRange,
    AccountStopped,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InsufficientFunds {
                required,
                available,
            } => write!(
                f,
                "insufficient funds: required {required}, available {available}"
            ),
            RejectReason::InsufficientPosition {
                symbol,
                held,
                requested,
            } => write!(
                f,
                "insufficient position: {symbol} held {held}, requested {requested}"
            ),
            RejectReason::InvalidQuantity(q) => write!(f, "invalid quantity: {q}"),
            RejectReason::InvalidPrice(p) => write!(f, "invalid price: {p}"),
            RejectReason::ValueOutOfRange => f.write_str("order value out of range"),
            RejectReason::AccountStopped => f.write_str("account stopped"),
        }
    }
}

/// Immutable audit entry for one execution attempt. `id` is assigned by the
/// ledger on append; `reason` is set iff the status is REJECTED.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRecord {
    pub id: Option<i64>,
    pub account_ref: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity: i64,
    pub price: Decimal,
    pub commission: Decimal,
    pub status: ExecutionStatus,
    pub reason: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn filled(account_ref: i64, order: &OrderRequest, commission: Decimal) -> Self {
        ExecutionRecord {
            id: None,
            account_ref,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price: order.price,
            commission,
            status: ExecutionStatus::Filled,
            reason: None,
            executed_at: Utc::now(),
        }
    }

    pub fn rejected(account_ref: i64, order: &OrderRequest, reason: &RejectReason) -> Self {
        ExecutionRecord {
            id: None,
            account_ref,
            symbol: order.symbol.clone(),
            side: order.side,
            quantity: order.quantity,
            price: order.price,
            commission: Decimal::ZERO,
            status: ExecutionStatus::Rejected,
            reason: Some(reason.to_string()),
            executed_at: Utc::now(),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.status == ExecutionStatus::Filled
    }

    /// Signed cash movement of a fill: negative for buys, positive for sells.
    pub fn cash_delta(&self) -> Decimal {
        if !self.is_filled() {
            return Decimal::ZERO;
        }
        let gross = Decimal::from(self.quantity) * self.price;
        match self.side {
            Side::Buy => -(gross + self.commission),
            Side::Sell => gross - self.commission,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(side: Side) -> OrderRequest {
        OrderRequest {
            key: AccountKey::new("alice", "DualMovingAverage"),
            symbol: "600519".into(),
            side,
            quantity: 100,
            price: dec!(10),
        }
    }

    #[test]
    fn side_parse_is_case_insensitive() {
        assert_eq!(Side::parse("buy"), Some(Side::Buy));
        assert_eq!(Side::parse(" SELL "), Some(Side::Sell));
        assert_eq!(Side::parse("short"), None);
    }

    #[test]
    fn intent_price_falls_back_to_market() {
        let intent = OrderIntent::market(Side::Buy, 100);
        assert_eq!(intent.resolve_price(dec!(12.34)), dec!(12.34));

        let limit = OrderIntent {
            price: Some(dec!(11)),
            ..intent
        };
        assert_eq!(limit.resolve_price(dec!(12.34)), dec!(11));
    }

    #[test]
    fn rejected_record_carries_reason_and_no_commission() {
        let reason = RejectReason::InsufficientPosition {
            symbol: "600519".into(),
            held: 0,
            requested: 100,
        };
        let record = ExecutionRecord::rejected(7, &order(Side::Sell), &reason);
        assert_eq!(record.status, ExecutionStatus::Rejected);
        assert_eq!(record.commission, Decimal::ZERO);
        assert!(
            record
                .reason
                .as_deref()
                .unwrap()
                .starts_with("insufficient position")
        );
        assert_eq!(record.cash_delta(), Decimal::ZERO);
    }

    #[test]
    fn filled_record_cash_delta_is_signed() {
        let buy = ExecutionRecord::filled(7, &order(Side::Buy), dec!(0.3));
        assert!(buy.reason.is_none());
        assert_eq!(buy.cash_delta(), dec!(-1000.3));

        let sell = ExecutionRecord::filled(7, &order(Side::Sell), dec!(0.3));
        assert_eq!(sell.cash_delta(), dec!(999.7));
    }

    #[test]
    fn reject_reason_messages() {
        let funds = RejectReason::InsufficientFunds {
            required: dec!(1000.3),
            available: dec!(500),
        };
        assert_eq!(
            funds.to_string(),
            "insufficient funds: required 1000.3, available 500"
        );
        assert_eq!(RejectReason::AccountStopped.to_string(), "account stopped");
    }
}

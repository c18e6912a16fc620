//! Paper brokerage accounts, one per (user, strategy) pair.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::error::PaperError;
use super::position::Position;

/// Unique key of an account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountKey {
    pub user_id: String,
    pub strategy_id: String,
}

impl AccountKey {
    pub fn new(user_id: &str, strategy_id: &str) -> Self {
        AccountKey {
            user_id: user_id.to_string(),
            strategy_id: strategy_id.to_string(),
        }
    }

    pub fn not_found(&self) -> PaperError {
        PaperError::AccountNotFound {
            user_id: self.user_id.clone(),
            strategy_id: self.strategy_id.clone(),
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.strategy_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Stopped,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Stopped => "stopped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(AccountStatus::Active),
            "stopped" => Some(AccountStatus::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to open an account. `symbol` is the instrument the strategy trades.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub key: AccountKey,
    pub symbol: String,
    pub initial_capital: Decimal,
}

impl NewAccount {
    pub fn validate(&self) -> Result<(), PaperError> {
        if self.key.user_id.trim().is_empty() {
            return Err(PaperError::InvalidRequest {
                reason: "user_id is required".into(),
            });
        }
        if self.key.strategy_id.trim().is_empty() {
            return Err(PaperError::InvalidRequest {
                reason: "strategy_id is required".into(),
            });
        }
        if self.symbol.trim().is_empty() {
            return Err(PaperError::InvalidRequest {
                reason: "symbol is required".into(),
            });
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(PaperError::InvalidRequest {
                reason: "initial_capital must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Persisted account state. `version` increases by one on every successful
/// compare-and-swap and is the only concurrency guard.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub key: AccountKey,
    pub symbol: String,
    pub status: AccountStatus,
    pub initial_capital: Decimal,
    pub cash: Decimal,
    pub positions: BTreeMap<String, Position>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run_date: Option<NaiveDate>,
    pub version: i64,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn held_quantity(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).map_or(0, |p| p.quantity)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Cash plus positions valued at `prices`; positions without a price are
    /// valued at cost.
    pub fn total_assets(&self, prices: &HashMap<String, Decimal>) -> Decimal {
        let position_value: Decimal = self
            .positions
            .values()
            .map(|pos| match prices.get(&pos.symbol) {
                Some(&price) => pos.market_value(price),
                None => pos.cost_value(),
            })
            .sum();
        self.cash + position_value
    }

    pub fn already_ran_on(&self, date: NaiveDate) -> bool {
        self.last_run_date == Some(date)
    }
}

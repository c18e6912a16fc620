//! Virtual broker: account lifecycle and order execution over a ledger.
//!
//! Every write is a load / apply / compare-and-swap cycle. A lost race
//! reloads and re-validates against the fresh state, up to
//! `BrokerConfig::max_attempts` times.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::account::{Account, AccountKey, AccountStatus, NewAccount};
use super::error::PaperError;
use super::execution::{apply_order, default_commission_rate};
use super::order::{ExecutionRecord, OrderRequest};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub commission_rate: Decimal,
    pub max_attempts: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            commission_rate: default_commission_rate(),
            max_attempts: 3,
        }
    }
}

impl BrokerConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PaperError> {
        let commission_rate =
            config.get_decimal("broker", "commission_rate", default_commission_rate())?;
        if commission_rate < Decimal::ZERO || commission_rate >= Decimal::ONE {
            return Err(PaperError::ConfigInvalid {
                section: "broker".into(),
                key: "commission_rate".into(),
                reason: "commission_rate must be in [0, 1)".into(),
            });
        }

        let max_attempts = config.get_int("broker", "max_attempts", 3);
        if !(1..=100).contains(&max_attempts) {
            return Err(PaperError::ConfigInvalid {
                section: "broker".into(),
                key: "max_attempts".into(),
                reason: "max_attempts must be between 1 and 100".into(),
            });
        }

        Ok(BrokerConfig {
            commission_rate,
            max_attempts: max_attempts as u32,
        })
    }
}

pub struct VirtualBroker {
    ledger: Arc<dyn LedgerPort>,
    config: BrokerConfig,
}

impl VirtualBroker {
    pub fn new(ledger: Arc<dyn LedgerPort>, config: BrokerConfig) -> Self {
        VirtualBroker { ledger, config }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerPort> {
        &self.ledger
    }

    pub fn get_account(&self, key: &AccountKey) -> Result<Option<Account>, PaperError> {
        self.ledger.get(key)
    }

    pub fn require_account(&self, key: &AccountKey) -> Result<Account, PaperError> {
        self.ledger.get(key)?.ok_or_else(|| key.not_found())
    }

    /// Idempotent: a second request for the same key returns the existing
    /// account unchanged, whatever capital or symbol it asks for.
    pub fn create_account(&self, request: &NewAccount) -> Result<Account, PaperError> {
        if let Some(existing) = self.ledger.get(&request.key)? {
            debug!(account = existing.id, key = %existing.key, "paper account already exists");
            return Ok(existing);
        }
        request.validate()?;
        let account = self.ledger.create_if_absent(request)?;
        info!(
            account = account.id,
            key = %account.key,
            symbol = %account.symbol,
            capital = %account.initial_capital,
            "paper account ready"
        );
        Ok(account)
    }

    /// Execute a market order. Business rejections come back as a REJECTED
    /// record, never as an error.
    pub fn execute(&self, order: &OrderRequest) -> Result<ExecutionRecord, PaperError> {
        let mut account_id = 0;
        for attempt in 1..=self.config.max_attempts {
            let account = self.require_account(&order.key)?;
            account_id = account.id;

            let fill = match apply_order(&account, order, self.config.commission_rate) {
                Ok(fill) => fill,
                Err(reason) => {
                    warn!(
                        account = account.id,
                        symbol = %order.symbol,
                        side = %order.side,
                        quantity = order.quantity,
                        %reason,
                        "order rejected"
                    );
                    let record = ExecutionRecord::rejected(account.id, order, &reason);
                    return self.ledger.append_execution(&record);
                }
            };

            let record = ExecutionRecord::filled(account.id, order, fill.commission);
            match self
                .ledger
                .commit_fill(account.version, &fill.account, &record)
            {
                Ok((stored, record)) => {
                    info!(
                        account = stored.id,
                        symbol = %record.symbol,
                        side = %record.side,
                        quantity = record.quantity,
                        price = %record.price,
                        commission = %record.commission,
                        cash = %stored.cash,
                        "order filled"
                    );
                    return Ok(record);
                }
                Err(PaperError::VersionConflict { .. }) => {
                    debug!(account = account.id, attempt, "version conflict, reloading");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            account = account_id,
            attempts = self.config.max_attempts,
            "giving up on contended account"
        );
        Err(PaperError::TransientFailure {
            account_id,
            attempts: self.config.max_attempts,
        })
    }

    pub fn stop_account(&self, key: &AccountKey) -> Result<Account, PaperError> {
        self.update_with_retry(key, |account| {
            if account.status == AccountStatus::Stopped {
                return None;
            }
            let mut next = account.clone();
            next.status = AccountStatus::Stopped;
            next.updated_at = chrono::Utc::now();
            Some(next)
        })
        .map(|(account, _)| account)
    }

    /// Stamp `date` as the account's last scheduled run. Returns `false` when
    /// the account was already stamped for that date (by this or another
    /// scheduler instance).
    pub fn claim_run_date(&self, key: &AccountKey, date: NaiveDate) -> Result<bool, PaperError> {
        self.update_with_retry(key, |account| {
            if account.already_ran_on(date) {
                return None;
            }
            let mut next = account.clone();
            next.last_run_date = Some(date);
            Some(next)
        })
        .map(|(_, changed)| changed)
    }

    pub fn history(&self, key: &AccountKey) -> Result<Vec<ExecutionRecord>, PaperError> {
        let account = self.require_account(key)?;
        self.ledger.executions(account.id)
    }

    /// CAS loop for non-trading updates. `change` returns `None` when there
    /// is nothing to write.
    fn update_with_retry<F>(&self, key: &AccountKey, change: F) -> Result<(Account, bool), PaperError>
    where
        F: Fn(&Account) -> Option<Account>,
    {
        let mut account_id = 0;
        for _ in 0..self.config.max_attempts {
            let account = self.require_account(key)?;
            account_id = account.id;
            let Some(next) = change(&account) else {
                return Ok((account, false));
            };
            match self.ledger.compare_and_swap(account.version, &next) {
                Ok(stored) => return Ok((stored, true)),
                Err(PaperError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(PaperError::TransientFailure {
            account_id,
            attempts: self.config.max_attempts,
        })
    }
}

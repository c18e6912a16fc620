//! Outcomes of one scheduled run.
//!
//! Each active account moves Idle -> Evaluated -> one terminal outcome per
//! day. Nothing here is persisted except the account's last run date.

use chrono::NaiveDate;
use std::fmt;

use super::account::AccountKey;
use super::error::PaperError;
use super::order::{ExecutionRecord, ExecutionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSignal,
    NoData,
    AlreadyRan,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NoSignal => "no signal on final bar",
            SkipReason::NoData => "no market data",
            SkipReason::AlreadyRan => "already ran today",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccountDayOutcome {
    Executed(ExecutionRecord),
    Rejected(ExecutionRecord),
    Skipped(SkipReason),
    Errored(PaperError),
}

impl AccountDayOutcome {
    pub fn from_record(record: ExecutionRecord) -> Self {
        match record.status {
            ExecutionStatus::Filled => AccountDayOutcome::Executed(record),
            ExecutionStatus::Rejected => AccountDayOutcome::Rejected(record),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccountDayOutcome::Executed(_) => "executed",
            AccountDayOutcome::Rejected(_) => "rejected",
            AccountDayOutcome::Skipped(_) => "skipped",
            AccountDayOutcome::Errored(_) => "errored",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, AccountDayOutcome::Errored(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountDayReport {
    pub account_id: i64,
    pub key: AccountKey,
    pub outcome: AccountDayOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub reports: Vec<AccountDayReport>,
}

impl RunSummary {
    pub fn new(date: NaiveDate) -> Self {
        RunSummary {
            date,
            reports: Vec::new(),
        }
    }

    pub fn outcome_for(&self, key: &AccountKey) -> Option<&AccountDayOutcome> {
        self.reports
            .iter()
            .find(|r| &r.key == key)
            .map(|r| &r.outcome)
    }

    fn count(&self, label: &str) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.label() == label)
            .count()
    }

    pub fn executed(&self) -> usize {
        self.count("executed")
    }

    pub fn rejected(&self) -> usize {
        self.count("rejected")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn errored(&self) -> usize {
        self.count("errored")
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} accounts, {} executed, {} rejected, {} skipped, {} errored",
            self.date,
            self.reports.len(),
            self.executed(),
            self.rejected(),
            self.skipped(),
            self.errored()
        )
    }
}

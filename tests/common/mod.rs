#![allow(dead_code)]

use chrono::NaiveDate;
use papertrader::adapters::sqlite_ledger::SqliteLedger;
use papertrader::domain::account::{Account, AccountKey, NewAccount};
use papertrader::domain::broker::{BrokerConfig, VirtualBroker};
use papertrader::domain::error::PaperError;
pub use papertrader::domain::ohlcv::Bar;
use papertrader::domain::order::{ExecutionRecord, OrderIntent};
use papertrader::domain::strategy::StrategyParams;
use papertrader::ports::ledger_port::LedgerPort;
use papertrader::ports::market_data_port::MarketDataPort;
use papertrader::ports::strategy_port::StrategyEvaluationPort;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

pub const STRATEGY: &str = "DualMovingAverage";
pub const SYMBOL: &str = "600519";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date: NaiveDate, close: Decimal) -> Bar {
    Bar {
        date,
        open: close,
        high: close + Decimal::ONE,
        low: close - Decimal::ONE,
        close,
        volume: 1000,
    }
}

/// One bar per day starting at `start`.
pub fn bars_from_closes(start: NaiveDate, closes: &[Decimal]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(start + chrono::Duration::days(i as i64), close))
        .collect()
}

pub fn memory_ledger() -> Arc<SqliteLedger> {
    let ledger = SqliteLedger::in_memory().unwrap();
    ledger.initialize_schema().unwrap();
    Arc::new(ledger)
}

pub fn broker_over(ledger: Arc<dyn LedgerPort>) -> Arc<VirtualBroker> {
    Arc::new(VirtualBroker::new(ledger, BrokerConfig::default()))
}

pub fn open_account(broker: &VirtualBroker, user: &str, capital: Decimal) -> Account {
    broker
        .create_account(&NewAccount {
            key: AccountKey::new(user, STRATEGY),
            symbol: SYMBOL.into(),
            initial_capital: capital,
        })
        .unwrap()
}

// ---------------------------------------------------------------------------
// Market data

#[derive(Default)]
pub struct MockMarketData {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
    pub delays: HashMap<String, Duration>,
    pub calls: AtomicUsize,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MarketDataPort for MockMarketData {
    fn last_bars(&self, symbol: &str, count: usize) -> Result<Vec<Bar>, PaperError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(symbol) {
            std::thread::sleep(*delay);
        }
        if let Some(reason) = self.errors.get(symbol) {
            return Err(PaperError::UpstreamUnavailable {
                port: "market data".into(),
                reason: reason.clone(),
            });
        }
        let bars = self.data.get(symbol).cloned().unwrap_or_default();
        let skip = bars.len().saturating_sub(count);
        Ok(bars[skip..].to_vec())
    }
}

// ---------------------------------------------------------------------------
// Strategy evaluation

/// Returns a fixed intent per symbol and records every call.
#[derive(Default)]
pub struct MockEvaluator {
    pub intents: HashMap<String, OrderIntent>,
    pub errors: HashMap<String, String>,
    pub delays: HashMap<String, Duration>,
    pub calls: Mutex<Vec<(String, usize)>>,
}

impl MockEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intent(mut self, symbol: &str, intent: OrderIntent) -> Self {
        self.intents.insert(symbol.to_string(), intent);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }

    /// (symbol, window length) of each call, in call order.
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

impl StrategyEvaluationPort for MockEvaluator {
    fn evaluate(
        &self,
        symbol: &str,
        bars: &[Bar],
        _strategy_id: &str,
        _params: &StrategyParams,
    ) -> Result<Option<OrderIntent>, PaperError> {
        self.calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), bars.len()));
        if let Some(delay) = self.delays.get(symbol) {
            std::thread::sleep(*delay);
        }
        if let Some(reason) = self.errors.get(symbol) {
            return Err(PaperError::UpstreamUnavailable {
                port: "strategy evaluation".into(),
                reason: reason.clone(),
            });
        }
        Ok(self.intents.get(symbol).cloned())
    }
}

// ---------------------------------------------------------------------------
// Ledger wrappers

/// Lets a competing writer bump the account's version just before each of
/// the next `conflicts` swaps, so those swaps lose the race.
pub struct ConflictingLedger {
    inner: Arc<dyn LedgerPort>,
    remaining: AtomicU32,
    pub swaps_attempted: AtomicU32,
}

impl ConflictingLedger {
    pub fn new(inner: Arc<dyn LedgerPort>, conflicts: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(conflicts),
            swaps_attempted: AtomicU32::new(0),
        }
    }

    pub fn always(inner: Arc<dyn LedgerPort>) -> Self {
        Self::new(inner, u32::MAX)
    }

    fn interfere(&self, state: &Account) -> Result<(), PaperError> {
        self.swaps_attempted.fetch_add(1, Ordering::SeqCst);
        let take = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if take.is_ok() {
            let current = self.inner.get(&state.key)?.ok_or_else(|| state.key.not_found())?;
            self.inner.compare_and_swap(current.version, &current)?;
        }
        Ok(())
    }
}

impl LedgerPort for ConflictingLedger {
    fn get(&self, key: &AccountKey) -> Result<Option<Account>, PaperError> {
        self.inner.get(key)
    }

    fn create_if_absent(&self, request: &NewAccount) -> Result<Account, PaperError> {
        self.inner.create_if_absent(request)
    }

    fn compare_and_swap(&self, expected_version: i64, new_state: &Account) -> Result<Account, PaperError> {
        self.interfere(new_state)?;
        self.inner.compare_and_swap(expected_version, new_state)
    }

    fn list_active(&self) -> Result<Vec<Account>, PaperError> {
        self.inner.list_active()
    }

    fn append_execution(&self, record: &ExecutionRecord) -> Result<ExecutionRecord, PaperError> {
        self.inner.append_execution(record)
    }

    fn executions(&self, account_ref: i64) -> Result<Vec<ExecutionRecord>, PaperError> {
        self.inner.executions(account_ref)
    }

    fn commit_fill(
        &self,
        expected_version: i64,
        new_state: &Account,
        record: &ExecutionRecord,
    ) -> Result<(Account, ExecutionRecord), PaperError> {
        self.interfere(new_state)?;
        self.inner.commit_fill(expected_version, new_state, record)
    }
}

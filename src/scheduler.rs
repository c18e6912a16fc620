//! Daily signal scheduler.
//!
//! Once per trading day: enumerate active accounts, re-evaluate each
//! account's strategy over its trailing window and hand any intent on the
//! final bar to the broker. Accounts are processed independently on a
//! bounded worker pool; one account's failure never aborts the run.

use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, error, info, warn};

use crate::domain::account::{Account, AccountKey};
use crate::domain::broker::VirtualBroker;
use crate::domain::error::PaperError;
use crate::domain::order::OrderRequest;
use crate::domain::run::{AccountDayOutcome, AccountDayReport, RunSummary, SkipReason};
use crate::domain::schedule::SchedulerConfig;
use crate::domain::strategy::StrategyCatalog;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::strategy_port::StrategyEvaluationPort;

const MARKET_DATA: &str = "market data";
const STRATEGY_EVALUATION: &str = "strategy evaluation";

pub struct SignalScheduler {
    broker: Arc<VirtualBroker>,
    market_data: Arc<dyn MarketDataPort>,
    evaluator: Arc<dyn StrategyEvaluationPort>,
    catalog: Arc<StrategyCatalog>,
    config: SchedulerConfig,
}

impl SignalScheduler {
    pub fn new(
        broker: Arc<VirtualBroker>,
        market_data: Arc<dyn MarketDataPort>,
        evaluator: Arc<dyn StrategyEvaluationPort>,
        catalog: Arc<StrategyCatalog>,
        config: SchedulerConfig,
    ) -> Self {
        SignalScheduler {
            broker,
            market_data,
            evaluator,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Sleep until each trigger and run; returns when `shutdown` resolves.
    /// A run interrupted by shutdown is abandoned: every account it already
    /// touched was committed through the ledger, and the rest are picked up
    /// by the next trigger.
    pub async fn run_until<F>(self: Arc<Self>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let now = Utc::now();
            let next = self.config.next_trigger(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next = %next, "next scheduled run");

            tokio::select! {
                _ = &mut shutdown => {
                    info!("scheduler stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let date = self.config.trading_date(next);
            tokio::select! {
                _ = &mut shutdown => {
                    warn!(%date, "scheduler stopped during a run");
                    return;
                }
                result = self.run_once(date) => match result {
                    Ok(summary) => info!(%summary, "scheduled run complete"),
                    Err(e) => error!(%date, error = %e, "scheduled run could not start"),
                },
            }
        }
    }

    /// One pass over every active account for `date`. Only failing to list
    /// the accounts is an error; per-account failures land in the summary.
    pub async fn run_once(self: &Arc<Self>, date: NaiveDate) -> Result<RunSummary, PaperError> {
        let broker = Arc::clone(&self.broker);
        let accounts = blocking(move || broker.ledger().list_active()).await?;
        info!(%date, accounts = accounts.len(), "starting daily strategy check");

        let permits = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks = JoinSet::new();
        let mut owners = HashMap::new();
        for account in accounts {
            let this = Arc::clone(self);
            let permits = Arc::clone(&permits);
            let owner = (account.id, account.key.clone());
            let handle = tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                this.process_account(account, date).await
            });
            owners.insert(handle.id(), owner);
        }

        let summary = collect_reports(tasks, owners, date).await;
        info!(%summary, "daily strategy check finished");
        Ok(summary)
    }

    async fn process_account(&self, account: Account, date: NaiveDate) -> AccountDayReport {
        let outcome = match self.evaluate_and_execute(&account, date).await {
            Ok(outcome) => outcome,
            Err(e) => AccountDayOutcome::Errored(e),
        };

        match &outcome {
            AccountDayOutcome::Errored(e) => error!(
                account = account.id,
                user = %account.key.user_id,
                strategy = %account.key.strategy_id,
                %date,
                error = %e,
                transient = e.is_transient(),
                "account-day failed"
            ),
            AccountDayOutcome::Skipped(reason) => debug!(
                account = account.id,
                %date,
                %reason,
                "account-day skipped"
            ),
            AccountDayOutcome::Executed(record) | AccountDayOutcome::Rejected(record) => info!(
                account = account.id,
                %date,
                status = %record.status,
                side = %record.side,
                quantity = record.quantity,
                price = %record.price,
                "account-day traded"
            ),
        }

        AccountDayReport {
            account_id: account.id,
            key: account.key,
            outcome,
        }
    }

    async fn evaluate_and_execute(
        &self,
        account: &Account,
        date: NaiveDate,
    ) -> Result<AccountDayOutcome, PaperError> {
        if account.already_ran_on(date) {
            return Ok(AccountDayOutcome::Skipped(SkipReason::AlreadyRan));
        }
        let broker = Arc::clone(&self.broker);
        let key = account.key.clone();
        if !blocking(move || broker.claim_run_date(&key, date)).await? {
            return Ok(AccountDayOutcome::Skipped(SkipReason::AlreadyRan));
        }

        if account.symbol.trim().is_empty() {
            return Err(PaperError::MissingSymbol {
                account_id: account.id,
            });
        }
        let params = self.catalog.resolve(&account.key.strategy_id)?.clone();

        let market_data = Arc::clone(&self.market_data);
        let symbol = account.symbol.clone();
        let lookback = self.config.lookback_bars;
        let bars = self
            .call_port(MARKET_DATA, move || market_data.last_bars(&symbol, lookback))
            .await?;
        let Some(last_close) = bars.last().map(|b| b.close) else {
            return Ok(AccountDayOutcome::Skipped(SkipReason::NoData));
        };

        let evaluator = Arc::clone(&self.evaluator);
        let symbol = account.symbol.clone();
        let strategy_id = account.key.strategy_id.clone();
        let intent = self
            .call_port(STRATEGY_EVALUATION, move || {
                evaluator.evaluate(&symbol, &bars, &strategy_id, &params)
            })
            .await?;
        let Some(intent) = intent else {
            return Ok(AccountDayOutcome::Skipped(SkipReason::NoSignal));
        };

        let order = OrderRequest {
            key: account.key.clone(),
            symbol: account.symbol.clone(),
            side: intent.side,
            quantity: intent.quantity,
            price: intent.resolve_price(last_close),
        };
        let broker = Arc::clone(&self.broker);
        let record = blocking(move || broker.execute(&order)).await?;
        Ok(AccountDayOutcome::from_record(record))
    }

    /// Run a blocking external-port call under the configured deadline.
    async fn call_port<T, F>(&self, port: &str, call: F) -> Result<T, PaperError>
    where
        F: FnOnce() -> Result<T, PaperError> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = self.config.port_timeout;
        match tokio::time::timeout(deadline, tokio::task::spawn_blocking(call)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PaperError::UpstreamUnavailable {
                port: port.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(PaperError::UpstreamTimeout {
                port: port.to_string(),
                millis: deadline.as_millis() as u64,
            }),
        }
    }
}

/// Drain the account tasks into a summary. A task that panicked or was
/// cancelled still yields an `Errored` report for the account it owned.
async fn collect_reports(
    mut tasks: JoinSet<AccountDayReport>,
    mut owners: HashMap<task::Id, (i64, AccountKey)>,
    date: NaiveDate,
) -> RunSummary {
    let mut summary = RunSummary::new(date);
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((id, report)) => {
                owners.remove(&id);
                summary.reports.push(report);
            }
            Err(e) => {
                let Some((account_id, key)) = owners.remove(&e.id()) else {
                    error!(%date, error = %e, "untracked account task failed");
                    continue;
                };
                let err = PaperError::AccountTaskFailed {
                    account_id,
                    reason: e.to_string(),
                };
                error!(
                    account = account_id,
                    user = %key.user_id,
                    strategy = %key.strategy_id,
                    %date,
                    error = %err,
                    transient = false,
                    "account-day failed"
                );
                summary.reports.push(AccountDayReport {
                    account_id,
                    key,
                    outcome: AccountDayOutcome::Errored(err),
                });
            }
        }
    }
    summary.reports.sort_by_key(|r| r.account_id);
    summary
}

/// Ledger work is synchronous; keep it off the async workers.
async fn blocking<T, F>(call: F) -> Result<T, PaperError>
where
    F: FnOnce() -> Result<T, PaperError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| PaperError::Io {
            reason: format!("blocking task failed: {e}"),
        })?
}

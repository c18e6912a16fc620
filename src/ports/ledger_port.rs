//! Account ledger port trait.
//!
//! Every account mutation goes through `compare_and_swap` (or `commit_fill`,
//! which is the same swap plus an execution append). There is no
//! unconditional save.

use crate::domain::account::{Account, AccountKey, NewAccount};
use crate::domain::error::PaperError;
use crate::domain::order::ExecutionRecord;

pub trait LedgerPort: Send + Sync {
    fn get(&self, key: &AccountKey) -> Result<Option<Account>, PaperError>;

    /// Insert a new account with `cash = initial_capital` and `version = 0`,
    /// or return the existing account for the key untouched.
    fn create_if_absent(&self, request: &NewAccount) -> Result<Account, PaperError>;

    /// Replace the persisted state of `new_state.id` if its version still
    /// equals `expected_version`. Returns the stored state (version bumped).
    /// Fails with `PaperError::VersionConflict` otherwise.
    fn compare_and_swap(
        &self,
        expected_version: i64,
        new_state: &Account,
    ) -> Result<Account, PaperError>;

    fn list_active(&self) -> Result<Vec<Account>, PaperError>;

    /// Append an execution record; returns it with its assigned id.
    fn append_execution(&self, record: &ExecutionRecord) -> Result<ExecutionRecord, PaperError>;

    /// Execution records of one account, oldest first.
    fn executions(&self, account_ref: i64) -> Result<Vec<ExecutionRecord>, PaperError>;

    /// Swap the account and append its FILLED record. Stores with
    /// transactions should override this to make the pair atomic.
    fn commit_fill(
        &self,
        expected_version: i64,
        new_state: &Account,
        record: &ExecutionRecord,
    ) -> Result<(Account, ExecutionRecord), PaperError> {
        let stored = self.compare_and_swap(expected_version, new_state)?;
        let record = self.append_execution(record)?;
        Ok((stored, record))
    }
}

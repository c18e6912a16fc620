//! SQLite account ledger.
//!
//! Money columns are stored as decimal TEXT so values survive the round
//! trip exactly. Every account write is a version-guarded UPDATE inside an
//! IMMEDIATE transaction; `commit_fill` adds the execution insert to the
//! same transaction.

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::account::{Account, AccountKey, AccountStatus, NewAccount};
use crate::domain::error::PaperError;
use crate::domain::order::{ExecutionRecord, ExecutionStatus, Side};
use crate::domain::position::Position;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerPort;

const ACCOUNT_COLUMNS: &str = "id, user_id, strategy_id, symbol, status, initial_capital, cash, \
     created_at, updated_at, last_run_date, version";

const EXECUTION_COLUMNS: &str =
    "id, account_id, symbol, side, quantity, price, commission, status, reason, executed_at";

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteLedger {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteLedger {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PaperError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| PaperError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;
        let busy_timeout = Duration::from_millis(config.get_int("sqlite", "busy_timeout_ms", 5000).max(0) as u64);

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(move |conn| conn.busy_timeout(busy_timeout));
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| PaperError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory ledger; each connection of a memory
    /// manager would otherwise see its own empty database.
    pub fn in_memory() -> Result<Self, PaperError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| PaperError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), PaperError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                strategy_id TEXT NOT NULL,
                symbol TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'active',
                initial_capital TEXT NOT NULL,
                cash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_run_date TEXT,
                version INTEGER NOT NULL DEFAULT 0,
                UNIQUE (user_id, strategy_id)
            );
            CREATE TABLE IF NOT EXISTS positions (
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                symbol TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity > 0),
                cost_price TEXT NOT NULL,
                PRIMARY KEY (account_id, symbol)
            );
            CREATE TABLE IF NOT EXISTS executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL REFERENCES accounts(id),
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price TEXT NOT NULL,
                commission TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT,
                executed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_executions_account ON executions(account_id);",
        )
        .map_err(|e: rusqlite::Error| PaperError::DatabaseQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PaperError> {
        self.pool.get().map_err(|e: r2d2::Error| PaperError::Database {
            reason: e.to_string(),
        })
    }
}

fn corrupt(column: &str, raw: &str, err: impl std::fmt::Display) -> PaperError {
    PaperError::DatabaseQuery {
        reason: format!("bad {column} value {raw:?}: {err}"),
    }
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, PaperError> {
    Decimal::from_str(raw).map_err(|e| corrupt(column, raw, e))
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, PaperError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(column, raw, e))
}

/// Raw column values of an `accounts` row, converted after the statement
/// finishes so conversion errors surface as `PaperError`.
struct AccountRow {
    id: i64,
    user_id: String,
    strategy_id: String,
    symbol: String,
    status: String,
    initial_capital: String,
    cash: String,
    created_at: String,
    updated_at: String,
    last_run_date: Option<String>,
    version: i64,
}

impl AccountRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(AccountRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            strategy_id: row.get(2)?,
            symbol: row.get(3)?,
            status: row.get(4)?,
            initial_capital: row.get(5)?,
            cash: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            last_run_date: row.get(9)?,
            version: row.get(10)?,
        })
    }

    fn into_account(self, positions: BTreeMap<String, Position>) -> Result<Account, PaperError> {
        let status =
            AccountStatus::parse(&self.status).ok_or_else(|| corrupt("status", &self.status, "unknown status"))?;
        let last_run_date = match self.last_run_date {
            Some(raw) => Some(
                NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| corrupt("last_run_date", &raw, e))?,
            ),
            None => None,
        };

        Ok(Account {
            id: self.id,
            key: AccountKey {
                user_id: self.user_id,
                strategy_id: self.strategy_id,
            },
            symbol: self.symbol,
            status,
            initial_capital: parse_decimal("initial_capital", &self.initial_capital)?,
            cash: parse_decimal("cash", &self.cash)?,
            positions,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            last_run_date,
            version: self.version,
        })
    }
}

fn load_positions(conn: &Connection, account_id: i64) -> Result<BTreeMap<String, Position>, PaperError> {
    let mut stmt = conn.prepare(
        "SELECT symbol, quantity, cost_price FROM positions WHERE account_id = ?1 ORDER BY symbol",
    )?;
    let rows = stmt.query_map(params![account_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut positions = BTreeMap::new();
    for row in rows {
        let (symbol, quantity, cost) = row?;
        let cost_price = parse_decimal("cost_price", &cost)?;
        positions.insert(symbol.clone(), Position::new(&symbol, quantity, cost_price));
    }
    Ok(positions)
}

fn hydrate(conn: &Connection, row: Option<AccountRow>) -> Result<Option<Account>, PaperError> {
    match row {
        Some(row) => {
            let positions = load_positions(conn, row.id)?;
            Ok(Some(row.into_account(positions)?))
        }
        None => Ok(None),
    }
}

fn account_by_key(conn: &Connection, key: &AccountKey) -> Result<Option<Account>, PaperError> {
    let row = conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ?1 AND strategy_id = ?2"),
            params![key.user_id, key.strategy_id],
            AccountRow::read,
        )
        .optional()?;
    hydrate(conn, row)
}

fn account_by_id(conn: &Connection, id: i64) -> Result<Option<Account>, PaperError> {
    let row = conn
        .query_row(
            &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
            params![id],
            AccountRow::read,
        )
        .optional()?;
    hydrate(conn, row)
}

/// Version-guarded replace of one account and its positions. Caller owns
/// the transaction.
fn swap_account(conn: &Connection, expected_version: i64, state: &Account) -> Result<Account, PaperError> {
    let changed = conn.execute(
        "UPDATE accounts
         SET symbol = ?1, status = ?2, cash = ?3, updated_at = ?4, last_run_date = ?5,
             version = version + 1
         WHERE id = ?6 AND version = ?7",
        params![
            state.symbol,
            state.status.as_str(),
            state.cash.to_string(),
            state.updated_at.to_rfc3339(),
            state.last_run_date.map(|d| d.format(DATE_FORMAT).to_string()),
            state.id,
            expected_version
        ],
    )?;

    if changed == 0 {
        let exists = conn
            .query_row("SELECT 1 FROM accounts WHERE id = ?1", params![state.id], |_| Ok(()))
            .optional()?;
        return Err(match exists {
            Some(()) => PaperError::VersionConflict {
                account_id: state.id,
                expected: expected_version,
            },
            None => state.key.not_found(),
        });
    }

    conn.execute("DELETE FROM positions WHERE account_id = ?1", params![state.id])?;
    for position in state.positions.values().filter(|p| p.quantity > 0) {
        conn.execute(
            "INSERT INTO positions (account_id, symbol, quantity, cost_price) VALUES (?1, ?2, ?3, ?4)",
            params![
                state.id,
                position.symbol,
                position.quantity,
                position.cost_price.to_string()
            ],
        )?;
    }

    account_by_id(conn, state.id)?.ok_or_else(|| state.key.not_found())
}

fn insert_execution(conn: &Connection, record: &ExecutionRecord) -> Result<ExecutionRecord, PaperError> {
    conn.execute(
        "INSERT INTO executions
         (account_id, symbol, side, quantity, price, commission, status, reason, executed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.account_ref,
            record.symbol,
            record.side.as_str(),
            record.quantity,
            record.price.to_string(),
            record.commission.to_string(),
            record.status.as_str(),
            record.reason,
            record.executed_at.to_rfc3339()
        ],
    )?;

    let mut stored = record.clone();
    stored.id = Some(conn.last_insert_rowid());
    Ok(stored)
}

impl LedgerPort for SqliteLedger {
    fn get(&self, key: &AccountKey) -> Result<Option<Account>, PaperError> {
        let conn = self.conn()?;
        account_by_key(&conn, key)
    }

    fn create_if_absent(&self, request: &NewAccount) -> Result<Account, PaperError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let now = Utc::now().to_rfc3339();
        let capital = request.initial_capital.to_string();
        tx.execute(
            "INSERT OR IGNORE INTO accounts
             (user_id, strategy_id, symbol, status, initial_capital, cash, created_at, updated_at, version)
             VALUES (?1, ?2, ?3, 'active', ?4, ?4, ?5, ?5, 0)",
            params![
                request.key.user_id,
                request.key.strategy_id,
                request.symbol.trim(),
                capital,
                now
            ],
        )?;
        let account = account_by_key(&tx, &request.key)?.ok_or_else(|| request.key.not_found())?;

        tx.commit()?;
        Ok(account)
    }

    fn compare_and_swap(&self, expected_version: i64, new_state: &Account) -> Result<Account, PaperError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored = swap_account(&tx, expected_version, new_state)?;
        tx.commit()?;
        Ok(stored)
    }

    fn list_active(&self) -> Result<Vec<Account>, PaperError> {
        let conn = self.conn()?;
        let rows = {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE status = 'active' ORDER BY id"
            ))?;
            let mapped = stmt.query_map([], AccountRow::read)?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };

        let mut accounts = Vec::with_capacity(rows.len());
        for row in rows {
            let positions = load_positions(&conn, row.id)?;
            accounts.push(row.into_account(positions)?);
        }
        Ok(accounts)
    }

    fn append_execution(&self, record: &ExecutionRecord) -> Result<ExecutionRecord, PaperError> {
        let conn = self.conn()?;
        insert_execution(&conn, record)
    }

    fn executions(&self, account_ref: i64) -> Result<Vec<ExecutionRecord>, PaperError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM executions WHERE account_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![account_ref], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, account_ref, symbol, side, quantity, price, commission, status, reason, executed_at) = row?;
            records.push(ExecutionRecord {
                id: Some(id),
                account_ref,
                symbol,
                side: Side::parse(&side).ok_or_else(|| corrupt("side", &side, "unknown side"))?,
                quantity,
                price: parse_decimal("price", &price)?,
                commission: parse_decimal("commission", &commission)?,
                status: ExecutionStatus::parse(&status)
                    .ok_or_else(|| corrupt("status", &status, "unknown status"))?,
                reason,
                executed_at: parse_timestamp("executed_at", &executed_at)?,
            });
        }
        Ok(records)
    }

    fn commit_fill(
        &self,
        expected_version: i64,
        new_state: &Account,
        record: &ExecutionRecord,
    ) -> Result<(Account, ExecutionRecord), PaperError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored = swap_account(&tx, expected_version, new_state)?;
        let record = insert_execution(&tx, record)?;
        tx.commit()?;
        Ok((stored, record))
    }
}

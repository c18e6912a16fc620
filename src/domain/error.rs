//! Domain error types.
//!
//! Business-rule rejections (insufficient funds, insufficient position) are
//! not errors: they are recorded as REJECTED executions. Everything here is a
//! failure the caller has to handle.

/// Top-level error type for papertrader.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PaperError {
    #[error("account not found for user {user_id}, strategy {strategy_id}")]
    AccountNotFound {
        user_id: String,
        strategy_id: String,
    },

    #[error("strategy not registered: {strategy_id}")]
    StrategyNotFound { strategy_id: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("account {account_id} changed concurrently (expected version {expected})")]
    VersionConflict { account_id: i64, expected: i64 },

    #[error("account {account_id} still contended after {attempts} attempts")]
    TransientFailure { account_id: i64, attempts: u32 },

    #[error("{port} unavailable: {reason}")]
    UpstreamUnavailable { port: String, reason: String },

    #[error("{port} timed out after {millis}ms")]
    UpstreamTimeout { port: String, millis: u64 },

    #[error("account {account_id} has no traded symbol configured")]
    MissingSymbol { account_id: i64 },

    #[error("task for account {account_id} failed: {reason}")]
    AccountTaskFailed { account_id: i64, reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("io error: {reason}")]
    Io { reason: String },
}

impl PaperError {
    /// Transient errors may succeed if the same call is repeated later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PaperError::VersionConflict { .. }
                | PaperError::TransientFailure { .. }
                | PaperError::UpstreamUnavailable { .. }
                | PaperError::UpstreamTimeout { .. }
        )
    }
}

impl From<std::io::Error> for PaperError {
    fn from(err: std::io::Error) -> Self {
        PaperError::Io {
            reason: err.to_string(),
        }
    }
}

impl From<r2d2::Error> for PaperError {
    fn from(err: r2d2::Error) -> Self {
        PaperError::Database {
            reason: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for PaperError {
    fn from(err: rusqlite::Error) -> Self {
        PaperError::DatabaseQuery {
            reason: err.to_string(),
        }
    }
}

impl From<&PaperError> for std::process::ExitCode {
    fn from(err: &PaperError) -> Self {
        let code: u8 = match err {
            PaperError::Io { .. } | PaperError::AccountTaskFailed { .. } => 1,
            PaperError::ConfigParse { .. }
            | PaperError::ConfigMissing { .. }
            | PaperError::ConfigInvalid { .. } => 2,
            PaperError::Database { .. } | PaperError::DatabaseQuery { .. } => 3,
            PaperError::AccountNotFound { .. } | PaperError::StrategyNotFound { .. } => 4,
            PaperError::InvalidRequest { .. } | PaperError::MissingSymbol { .. } => 5,
            PaperError::VersionConflict { .. }
            | PaperError::TransientFailure { .. }
            | PaperError::UpstreamUnavailable { .. }
            | PaperError::UpstreamTimeout { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

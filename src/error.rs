//! Error types for chain-ledger
//!
//! Client-fixable failures (`Validation`, `Unauthorized`, `Forbidden`, `NotFound`,
//! `Conflict`, `InsufficientCredits`) never leave partial writes behind.
//! `Dependency` and transient database lock errors are the only retryable kinds.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient credits: balance {available}, required {required}")]
    InsufficientCredits { available: i64, required: i64 },

    #[error("Dependency unavailable: {0}")]
    Dependency(String),

    #[error("Database error: {0}")]
    Database(#[from] DieselError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Stable snake_case name used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation",
            LedgerError::Unauthorized(_) => "unauthorized",
            LedgerError::Forbidden(_) => "forbidden",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Conflict(_) => "conflict",
            LedgerError::InsufficientCredits { .. } => "insufficient_credits",
            LedgerError::Dependency(_) => "dependency",
            LedgerError::Database(_) => "database",
            LedgerError::Io(_) => "io",
            LedgerError::Json(_) => "json",
            LedgerError::Config(_) => "config",
            LedgerError::Internal(_) => "internal",
        }
    }

    /// Whether the caller may retry with backoff (read-only and idempotent operations only)
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Dependency(_) => true,
            LedgerError::Database(DieselError::DatabaseError(_, info)) => {
                let msg = info.message();
                msg.contains("database is locked") || msg.contains("database is busy")
            }
            _ => false,
        }
    }

    /// Map a unique-constraint violation to `Conflict`, leaving other errors untouched
    pub fn conflict_on_unique(err: DieselError, message: impl Into<String>) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                LedgerError::Conflict(message.into())
            }
            other => LedgerError::Database(other),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

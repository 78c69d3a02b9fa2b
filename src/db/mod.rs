//! SQLite ledger store
//!
//! Durable record of every credit transaction, the derived per-user balances,
//! and the chain state (requests, participants, claims, unlocks, likes).
//!
//! ## Tables
//!
//! - `credit_transactions` - append-only ledger (source of truth)
//! - `user_credit_balances` - balance projection, updated in the same transaction as each entry
//! - `connection_requests` - chain roots with reward pool and status
//! - `chain_participants` - who joined which chain, in order
//! - `target_claims` - claims and their review outcome (never deleted)
//! - `unlocked_chains`, `chain_likes` - gate records
//!
//! ## Concurrency
//!
//! Writers go through [`LedgerDb::with_write_tx`], which opens a SQLite
//! `BEGIN IMMEDIATE` transaction. The write lock is taken before the first
//! read, so a balance check and the spend that depends on it can never
//! interleave with another writer.

pub mod schema;
pub mod diesel_schema;
pub mod models;
pub mod credit_transactions;
pub mod credit_balances;
pub mod connection_requests;
pub mod chain_participants;
pub mod target_claims;
pub mod unlocked_chains;
pub mod chain_likes;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::error::LedgerError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Pool tuning for the on-disk database
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 5000,
        }
    }
}

/// Pragmas applied to every pooled connection
#[derive(Debug)]
struct SqlitePragmas {
    busy_timeout_ms: u64,
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        );
        if self.wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// SQLite database for the ledger and chain state
pub struct LedgerDb {
    pool: DbPool,
}

impl LedgerDb {
    /// Open or create the ledger database in `storage_dir`
    pub fn open(storage_dir: &Path, options: &DbOptions) -> Result<Self, LedgerError> {
        let db_path = storage_dir.join("ledger.db");
        info!("Opening ledger database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(db_path.to_string_lossy());
        let pool = Pool::builder()
            .max_size(options.pool_size)
            .connection_customizer(Box::new(SqlitePragmas {
                busy_timeout_ms: options.busy_timeout_ms,
                wal: true,
            }))
            .build(manager)
            .map_err(|e| LedgerError::Dependency(format!("Failed to open SQLite pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Uses a single long-lived connection: every SQLite `:memory:` connection
    /// is its own database.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        debug!("Opening in-memory ledger database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .max_lifetime(None)
            .idle_timeout(None)
            .connection_timeout(Duration::from_secs(30))
            .connection_customizer(Box::new(SqlitePragmas {
                busy_timeout_ms: 0,
                wal: false,
            }))
            .build(manager)
            .map_err(|e| LedgerError::Dependency(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), LedgerError> {
        self.with_conn(schema::init_schema)
    }

    fn conn(&self) -> Result<DbConn, LedgerError> {
        self.pool
            .get()
            .map_err(|e| LedgerError::Dependency(format!("No database connection available: {}", e)))
    }

    /// Run a read (or single-statement write) on a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, LedgerError>,
    {
        let mut conn = self.conn()?;
        f(&mut conn)
    }

    /// Run `f` inside `BEGIN IMMEDIATE ... COMMIT`; any error rolls everything back
    pub fn with_write_tx<F, T>(&self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, LedgerError>,
    {
        let mut conn = self.conn()?;
        conn.immediate_transaction(f)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, LedgerError> {
        use diesel_schema::{connection_requests, credit_transactions, target_claims, user_credit_balances};

        self.with_conn(|conn| {
            let transaction_count: i64 = credit_transactions::table.count().get_result(conn)?;
            let account_count: i64 = user_credit_balances::table.count().get_result(conn)?;
            let request_count: i64 = connection_requests::table.count().get_result(conn)?;
            let pending_claims: i64 = target_claims::table
                .filter(target_claims::status.eq(models::claim_statuses::PENDING))
                .count()
                .get_result(conn)?;

            Ok(DbStats {
                transaction_count: transaction_count as u64,
                account_count: account_count as u64,
                request_count: request_count as u64,
                pending_claims: pending_claims as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub transaction_count: u64,
    pub account_count: u64,
    pub request_count: u64,
    pub pending_claims: u64,
}

// Re-exports
pub use models::{
    ChainLike, ChainParticipant, ConnectionRequest, CreditTransaction, TargetClaim, UnlockedChain,
    UserCreditBalance,
};

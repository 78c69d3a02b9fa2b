//! Database schema definitions
//!
//! The CHECK constraints and unique indexes here are the last line of defence
//! for the ledger invariants; the services enforce the same rules first so
//! callers get typed errors instead of constraint failures.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use tracing::info;

use super::diesel_schema::schema_version;
use crate::error::LedgerError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new ledger schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating ledger schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Ledger schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, LedgerError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL PRIMARY KEY)")
        .map_err(|e| LedgerError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version = schema_version::table
        .select(schema_version::version)
        .first::<i32>(conn)
        .optional()
        .map_err(|e| LedgerError::Internal(format!("Failed to read schema_version: {}", e)))?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), LedgerError> {
    diesel::delete(schema_version::table)
        .execute(conn)
        .map_err(|e| LedgerError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    diesel::insert_into(schema_version::table)
        .values(schema_version::version.eq(version))
        .execute(conn)
        .map_err(|e| LedgerError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &mut SqliteConnection) -> Result<(), LedgerError> {
    conn.batch_execute(LEDGER_SCHEMA)
        .map_err(|e| LedgerError::Internal(format!("Failed to create ledger tables: {}", e)))?;

    conn.batch_execute(CHAIN_SCHEMA)
        .map_err(|e| LedgerError::Internal(format!("Failed to create chain tables: {}", e)))?;

    conn.batch_execute(CLAIMS_SCHEMA)
        .map_err(|e| LedgerError::Internal(format!("Failed to create claim tables: {}", e)))?;

    conn.batch_execute(GATE_SCHEMA)
        .map_err(|e| LedgerError::Internal(format!("Failed to create gate tables: {}", e)))?;

    Ok(())
}

/// Migrate schema from an older version
fn migrate_schema(conn: &mut SqliteConnection, from_version: i32) -> Result<(), LedgerError> {
    if from_version < 2 {
        // v2: target_claims gains a seq column so the audit trail has a stable order
        conn.batch_execute(MIGRATE_CLAIMS_V2)
            .map_err(|e| LedgerError::Internal(format!("Failed to migrate target_claims to v2: {}", e)))?;
    }

    create_tables(conn)?;
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Append-only transaction log and the balance projection
const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credit_transactions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    kind TEXT NOT NULL CHECK (kind IN ('earned', 'spent')),
    source TEXT NOT NULL,
    description TEXT NOT NULL,
    chain_id TEXT,
    request_id TEXT,
    related_user_id TEXT,
    idempotency_key TEXT UNIQUE,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_credit_transactions_user ON credit_transactions(user_id, seq);
CREATE INDEX IF NOT EXISTS idx_credit_transactions_request ON credit_transactions(request_id, source);

CREATE TRIGGER IF NOT EXISTS credit_transactions_no_update
BEFORE UPDATE ON credit_transactions
BEGIN
    SELECT RAISE(ABORT, 'credit_transactions is append-only');
END;

CREATE TRIGGER IF NOT EXISTS credit_transactions_no_delete
BEFORE DELETE ON credit_transactions
BEGIN
    SELECT RAISE(ABORT, 'credit_transactions is append-only');
END;

CREATE TABLE IF NOT EXISTS user_credit_balances (
    user_id TEXT PRIMARY KEY NOT NULL,
    total_credits INTEGER NOT NULL DEFAULT 0 CHECK (total_credits >= 0),
    earned_credits INTEGER NOT NULL DEFAULT 0,
    spent_credits INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    CHECK (total_credits = earned_credits - spent_credits)
);
"#;

/// Connection requests and their participant sets
const CHAIN_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS connection_requests (
    id TEXT PRIMARY KEY NOT NULL,
    chain_id TEXT NOT NULL UNIQUE,
    creator_id TEXT NOT NULL,
    target TEXT NOT NULL,
    reward INTEGER NOT NULL CHECK (reward >= 0),
    status TEXT NOT NULL CHECK (status IN ('active', 'completed')),
    message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_connection_requests_creator ON connection_requests(creator_id);

CREATE TABLE IF NOT EXISTS chain_participants (
    chain_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    request_id TEXT NOT NULL REFERENCES connection_requests(id),
    position INTEGER NOT NULL,
    joined_at TEXT NOT NULL,
    PRIMARY KEY (chain_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_chain_participants_request ON chain_participants(request_id, position);
"#;

/// Target claims (an audit trail: never deleted, at most one pending per request)
const CLAIMS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS target_claims (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    request_id TEXT NOT NULL REFERENCES connection_requests(id),
    claimant_id TEXT NOT NULL,
    contact_name TEXT NOT NULL,
    contact_email TEXT,
    contact_phone TEXT,
    message TEXT,
    status TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected')),
    rejection_reason TEXT,
    reviewed_at TEXT,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_target_claims_one_pending
    ON target_claims(request_id) WHERE status = 'pending';

CREATE TRIGGER IF NOT EXISTS target_claims_no_delete
BEFORE DELETE ON target_claims
BEGIN
    SELECT RAISE(ABORT, 'target_claims is an audit trail');
END;
"#;

/// Rebuild a v1 target_claims table with a seq column, keeping creation order
const MIGRATE_CLAIMS_V2: &str = r#"
ALTER TABLE target_claims RENAME TO target_claims_v1;
DROP INDEX IF EXISTS idx_target_claims_one_pending;
DROP TRIGGER IF EXISTS target_claims_no_delete;

CREATE TABLE IF NOT EXISTS target_claims (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    request_id TEXT NOT NULL REFERENCES connection_requests(id),
    claimant_id TEXT NOT NULL,
    contact_name TEXT NOT NULL,
    contact_email TEXT,
    contact_phone TEXT,
    message TEXT,
    status TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected')),
    rejection_reason TEXT,
    reviewed_at TEXT,
    created_at TEXT NOT NULL
);

INSERT INTO target_claims (id, request_id, claimant_id, contact_name, contact_email, contact_phone,
                           message, status, rejection_reason, reviewed_at, created_at)
SELECT id, request_id, claimant_id, contact_name, contact_email, contact_phone,
       message, status, rejection_reason, reviewed_at, created_at
FROM target_claims_v1
ORDER BY created_at, rowid;

DROP TABLE target_claims_v1;
"#;

/// Unlock records and likes
const GATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS unlocked_chains (
    user_id TEXT NOT NULL,
    chain_id TEXT NOT NULL,
    request_id TEXT NOT NULL REFERENCES connection_requests(id),
    credits_spent INTEGER NOT NULL,
    transaction_id TEXT NOT NULL REFERENCES credit_transactions(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, chain_id)
);

CREATE TABLE IF NOT EXISTS chain_likes (
    user_id TEXT NOT NULL,
    chain_id TEXT NOT NULL,
    request_id TEXT NOT NULL REFERENCES connection_requests(id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, chain_id)
);

CREATE INDEX IF NOT EXISTS idx_chain_likes_chain ON chain_likes(chain_id);
"#;

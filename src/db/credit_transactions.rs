//! Credit transaction log operations
//!
//! The log is append-only: there is no update or delete here, and the schema
//! triggers refuse both. Reversals are new offsetting entries.

use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use super::diesel_schema::credit_transactions;
use super::models::{current_timestamp, transaction_kinds, CreditTransaction, NewCreditTransaction};
use crate::error::LedgerError;

// ============================================================================
// Input Types
// ============================================================================

/// Everything needed to append one ledger entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppendInput {
    pub user_id: String,
    pub amount: i64,
    pub kind: String,
    pub source: String,
    pub description: String,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub related_user_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Query parameters for listing a user's transactions
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
            source: None,
            kind: None,
        }
    }
}

fn default_limit() -> i64 {
    20
}

/// Summed log totals for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogTotals {
    pub earned: i64,
    pub spent: i64,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get a transaction by ID
pub fn get_transaction(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<CreditTransaction>, LedgerError> {
    credit_transactions::table
        .filter(credit_transactions::id.eq(id))
        .first(conn)
        .optional()
        .map_err(LedgerError::from)
}

/// Look up the entry recorded under an idempotency key
pub fn find_by_idempotency_key(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<Option<CreditTransaction>, LedgerError> {
    credit_transactions::table
        .filter(credit_transactions::idempotency_key.eq(key))
        .first(conn)
        .optional()
        .map_err(LedgerError::from)
}

/// List a user's transactions, newest first
pub fn list_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
    query: &TransactionQuery,
) -> Result<Vec<CreditTransaction>, LedgerError> {
    let mut base_query = credit_transactions::table
        .filter(credit_transactions::user_id.eq(user_id))
        .into_boxed();

    if let Some(ref source) = query.source {
        base_query = base_query.filter(credit_transactions::source.eq(source));
    }

    if let Some(ref kind) = query.kind {
        base_query = base_query.filter(credit_transactions::kind.eq(kind));
    }

    base_query
        .order(credit_transactions::seq.desc())
        .limit(query.limit)
        .offset(query.offset)
        .load(conn)
        .map_err(LedgerError::from)
}

/// All entries of a given source posted for a request, oldest first
pub fn list_for_request(
    conn: &mut SqliteConnection,
    request_id: &str,
    source: &str,
) -> Result<Vec<CreditTransaction>, LedgerError> {
    credit_transactions::table
        .filter(credit_transactions::request_id.eq(request_id))
        .filter(credit_transactions::source.eq(source))
        .order(credit_transactions::seq.asc())
        .load(conn)
        .map_err(LedgerError::from)
}

/// Replay the log for a user
pub fn totals_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<LogTotals, LedgerError> {
    let rows: Vec<(String, i64)> = credit_transactions::table
        .filter(credit_transactions::user_id.eq(user_id))
        .select((credit_transactions::kind, credit_transactions::amount))
        .load(conn)
        .map_err(LedgerError::from)?;

    let overflow = || LedgerError::Internal(format!("Log totals for {} overflow i64", user_id));

    let mut totals = LogTotals { earned: 0, spent: 0 };
    for (kind, amount) in rows {
        match kind.as_str() {
            transaction_kinds::EARNED => totals.earned = totals.earned.checked_add(amount).ok_or_else(overflow)?,
            transaction_kinds::SPENT => totals.spent = totals.spent.checked_add(amount).ok_or_else(overflow)?,
            other => {
                return Err(LedgerError::Internal(format!("Unknown transaction kind in log: {}", other)))
            }
        }
    }
    Ok(totals)
}

// ============================================================================
// Write Operations
// ============================================================================

/// Append one entry. Callers validate input and update the balance projection
/// in the same transaction.
pub fn append(
    conn: &mut SqliteConnection,
    input: &AppendInput,
) -> Result<CreditTransaction, LedgerError> {
    if !transaction_kinds::is_valid(&input.kind) {
        return Err(LedgerError::Validation(format!("Invalid transaction kind: {}", input.kind)));
    }

    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    let new_tx = NewCreditTransaction {
        id: &id,
        user_id: &input.user_id,
        amount: input.amount,
        kind: &input.kind,
        source: &input.source,
        description: &input.description,
        chain_id: input.chain_id.as_deref(),
        request_id: input.request_id.as_deref(),
        related_user_id: input.related_user_id.as_deref(),
        idempotency_key: input.idempotency_key.as_deref(),
        created_at: &now,
    };

    diesel::insert_into(credit_transactions::table)
        .values(&new_tx)
        .execute(conn)
        .map_err(|e| LedgerError::conflict_on_unique(e, "Idempotency key already recorded"))?;

    get_transaction(conn, &id)?
        .ok_or_else(|| LedgerError::Internal("Failed to retrieve created transaction".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    fn setup_test_db() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:").expect("Failed to create in-memory database");
        init_schema(&mut conn).unwrap();
        conn
    }

    fn earned(user: &str, amount: i64, key: Option<&str>) -> AppendInput {
        AppendInput {
            user_id: user.to_string(),
            amount,
            kind: transaction_kinds::EARNED.to_string(),
            source: "bonus".to_string(),
            description: "test".to_string(),
            idempotency_key: key.map(|k| k.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_list_newest_first_with_paging() {
        let mut conn = setup_test_db();
        for amount in 1..=5 {
            append(&mut conn, &earned("alice", amount, None)).unwrap();
        }

        let page = list_for_user(&mut conn, "alice", &TransactionQuery { limit: 2, offset: 0, ..Default::default() }).unwrap();
        assert_eq!(page.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![5, 4]);

        let page = list_for_user(&mut conn, "alice", &TransactionQuery { limit: 2, offset: 4, ..Default::default() }).unwrap();
        assert_eq!(page.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_duplicate_idempotency_key_is_conflict() {
        let mut conn = setup_test_db();
        append(&mut conn, &earned("alice", 2, Some("join_chain:r1:alice"))).unwrap();

        let err = append(&mut conn, &earned("alice", 2, Some("join_chain:r1:alice"))).unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));

        let found = find_by_idempotency_key(&mut conn, "join_chain:r1:alice").unwrap();
        assert_eq!(found.map(|t| t.amount), Some(2));
    }

    #[test]
    fn test_totals_replay() {
        let mut conn = setup_test_db();
        append(&mut conn, &earned("bob", 10, None)).unwrap();
        append(&mut conn, &AppendInput { kind: transaction_kinds::SPENT.into(), ..earned("bob", 4, None) }).unwrap();
        append(&mut conn, &earned("carol", 99, None)).unwrap();

        assert_eq!(totals_for_user(&mut conn, "bob").unwrap(), LogTotals { earned: 10, spent: 4 });
    }

    #[test]
    fn test_totals_overflow_is_error() {
        let mut conn = setup_test_db();
        append(&mut conn, &earned("bob", i64::MAX, None)).unwrap();
        append(&mut conn, &earned("bob", 1, None)).unwrap();

        assert!(matches!(totals_for_user(&mut conn, "bob"), Err(LedgerError::Internal(_))));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let mut conn = setup_test_db();
        let err = append(&mut conn, &AppendInput { kind: "refunded".into(), ..earned("bob", 1, None) }).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}

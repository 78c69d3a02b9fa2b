//! Credit ledger service
//!
//! Validates and records earn/spend entries and answers balance queries.
//! Each entry and its balance projection update commit together in one
//! IMMEDIATE transaction. The connection-level helpers [`award_in_tx`] and
//! [`spend_in_tx`] let other services post entries inside their own
//! transaction boundary.

use std::sync::Arc;

use diesel::SqliteConnection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use crate::db::credit_balances;
use crate::db::credit_transactions::{self, AppendInput, TransactionQuery};
use crate::db::models::{credit_sources, transaction_kinds};
use crate::db::{CreditTransaction, LedgerDb, UserCreditBalance};
use crate::error::{LedgerError, LedgerResult};

use super::events::{EventBus, LedgerEvent};

// ============================================================================
// Types
// ============================================================================

/// Body of an award or spend call. The user comes from the caller's identity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreditInput {
    pub amount: i64,
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

/// A ledger write. `replayed` is set when the idempotency key was already
/// recorded and no balance changed.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct Posted {
    pub transaction: CreditTransaction,
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct ReconcileReport {
    pub user_id: String,
    /// Total replayed from the log
    pub expected: i64,
    /// Total the projection held before reconciliation
    pub stored: i64,
    pub repaired: bool,
}

// ============================================================================
// Connection-level operations
// ============================================================================

fn validate_credit(user_id: &str, input: &CreditInput) -> LedgerResult<()> {
    if user_id.trim().is_empty() {
        return Err(LedgerError::Validation("user_id is required".into()));
    }
    if input.amount <= 0 {
        return Err(LedgerError::Validation(format!("amount must be positive, got {}", input.amount)));
    }
    if !credit_sources::is_well_formed(&input.source) {
        return Err(LedgerError::Validation(format!("Invalid credit source: '{}'", input.source)));
    }
    if input.description.trim().is_empty() {
        return Err(LedgerError::Validation("description is required".into()));
    }
    if let Some(key) = &input.idempotency_key {
        if key.trim().is_empty() {
            return Err(LedgerError::Validation("idempotency_key must not be empty".into()));
        }
    }
    Ok(())
}

/// Return the entry already recorded under the input's key, if any
fn find_replay(
    conn: &mut SqliteConnection,
    user_id: &str,
    kind: &str,
    input: &CreditInput,
) -> LedgerResult<Option<CreditTransaction>> {
    let Some(key) = input.idempotency_key.as_deref() else {
        return Ok(None);
    };
    match credit_transactions::find_by_idempotency_key(conn, key)? {
        Some(existing) if existing.user_id == user_id && existing.kind == kind && existing.amount == input.amount => {
            Ok(Some(existing))
        }
        Some(_) => Err(LedgerError::Conflict(format!(
            "Idempotency key {} was recorded for a different entry",
            key
        ))),
        None => Ok(None),
    }
}

fn append_input(user_id: &str, kind: &str, input: &CreditInput) -> AppendInput {
    AppendInput {
        user_id: user_id.to_string(),
        amount: input.amount,
        kind: kind.to_string(),
        source: input.source.clone(),
        description: input.description.clone(),
        chain_id: input.chain_id.clone(),
        request_id: input.request_id.clone(),
        related_user_id: input.related_user_id.clone(),
        idempotency_key: input.idempotency_key.clone(),
    }
}

/// Key stored for a caller-supplied idempotency key
///
/// Service-posted entries use `{source}:...` keys; caller keys live under
/// `client:{user_id}:` so they can never shadow one of those.
pub fn client_key(user_id: &str, key: &str) -> String {
    format!("client:{}:{}", user_id, key)
}

fn scope_client_key(user_id: &str, input: &CreditInput) -> LedgerResult<CreditInput> {
    let idempotency_key = match input.idempotency_key.as_deref() {
        Some(key) if key.trim().is_empty() => {
            return Err(LedgerError::Validation("idempotency_key must not be empty".into()))
        }
        Some(key) => Some(client_key(user_id, key)),
        None => None,
    };
    Ok(CreditInput {
        idempotency_key,
        ..input.clone()
    })
}

/// Append an `earned` entry and credit the projection. Caller owns the transaction.
pub fn award_in_tx(conn: &mut SqliteConnection, user_id: &str, input: &CreditInput) -> LedgerResult<Posted> {
    validate_credit(user_id, input)?;

    if let Some(transaction) = find_replay(conn, user_id, transaction_kinds::EARNED, input)? {
        return Ok(Posted { transaction, replayed: true });
    }

    let transaction = credit_transactions::append(conn, &append_input(user_id, transaction_kinds::EARNED, input))?;
    credit_balances::apply_earned(conn, user_id, input.amount)?;
    Ok(Posted { transaction, replayed: false })
}

/// Debit the projection if the balance covers it, then append a `spent` entry.
/// Caller owns the transaction.
pub fn spend_in_tx(conn: &mut SqliteConnection, user_id: &str, input: &CreditInput) -> LedgerResult<Posted> {
    validate_credit(user_id, input)?;

    if let Some(transaction) = find_replay(conn, user_id, transaction_kinds::SPENT, input)? {
        return Ok(Posted { transaction, replayed: true });
    }

    credit_balances::apply_spent(conn, user_id, input.amount)?;
    let transaction = credit_transactions::append(conn, &append_input(user_id, transaction_kinds::SPENT, input))?;
    Ok(Posted { transaction, replayed: false })
}

/// Emit the committed-write event for a posted entry
pub fn announce(events: &EventBus, posted: &Posted) {
    if posted.replayed {
        return;
    }
    let tx = &posted.transaction;
    let event = if tx.kind == transaction_kinds::SPENT {
        LedgerEvent::CreditsSpent {
            transaction_id: tx.id.clone(),
            user_id: tx.user_id.clone(),
            amount: tx.amount,
            source: tx.source.clone(),
        }
    } else {
        LedgerEvent::CreditsAwarded {
            transaction_id: tx.id.clone(),
            user_id: tx.user_id.clone(),
            amount: tx.amount,
            source: tx.source.clone(),
        }
    };
    events.emit(event);
}

// ============================================================================
// Service
// ============================================================================

pub struct LedgerService {
    db: Arc<LedgerDb>,
    events: Arc<EventBus>,
    max_page_size: i64,
}

impl LedgerService {
    pub fn new(db: Arc<LedgerDb>, events: Arc<EventBus>, max_page_size: i64) -> Self {
        Self { db, events, max_page_size }
    }

    /// Record an `earned` entry on behalf of a caller
    ///
    /// A supplied `idempotency_key` is scoped to the user (see [`client_key`]).
    pub fn award_credits(&self, user_id: &str, input: &CreditInput) -> LedgerResult<Posted> {
        let input = &scope_client_key(user_id, input)?;
        let posted = self.db.with_write_tx(|conn| award_in_tx(conn, user_id, input))?;

        if posted.replayed {
            debug!(user_id, key = ?input.idempotency_key, "Award replayed");
        } else {
            info!(user_id, amount = input.amount, source = %input.source, "Credits awarded");
        }
        announce(&self.events, &posted);
        Ok(posted)
    }

    /// Record a `spent` entry, or fail with `InsufficientCredits` and change nothing
    pub fn spend_credits(&self, user_id: &str, input: &CreditInput) -> LedgerResult<Posted> {
        let input = &scope_client_key(user_id, input)?;
        let posted = self
            .db
            .with_write_tx(|conn| spend_in_tx(conn, user_id, input))
            .inspect_err(|e| {
                if let LedgerError::InsufficientCredits { available, required } = e {
                    debug!(user_id, available, required, "Spend rejected");
                }
            })?;

        if !posted.replayed {
            info!(user_id, amount = input.amount, source = %input.source, "Credits spent");
        }
        announce(&self.events, &posted);
        Ok(posted)
    }

    /// Current balance; materializes a zero row on first access
    pub fn get_balance(&self, user_id: &str) -> LedgerResult<UserCreditBalance> {
        if user_id.trim().is_empty() {
            return Err(LedgerError::Validation("user_id is required".into()));
        }
        self.db.with_conn(|conn| credit_balances::get_or_create_balance(conn, user_id))
    }

    /// A page of the user's transactions, newest first
    pub fn list_transactions(&self, user_id: &str, query: &TransactionQuery) -> LedgerResult<Vec<CreditTransaction>> {
        if query.offset < 0 {
            return Err(LedgerError::Validation("offset must not be negative".into()));
        }
        if query.limit <= 0 {
            return Err(LedgerError::Validation("limit must be positive".into()));
        }
        let query = TransactionQuery {
            limit: query.limit.min(self.max_page_size),
            ..query.clone()
        };
        self.db.with_conn(|conn| credit_transactions::list_for_user(conn, user_id, &query))
    }

    /// Replay the log and repair the balance projection if it diverged
    pub fn reconcile_balance(&self, user_id: &str) -> LedgerResult<ReconcileReport> {
        let report = self.db.with_write_tx(|conn| {
            let totals = credit_transactions::totals_for_user(conn, user_id)?;
            let stored = credit_balances::get_or_create_balance(conn, user_id)?;
            let expected = totals.earned - totals.spent;

            let diverged = stored.earned_credits != totals.earned
                || stored.spent_credits != totals.spent
                || stored.total_credits != expected;
            if diverged {
                credit_balances::overwrite_balance(conn, user_id, totals.earned, totals.spent)?;
            }

            Ok(ReconcileReport {
                user_id: user_id.to_string(),
                expected,
                stored: stored.total_credits,
                repaired: diverged,
            })
        })?;

        self.events.emit(LedgerEvent::BalanceReconciled {
            user_id: report.user_id.clone(),
            expected: report.expected,
            stored: report.stored,
            repaired: report.repaired,
        });
        Ok(report)
    }
}

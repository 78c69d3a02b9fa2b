//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! TypeScript types are auto-generated via ts-rs. Run:
//!   cargo test export_bindings
//! Generated files go to: bindings/

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::diesel_schema::*;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Current UTC timestamp as ISO 8601 with milliseconds for SQLite TEXT columns
pub fn current_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

// ============================================================================
// Credit Ledger Models
// ============================================================================

/// Immutable ledger fact
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = credit_transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct CreditTransaction {
    /// Log position; newest-first listings order by this
    pub seq: i64,
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub kind: String,
    pub source: String,
    pub description: String,
    pub chain_id: Option<String>,
    pub request_id: Option<String>,
    pub related_user_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: String,
}

/// New ledger entry for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = credit_transactions)]
pub struct NewCreditTransaction<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub amount: i64,
    pub kind: &'a str,
    pub source: &'a str,
    pub description: &'a str,
    pub chain_id: Option<&'a str>,
    pub request_id: Option<&'a str>,
    pub related_user_id: Option<&'a str>,
    pub idempotency_key: Option<&'a str>,
    pub created_at: &'a str,
}

/// Per-user balance projection of the transaction log
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = user_credit_balances)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct UserCreditBalance {
    pub user_id: String,
    pub total_credits: i64,
    pub earned_credits: i64,
    pub spent_credits: i64,
    pub updated_at: String,
}

impl UserCreditBalance {
    /// Zero balance for a user with no ledger history
    pub fn zero(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_credits: 0,
            earned_credits: 0,
            spent_credits: 0,
            updated_at: current_timestamp(),
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_credit_balances)]
pub struct NewUserCreditBalance<'a> {
    pub user_id: &'a str,
    pub total_credits: i64,
    pub earned_credits: i64,
    pub spent_credits: i64,
    pub updated_at: &'a str,
}

// ============================================================================
// Chain Models
// ============================================================================

/// Chain root: a creator looking for a target, with a reward pool
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = connection_requests)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct ConnectionRequest {
    pub id: String,
    pub chain_id: String,
    pub creator_id: String,
    pub target: String,
    pub reward: i64,
    pub status: String,
    pub message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = connection_requests)]
pub struct NewConnectionRequest<'a> {
    pub id: &'a str,
    pub chain_id: &'a str,
    pub creator_id: &'a str,
    pub target: &'a str,
    pub reward: i64,
    pub status: &'a str,
    pub message: Option<&'a str>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = chain_participants)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct ChainParticipant {
    pub chain_id: String,
    pub user_id: String,
    pub request_id: String,
    /// 1 for the creator, then join order
    pub position: i64,
    pub joined_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chain_participants)]
pub struct NewChainParticipant<'a> {
    pub chain_id: &'a str,
    pub user_id: &'a str,
    pub request_id: &'a str,
    pub position: i64,
    pub joined_at: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = target_claims)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct TargetClaim {
    /// Submission order; the audit trail is listed by this
    pub seq: i64,
    pub id: String,
    pub request_id: String,
    pub claimant_id: String,
    pub contact_name: String,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub message: Option<String>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub reviewed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = target_claims)]
pub struct NewTargetClaim<'a> {
    pub id: &'a str,
    pub request_id: &'a str,
    pub claimant_id: &'a str,
    pub contact_name: &'a str,
    pub contact_email: Option<&'a str>,
    pub contact_phone: Option<&'a str>,
    pub message: Option<&'a str>,
    pub status: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// Gate Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = unlocked_chains)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct UnlockedChain {
    pub user_id: String,
    pub chain_id: String,
    pub request_id: String,
    pub credits_spent: i64,
    pub transaction_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = unlocked_chains)]
pub struct NewUnlockedChain<'a> {
    pub user_id: &'a str,
    pub chain_id: &'a str,
    pub request_id: &'a str,
    pub credits_spent: i64,
    pub transaction_id: &'a str,
    pub created_at: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = chain_likes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "../bindings/")]
pub struct ChainLike {
    pub user_id: String,
    pub chain_id: String,
    pub request_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chain_likes)]
pub struct NewChainLike<'a> {
    pub user_id: &'a str,
    pub chain_id: &'a str,
    pub request_id: &'a str,
    pub created_at: &'a str,
}

// ============================================================================
// Enumerations (stored as TEXT)
// ============================================================================

pub mod transaction_kinds {
    pub const EARNED: &str = "earned";
    pub const SPENT: &str = "spent";

    pub const ALL: [&str; 2] = [EARNED, SPENT];

    pub fn is_valid(kind: &str) -> bool {
        ALL.contains(&kind)
    }
}

/// Known ledger sources. The set is open: any snake_case source is accepted.
pub mod credit_sources {
    pub const JOIN_CHAIN: &str = "join_chain";
    pub const OTHERS_JOINED: &str = "others_joined";
    pub const UNLOCK_CHAIN: &str = "unlock_chain";
    pub const BONUS: &str = "bonus";
    pub const INITIAL_BONUS: &str = "initial_bonus";
    pub const CHAIN_REWARD: &str = "chain_reward";

    pub const KNOWN: [&str; 6] = [JOIN_CHAIN, OTHERS_JOINED, UNLOCK_CHAIN, BONUS, INITIAL_BONUS, CHAIN_REWARD];

    pub const MAX_LEN: usize = 64;

    /// Lowercase ASCII letters, digits and underscores, starting with a letter
    pub fn is_well_formed(source: &str) -> bool {
        !source.is_empty()
            && source.len() <= MAX_LEN
            && source.starts_with(|c: char| c.is_ascii_lowercase())
            && source.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    pub fn is_known(source: &str) -> bool {
        KNOWN.contains(&source)
    }
}

pub mod request_statuses {
    pub const ACTIVE: &str = "active";
    pub const COMPLETED: &str = "completed";

    pub const ALL: [&str; 2] = [ACTIVE, COMPLETED];

    pub fn is_valid(status: &str) -> bool {
        ALL.contains(&status)
    }
}

pub mod claim_statuses {
    pub const PENDING: &str = "pending";
    pub const APPROVED: &str = "approved";
    pub const REJECTED: &str = "rejected";

    pub const ALL: [&str; 3] = [PENDING, APPROVED, REJECTED];

    pub fn is_valid(status: &str) -> bool {
        ALL.contains(&status)
    }
}

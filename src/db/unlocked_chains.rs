//! Unlocked chain records

use diesel::prelude::*;

use super::diesel_schema::unlocked_chains;
use super::models::{current_timestamp, NewUnlockedChain, UnlockedChain};
use crate::error::LedgerError;

pub fn get_unlock(
    conn: &mut SqliteConnection,
    user_id: &str,
    chain_id: &str,
) -> Result<Option<UnlockedChain>, LedgerError> {
    unlocked_chains::table
        .filter(unlocked_chains::user_id.eq(user_id))
        .filter(unlocked_chains::chain_id.eq(chain_id))
        .first(conn)
        .optional()
        .map_err(LedgerError::from)
}

/// Record an unlock paid by `transaction_id`
pub fn insert_unlock(
    conn: &mut SqliteConnection,
    user_id: &str,
    chain_id: &str,
    request_id: &str,
    credits_spent: i64,
    transaction_id: &str,
) -> Result<UnlockedChain, LedgerError> {
    let now = current_timestamp();
    diesel::insert_into(unlocked_chains::table)
        .values(&NewUnlockedChain {
            user_id,
            chain_id,
            request_id,
            credits_spent,
            transaction_id,
            created_at: &now,
        })
        .execute(conn)
        .map_err(|e| LedgerError::conflict_on_unique(e, format!("Chain {} already unlocked", chain_id)))?;

    get_unlock(conn, user_id, chain_id)?
        .ok_or_else(|| LedgerError::Internal("Failed to retrieve unlock record".into()))
}

/// Chains a user has unlocked, newest first
pub fn list_for_user(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Vec<UnlockedChain>, LedgerError> {
    unlocked_chains::table
        .filter(unlocked_chains::user_id.eq(user_id))
        .order(unlocked_chains::created_at.desc())
        .load(conn)
        .map_err(LedgerError::from)
}

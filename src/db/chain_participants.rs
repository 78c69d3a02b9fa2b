//! Chain participant operations
//!
//! One row per (chain_id, user_id). Position 1 is the creator; later joiners
//! get the next position. Callers hold the write transaction, so the
//! max(position)+1 read cannot race another insert.

use diesel::dsl::max;
use diesel::prelude::*;

use super::diesel_schema::chain_participants;
use super::models::{current_timestamp, ChainParticipant, NewChainParticipant};
use crate::error::LedgerError;

/// Get a single participant row
pub fn get_participant(
    conn: &mut SqliteConnection,
    chain_id: &str,
    user_id: &str,
) -> Result<Option<ChainParticipant>, LedgerError> {
    chain_participants::table
        .filter(chain_participants::chain_id.eq(chain_id))
        .filter(chain_participants::user_id.eq(user_id))
        .first(conn)
        .optional()
        .map_err(LedgerError::from)
}

/// All participants of a chain in join order
pub fn list_participants(
    conn: &mut SqliteConnection,
    chain_id: &str,
) -> Result<Vec<ChainParticipant>, LedgerError> {
    chain_participants::table
        .filter(chain_participants::chain_id.eq(chain_id))
        .order(chain_participants::position.asc())
        .load(conn)
        .map_err(LedgerError::from)
}

/// Chain length (cardinality of the participant set)
pub fn chain_length(conn: &mut SqliteConnection, chain_id: &str) -> Result<i64, LedgerError> {
    chain_participants::table
        .filter(chain_participants::chain_id.eq(chain_id))
        .count()
        .get_result(conn)
        .map_err(LedgerError::from)
}

/// Insert the participant if absent
///
/// Returns the row and whether it was created by this call.
pub fn insert_if_absent(
    conn: &mut SqliteConnection,
    chain_id: &str,
    request_id: &str,
    user_id: &str,
) -> Result<(ChainParticipant, bool), LedgerError> {
    if let Some(existing) = get_participant(conn, chain_id, user_id)? {
        return Ok((existing, false));
    }

    let last: Option<i64> = chain_participants::table
        .filter(chain_participants::chain_id.eq(chain_id))
        .select(max(chain_participants::position))
        .first(conn)?;
    let position = last.unwrap_or(0) + 1;
    let now = current_timestamp();

    diesel::insert_into(chain_participants::table)
        .values(&NewChainParticipant {
            chain_id,
            user_id,
            request_id,
            position,
            joined_at: &now,
        })
        .execute(conn)
        .map_err(|e| LedgerError::conflict_on_unique(e, format!("{} already joined chain {}", user_id, chain_id)))?;

    let row = get_participant(conn, chain_id, user_id)?
        .ok_or_else(|| LedgerError::Internal("Failed to retrieve created participant".into()))?;
    Ok((row, true))
}

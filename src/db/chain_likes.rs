//! Chain likes - a non-monetary reaction, one per (user_id, chain_id)

use diesel::prelude::*;

use super::diesel_schema::chain_likes;
use super::models::{current_timestamp, NewChainLike};
use crate::error::LedgerError;

pub fn has_liked(conn: &mut SqliteConnection, user_id: &str, chain_id: &str) -> Result<bool, LedgerError> {
    let count: i64 = chain_likes::table
        .filter(chain_likes::user_id.eq(user_id))
        .filter(chain_likes::chain_id.eq(chain_id))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn like_count(conn: &mut SqliteConnection, chain_id: &str) -> Result<i64, LedgerError> {
    chain_likes::table
        .filter(chain_likes::chain_id.eq(chain_id))
        .count()
        .get_result(conn)
        .map_err(LedgerError::from)
}

/// Delete the like if present, otherwise create it. Returns the new liked state.
pub fn toggle(
    conn: &mut SqliteConnection,
    user_id: &str,
    chain_id: &str,
    request_id: &str,
) -> Result<bool, LedgerError> {
    let removed = diesel::delete(
        chain_likes::table
            .filter(chain_likes::user_id.eq(user_id))
            .filter(chain_likes::chain_id.eq(chain_id)),
    )
    .execute(conn)?;

    if removed > 0 {
        return Ok(false);
    }

    let now = current_timestamp();
    diesel::insert_into(chain_likes::table)
        .values(&NewChainLike {
            user_id,
            chain_id,
            request_id,
            created_at: &now,
        })
        .execute(conn)?;
    Ok(true)
}

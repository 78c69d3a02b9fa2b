//! Connection request (chain root) operations

use diesel::prelude::*;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::diesel_schema::connection_requests;
use super::models::{current_timestamp, request_statuses, ConnectionRequest, NewConnectionRequest};
use crate::error::LedgerError;

/// Input for creating a connection request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequestInput {
    pub target: String,
    #[serde(default)]
    pub reward: i64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Get a request by ID
pub fn get_request(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<ConnectionRequest>, LedgerError> {
    connection_requests::table
        .filter(connection_requests::id.eq(id))
        .first(conn)
        .optional()
        .map_err(LedgerError::from)
}

/// Get a request by ID or fail with `NotFound`
pub fn require_request(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<ConnectionRequest, LedgerError> {
    get_request(conn, id)?.ok_or_else(|| LedgerError::NotFound(format!("Connection request {}", id)))
}

/// Requests created by a user, newest first
pub fn list_for_creator(
    conn: &mut SqliteConnection,
    creator_id: &str,
    limit: i64,
) -> Result<Vec<ConnectionRequest>, LedgerError> {
    connection_requests::table
        .filter(connection_requests::creator_id.eq(creator_id))
        .order(connection_requests::created_at.desc())
        .limit(limit)
        .load(conn)
        .map_err(LedgerError::from)
}

/// Insert a new active request with a fresh chain id
pub fn create_request(
    conn: &mut SqliteConnection,
    creator_id: &str,
    input: &CreateRequestInput,
) -> Result<ConnectionRequest, LedgerError> {
    let id = Uuid::new_v4().to_string();
    let chain_id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    diesel::insert_into(connection_requests::table)
        .values(&NewConnectionRequest {
            id: &id,
            chain_id: &chain_id,
            creator_id,
            target: &input.target,
            reward: input.reward,
            status: request_statuses::ACTIVE,
            message: input.message.as_deref(),
            created_at: &now,
            updated_at: &now,
        })
        .execute(conn)
        .map_err(LedgerError::from)?;

    debug!("Created connection request {} (chain {})", id, chain_id);

    require_request(conn, &id)
}

/// Move a request from active to completed
///
/// Conditional on the current status, so a second completion affects no rows
/// and is reported as `Conflict`.
pub fn mark_completed(conn: &mut SqliteConnection, id: &str) -> Result<(), LedgerError> {
    let now = current_timestamp();
    let updated = diesel::update(
        connection_requests::table
            .filter(connection_requests::id.eq(id))
            .filter(connection_requests::status.eq(request_statuses::ACTIVE)),
    )
    .set((
        connection_requests::status.eq(request_statuses::COMPLETED),
        connection_requests::updated_at.eq(&now),
    ))
    .execute(conn)?;

    if updated == 0 {
        return Err(LedgerError::Conflict(format!("Request {} is not active", id)));
    }
    Ok(())
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

    fn input(reward: i64) -> CreateRequestInput {
        CreateRequestInput {
            target: "Head of partnerships at Acme".into(),
            reward,
            message: None,
        }
    }

    #[test]
    fn test_create_and_complete_once() {
        let mut conn = setup_test_db();
        let request = create_request(&mut conn, "alice", &input(90)).unwrap();
        assert_eq!(request.status, request_statuses::ACTIVE);
        assert_ne!(request.id, request.chain_id);

        mark_completed(&mut conn, &request.id).unwrap();
        let err = mark_completed(&mut conn, &request.id).unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));

        let stored = require_request(&mut conn, &request.id).unwrap();
        assert_eq!(stored.status, request_statuses::COMPLETED);
        assert_eq!(stored.reward, 90);
    }

    #[test]
    fn test_missing_request_is_not_found() {
        let mut conn = setup_test_db();
        assert!(matches!(require_request(&mut conn, "nope"), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_list_for_creator() {
        let mut conn = setup_test_db();
        create_request(&mut conn, "alice", &input(10)).unwrap();
        create_request(&mut conn, "alice", &input(20)).unwrap();
        create_request(&mut conn, "bob", &input(30)).unwrap();

        assert_eq!(list_for_creator(&mut conn, "alice", 10).unwrap().len(), 2);
    }
}

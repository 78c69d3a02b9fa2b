//! Target claim operations
//!
//! Claims are never deleted. Status moves pending -> approved | rejected
//! through conditional updates, so only one resolution can ever apply.

use diesel::prelude::*;
use serde::Deserialize;
use uuid::Uuid;

use super::diesel_schema::target_claims;
use super::models::{claim_statuses, current_timestamp, NewTargetClaim, TargetClaim};
use crate::error::LedgerError;

/// Claimant-supplied contact details
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaimDetails {
    pub contact_name: String,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Get a claim by ID
pub fn get_claim(conn: &mut SqliteConnection, id: &str) -> Result<Option<TargetClaim>, LedgerError> {
    target_claims::table
        .filter(target_claims::id.eq(id))
        .first(conn)
        .optional()
        .map_err(LedgerError::from)
}

/// Get a claim or fail with `NotFound`
pub fn require_claim(conn: &mut SqliteConnection, id: &str) -> Result<TargetClaim, LedgerError> {
    get_claim(conn, id)?.ok_or_else(|| LedgerError::NotFound(format!("Target claim {}", id)))
}

/// The pending claim on a request, if any
pub fn pending_for_request(
    conn: &mut SqliteConnection,
    request_id: &str,
) -> Result<Option<TargetClaim>, LedgerError> {
    target_claims::table
        .filter(target_claims::request_id.eq(request_id))
        .filter(target_claims::status.eq(claim_statuses::PENDING))
        .first(conn)
        .optional()
        .map_err(LedgerError::from)
}

/// Claim history for a request, newest first
pub fn list_for_request(
    conn: &mut SqliteConnection,
    request_id: &str,
) -> Result<Vec<TargetClaim>, LedgerError> {
    target_claims::table
        .filter(target_claims::request_id.eq(request_id))
        .order(target_claims::seq.desc())
        .load(conn)
        .map_err(LedgerError::from)
}

/// Insert a pending claim
///
/// The partial unique index on pending claims turns a concurrent second
/// pending claim into `Conflict`.
pub fn create_claim(
    conn: &mut SqliteConnection,
    request_id: &str,
    claimant_id: &str,
    details: &ClaimDetails,
) -> Result<TargetClaim, LedgerError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    diesel::insert_into(target_claims::table)
        .values(&NewTargetClaim {
            id: &id,
            request_id,
            claimant_id,
            contact_name: &details.contact_name,
            contact_email: details.contact_email.as_deref(),
            contact_phone: details.contact_phone.as_deref(),
            message: details.message.as_deref(),
            status: claim_statuses::PENDING,
            created_at: &now,
        })
        .execute(conn)
        .map_err(|e| {
            LedgerError::conflict_on_unique(e, format!("Request {} already has a pending claim", request_id))
        })?;

    require_claim(conn, &id)
}

/// Move a pending claim to `approved` or `rejected`
///
/// Returns `Conflict` if the claim is no longer pending.
pub fn resolve_pending(
    conn: &mut SqliteConnection,
    id: &str,
    new_status: &str,
    rejection_reason: Option<&str>,
) -> Result<TargetClaim, LedgerError> {
    if new_status == claim_statuses::PENDING || !claim_statuses::is_valid(new_status) {
        return Err(LedgerError::Validation(format!("Invalid claim resolution: {}", new_status)));
    }

    let now = current_timestamp();
    let updated = diesel::update(
        target_claims::table
            .filter(target_claims::id.eq(id))
            .filter(target_claims::status.eq(claim_statuses::PENDING)),
    )
    .set((
        target_claims::status.eq(new_status),
        target_claims::rejection_reason.eq(rejection_reason),
        target_claims::reviewed_at.eq(Some(now.as_str())),
    ))
    .execute(conn)?;

    if updated == 0 {
        return Err(LedgerError::Conflict(format!("Claim {} is not pending", id)));
    }
    require_claim(conn, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection_requests::{create_request, CreateRequestInput};
    use crate::db::schema::init_schema;

    fn setup() -> (SqliteConnection, String) {
        let mut conn = SqliteConnection::establish(":memory:").expect("Failed to create in-memory database");
        init_schema(&mut conn).unwrap();
        let request = create_request(
            &mut conn,
            "creator",
            &CreateRequestInput { target: "someone".into(), reward: 10, message: None },
        )
        .unwrap();
        (conn, request.id)
    }

    fn details() -> ClaimDetails {
        ClaimDetails {
            contact_name: "Dana".into(),
            contact_email: Some("dana@example.com".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_only_one_pending_claim() {
        let (mut conn, request_id) = setup();
        create_claim(&mut conn, &request_id, "dana", &details()).unwrap();

        let err = create_claim(&mut conn, &request_id, "erin", &details()).unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[test]
    fn test_resolution_applies_once() {
        let (mut conn, request_id) = setup();
        let claim = create_claim(&mut conn, &request_id, "dana", &details()).unwrap();

        let rejected = resolve_pending(&mut conn, &claim.id, claim_statuses::REJECTED, Some("not them")).unwrap();
        assert_eq!(rejected.status, claim_statuses::REJECTED);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("not them"));
        assert!(rejected.reviewed_at.is_some());

        let err = resolve_pending(&mut conn, &claim.id, claim_statuses::APPROVED, None).unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[test]
    fn test_new_claim_allowed_after_rejection() {
        let (mut conn, request_id) = setup();
        let first = create_claim(&mut conn, &request_id, "dana", &details()).unwrap();
        resolve_pending(&mut conn, &first.id, claim_statuses::REJECTED, None).unwrap();

        let second = create_claim(&mut conn, &request_id, "erin", &details()).unwrap();
        assert!(pending_for_request(&mut conn, &request_id).unwrap().is_some());

        // Both land in the same millisecond often enough; seq keeps the order fixed
        let ids: Vec<_> = list_for_request(&mut conn, &request_id).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_history_is_newest_first_by_submission() {
        let (mut conn, request_id) = setup();
        let mut submitted = Vec::new();
        for claimant in ["c1", "c2", "c3", "c4"] {
            let claim = create_claim(&mut conn, &request_id, claimant, &details()).unwrap();
            resolve_pending(&mut conn, &claim.id, claim_statuses::REJECTED, None).unwrap();
            submitted.push(claim.id);
        }
        submitted.reverse();

        let listed: Vec<_> = list_for_request(&mut conn, &request_id).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(listed, submitted);
    }

    #[test]
    fn test_read_errors_keep_database_cause() {
        use diesel::connection::SimpleConnection;

        let (mut conn, _) = setup();
        conn.batch_execute("DROP TABLE target_claims").unwrap();
        assert!(matches!(get_claim(&mut conn, "any"), Err(LedgerError::Database(_))));
    }
}

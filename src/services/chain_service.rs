//! Chain state machine
//!
//! A request's chain is `Active` until someone claims to be the target, then
//! `ClaimPending` until the creator decides. Rejection returns it to `Active`;
//! approval pays the reward pool out and makes it `Completed` (terminal).
//!
//! ```text
//! Active --submit_claim--> ClaimPending --reject--> Active
//!                                       --approve--> Completed
//! ```
//!
//! Writes for one request are serialized by [`ChainLocks`] in-process and by
//! the IMMEDIATE write transaction across connections.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::config::{Config, RemainderPolicy};
use crate::db::connection_requests::{self, CreateRequestInput};
use crate::db::models::{claim_statuses, credit_sources, request_statuses};
use crate::db::target_claims::{self, ClaimDetails};
use crate::db::{chain_likes, chain_participants, credit_transactions};
use crate::db::{ChainParticipant, ConnectionRequest, CreditTransaction, LedgerDb, TargetClaim};
use crate::error::{LedgerError, LedgerResult};

use super::distribution::distribute_in_tx;
use super::events::{EventBus, LedgerEvent};
use super::ledger_service::{announce, award_in_tx, CreditInput, Posted};
use super::locks::ChainLocks;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../bindings/")]
pub enum ChainState {
    Active,
    ClaimPending,
    Completed,
}

/// A request with its derived chain state
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct RequestView {
    pub request: ConnectionRequest,
    pub state: ChainState,
    pub chain_length: i64,
    pub participants: Vec<ChainParticipant>,
    pub like_count: i64,
    pub pending_claim_id: Option<String>,
}

/// Body of a join call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinInput {
    pub request_id: String,
    #[serde(default)]
    pub chain_id: Option<String>,
    #[serde(default)]
    pub creator_id: Option<String>,
}

/// Outcome of the best-effort creator award on a join
#[derive(Debug, Clone, Serialize, TS)]
#[serde(tag = "status", rename_all = "snake_case")]
#[ts(export, export_to = "../bindings/")]
pub enum CreatorAward {
    Posted { transaction: CreditTransaction },
    Replayed { transaction: CreditTransaction },
    /// The joiner is the creator
    Skipped,
    Failed { reason: String },
}

impl CreatorAward {
    fn from_result(result: LedgerResult<Posted>) -> Self {
        match result {
            Ok(Posted { transaction, replayed: false }) => CreatorAward::Posted { transaction },
            Ok(Posted { transaction, replayed: true }) => CreatorAward::Replayed { transaction },
            Err(e) => CreatorAward::Failed { reason: e.to_string() },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, CreatorAward::Failed { .. })
    }
}

/// Primary and secondary effects of a join, reported separately
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct JoinOutcome {
    pub participant: ChainParticipant,
    pub participant_created: bool,
    pub chain_length: i64,
    pub joiner_award: Posted,
    pub creator_award: CreatorAward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../bindings/")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn status(self) -> &'static str {
        match self {
            Decision::Approve => claim_statuses::APPROVED,
            Decision::Reject => claim_statuses::REJECTED,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveInput {
    pub decision: Decision,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct ResolveOutcome {
    pub claim: TargetClaim,
    pub request_status: String,
    /// `chain_reward` entries for the request (empty on rejection)
    pub payouts: Vec<CreditTransaction>,
    /// The claim was already resolved this way; nothing new happened
    pub replayed: bool,
}

/// Award amounts and split policy
#[derive(Debug, Clone, Copy)]
pub struct ChainSettings {
    pub join_chain_credits: i64,
    pub others_joined_credits: i64,
    pub remainder_policy: RemainderPolicy,
}

impl From<&Config> for ChainSettings {
    fn from(config: &Config) -> Self {
        Self {
            join_chain_credits: config.join_chain_credits,
            others_joined_credits: config.others_joined_credits,
            remainder_policy: config.remainder_policy,
        }
    }
}

impl Default for ChainSettings {
    fn default() -> Self {
        ChainSettings::from(&Config::default())
    }
}

pub fn join_key(request_id: &str, user_id: &str) -> String {
    format!("join_chain:{}:{}", request_id, user_id)
}

pub fn others_joined_key(request_id: &str, joiner_id: &str) -> String {
    format!("others_joined:{}:{}", request_id, joiner_id)
}

fn chain_state(request: &ConnectionRequest, pending: Option<&TargetClaim>) -> ChainState {
    if request.status == request_statuses::COMPLETED {
        ChainState::Completed
    } else if pending.is_some() {
        ChainState::ClaimPending
    } else {
        ChainState::Active
    }
}

fn require_caller(caller_id: &str) -> LedgerResult<()> {
    if caller_id.trim().is_empty() {
        return Err(LedgerError::Unauthorized("caller identity is required".into()));
    }
    Ok(())
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

// ============================================================================
// Service
// ============================================================================

pub struct ChainService {
    db: Arc<LedgerDb>,
    events: Arc<EventBus>,
    locks: ChainLocks,
    settings: ChainSettings,
}

impl ChainService {
    pub fn new(db: Arc<LedgerDb>, events: Arc<EventBus>, settings: ChainSettings) -> Self {
        Self {
            db,
            events,
            locks: ChainLocks::new(),
            settings,
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Create a request and seed its creator as the first participant
    pub fn create_request(&self, creator_id: &str, input: &CreateRequestInput) -> LedgerResult<ConnectionRequest> {
        require_caller(creator_id)?;
        if input.target.trim().is_empty() {
            return Err(LedgerError::Validation("target is required".into()));
        }
        if input.reward < 0 {
            return Err(LedgerError::Validation(format!("reward must not be negative, got {}", input.reward)));
        }

        let request = self.db.with_write_tx(|conn| {
            let request = connection_requests::create_request(conn, creator_id, input)?;
            chain_participants::insert_if_absent(conn, &request.chain_id, &request.id, creator_id)?;
            Ok(request)
        })?;

        info!(request_id = %request.id, creator_id, reward = request.reward, "Connection request created");
        self.events.emit(LedgerEvent::RequestCreated {
            request_id: request.id.clone(),
            chain_id: request.chain_id.clone(),
            creator_id: request.creator_id.clone(),
            reward: request.reward,
        });
        Ok(request)
    }

    /// Request with chain state, participants and like count
    pub fn get_request(&self, request_id: &str) -> LedgerResult<RequestView> {
        self.db.with_conn(|conn| {
            let request = connection_requests::require_request(conn, request_id)?;
            let pending = target_claims::pending_for_request(conn, request_id)?;
            let participants = chain_participants::list_participants(conn, &request.chain_id)?;
            let like_count = chain_likes::like_count(conn, &request.chain_id)?;

            Ok(RequestView {
                state: chain_state(&request, pending.as_ref()),
                chain_length: participants.len() as i64,
                participants,
                like_count,
                pending_claim_id: pending.map(|c| c.id),
                request,
            })
        })
    }

    // =========================================================================
    // Joins
    // =========================================================================

    /// Join a chain
    ///
    /// The participant insert and the joiner's `join_chain` award commit
    /// together. The creator's `others_joined` award runs in its own
    /// transaction afterwards; if it fails the join still stands, and the
    /// failure is reported in the outcome and on the event bus. Calling again
    /// retries it without double-crediting.
    pub fn join_chain(
        &self,
        joiner_id: &str,
        joiner_name: Option<&str>,
        input: &JoinInput,
    ) -> LedgerResult<JoinOutcome> {
        require_caller(joiner_id)?;
        if input.request_id.trim().is_empty() {
            return Err(LedgerError::Validation("request_id is required".into()));
        }

        self.locks.with_lock(&input.request_id, || -> LedgerResult<JoinOutcome> {
            let (request, participant, participant_created, chain_length, joiner_award) =
                self.db.with_write_tx(|conn| {
                    let request = connection_requests::require_request(conn, &input.request_id)?;
                    if input.chain_id.as_ref().is_some_and(|c| c != &request.chain_id) {
                        return Err(LedgerError::Validation("chain_id does not match request".into()));
                    }
                    if input.creator_id.as_ref().is_some_and(|c| c != &request.creator_id) {
                        return Err(LedgerError::Validation("creator_id does not match request".into()));
                    }

                    let key = join_key(&request.id, joiner_id);
                    if request.status == request_statuses::COMPLETED {
                        let already_joined = chain_participants::get_participant(conn, &request.chain_id, joiner_id)?
                            .is_some()
                            && credit_transactions::find_by_idempotency_key(conn, &key)?.is_some();
                        if !already_joined {
                            return Err(LedgerError::Conflict(format!("Chain for request {} is completed", request.id)));
                        }
                    }

                    let (participant, created) =
                        chain_participants::insert_if_absent(conn, &request.chain_id, &request.id, joiner_id)?;
                    let joiner_award = award_in_tx(
                        conn,
                        joiner_id,
                        &CreditInput {
                            amount: self.settings.join_chain_credits,
                            source: credit_sources::JOIN_CHAIN.to_string(),
                            description: format!("Joined the chain to reach {}", request.target),
                            chain_id: Some(request.chain_id.clone()),
                            request_id: Some(request.id.clone()),
                            related_user_id: Some(request.creator_id.clone()),
                            idempotency_key: Some(key),
                        },
                    )?;
                    let chain_length = chain_participants::chain_length(conn, &request.chain_id)?;
                    Ok((request, participant, created, chain_length, joiner_award))
                })?;

            if participant_created {
                info!(request_id = %request.id, joiner_id, position = participant.position, "Participant joined");
                self.events.emit(LedgerEvent::ParticipantJoined {
                    request_id: request.id.clone(),
                    chain_id: request.chain_id.clone(),
                    user_id: joiner_id.to_string(),
                    position: participant.position,
                });
            } else {
                debug!(request_id = %request.id, joiner_id, "Join repeated");
            }
            announce(&self.events, &joiner_award);

            let creator_award = if joiner_id == request.creator_id {
                CreatorAward::Skipped
            } else {
                self.award_creator(&request, joiner_id, joiner_name)
            };

            Ok(JoinOutcome {
                participant,
                participant_created,
                chain_length,
                joiner_award,
                creator_award,
            })
        })
    }

    fn award_creator(&self, request: &ConnectionRequest, joiner_id: &str, joiner_name: Option<&str>) -> CreatorAward {
        let name = joiner_name.filter(|n| !n.trim().is_empty()).unwrap_or(joiner_id);
        let input = CreditInput {
            amount: self.settings.others_joined_credits,
            source: credit_sources::OTHERS_JOINED.to_string(),
            description: format!("{} joined your chain", name),
            chain_id: Some(request.chain_id.clone()),
            request_id: Some(request.id.clone()),
            related_user_id: Some(joiner_id.to_string()),
            idempotency_key: Some(others_joined_key(&request.id, joiner_id)),
        };

        let result = self
            .db
            .with_write_tx(|conn| award_in_tx(conn, &request.creator_id, &input));
        if let Ok(posted) = &result {
            announce(&self.events, posted);
        }

        let award = CreatorAward::from_result(result);
        if let CreatorAward::Failed { reason } = &award {
            warn!(
                request_id = %request.id,
                creator_id = %request.creator_id,
                joiner_id,
                reason = %reason,
                "Creator award failed; join kept"
            );
            self.events.emit(LedgerEvent::SecondaryAwardFailed {
                request_id: request.id.clone(),
                user_id: request.creator_id.clone(),
                source: credit_sources::OTHERS_JOINED.to_string(),
                reason: reason.clone(),
            });
        }
        award
    }

    // =========================================================================
    // Claims
    // =========================================================================

    /// Claim to be the target. Fails with `Conflict` while another claim is pending.
    pub fn submit_claim(&self, claimant_id: &str, request_id: &str, details: &ClaimDetails) -> LedgerResult<TargetClaim> {
        require_caller(claimant_id)?;
        if details.contact_name.trim().is_empty() {
            return Err(LedgerError::Validation("contact_name is required".into()));
        }
        if blank(&details.contact_email) && blank(&details.contact_phone) {
            return Err(LedgerError::Validation("contact_email or contact_phone is required".into()));
        }
        if details.contact_email.as_deref().is_some_and(|e| !e.trim().is_empty() && !e.contains('@')) {
            return Err(LedgerError::Validation("contact_email is not an email address".into()));
        }

        let claim = self.locks.with_lock(request_id, || {
            self.db.with_write_tx(|conn| {
                let request = connection_requests::require_request(conn, request_id)?;
                if request.status != request_statuses::ACTIVE {
                    return Err(LedgerError::Conflict(format!("Request {} is completed", request_id)));
                }
                if request.creator_id == claimant_id {
                    return Err(LedgerError::Validation("The creator cannot claim their own request".into()));
                }
                if target_claims::pending_for_request(conn, request_id)?.is_some() {
                    return Err(LedgerError::Conflict(format!("Request {} already has a pending claim", request_id)));
                }
                target_claims::create_claim(conn, request_id, claimant_id, details)
            })
        })?;

        info!(claim_id = %claim.id, request_id, claimant_id, "Target claim submitted");
        self.events.emit(LedgerEvent::ClaimSubmitted {
            claim_id: claim.id.clone(),
            request_id: request_id.to_string(),
            claimant_id: claimant_id.to_string(),
        });
        Ok(claim)
    }

    /// Approve or reject a pending claim (request creator only)
    ///
    /// Approval transitions the claim and the request and posts the payout in
    /// one transaction. Repeating the same decision returns the stored outcome
    /// flagged `replayed`; the opposite decision is a `Conflict`.
    pub fn resolve_claim(&self, caller_id: &str, claim_id: &str, input: &ResolveInput) -> LedgerResult<ResolveOutcome> {
        require_caller(caller_id)?;
        let request_id = self
            .db
            .with_conn(|conn| target_claims::require_claim(conn, claim_id))?
            .request_id;

        let outcome = self.locks.with_lock(&request_id, || {
            self.db.with_write_tx(|conn| {
                let claim = target_claims::require_claim(conn, claim_id)?;
                let request = connection_requests::require_request(conn, &claim.request_id)?;
                if request.creator_id != caller_id {
                    return Err(LedgerError::Forbidden("Only the request creator can resolve claims".into()));
                }

                if claim.status != claim_statuses::PENDING {
                    if claim.status != input.decision.status() {
                        return Err(LedgerError::Conflict(format!("Claim {} is already {}", claim.id, claim.status)));
                    }
                    let payouts = match input.decision {
                        Decision::Approve => {
                            credit_transactions::list_for_request(conn, &request.id, credit_sources::CHAIN_REWARD)?
                        }
                        Decision::Reject => Vec::new(),
                    };
                    return Ok(ResolveOutcome {
                        claim,
                        request_status: request.status,
                        payouts,
                        replayed: true,
                    });
                }

                match input.decision {
                    Decision::Approve => {
                        let claim = target_claims::resolve_pending(conn, &claim.id, claim_statuses::APPROVED, None)?;
                        connection_requests::mark_completed(conn, &request.id)?;
                        let payouts = distribute_in_tx(conn, &request, self.settings.remainder_policy)?;
                        Ok(ResolveOutcome {
                            claim,
                            request_status: request_statuses::COMPLETED.to_string(),
                            payouts: payouts.into_iter().map(|p| p.transaction).collect(),
                            replayed: false,
                        })
                    }
                    Decision::Reject => {
                        let reason = input.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
                        let claim = target_claims::resolve_pending(conn, &claim.id, claim_statuses::REJECTED, reason)?;
                        Ok(ResolveOutcome {
                            claim,
                            request_status: request.status,
                            payouts: Vec::new(),
                            replayed: false,
                        })
                    }
                }
            })
        })?;

        if outcome.replayed {
            debug!(claim_id, "Claim resolution replayed");
            return Ok(outcome);
        }

        match input.decision {
            Decision::Approve => {
                let total: i64 = outcome.payouts.iter().map(|t| t.amount).sum();
                info!(claim_id, request_id = %request_id, total, recipients = outcome.payouts.len(), "Claim approved");
                self.events.emit(LedgerEvent::ClaimApproved {
                    claim_id: claim_id.to_string(),
                    request_id: request_id.clone(),
                });
                for transaction in &outcome.payouts {
                    announce(&self.events, &Posted { transaction: transaction.clone(), replayed: false });
                }
                self.events.emit(LedgerEvent::RewardDistributed {
                    request_id,
                    total,
                    recipients: outcome.payouts.len(),
                });
            }
            Decision::Reject => {
                info!(claim_id, request_id = %request_id, "Claim rejected");
                self.events.emit(LedgerEvent::ClaimRejected {
                    claim_id: claim_id.to_string(),
                    request_id,
                });
            }
        }
        Ok(outcome)
    }

    /// Claim history for a request, newest first
    ///
    /// The creator sees every claim; anyone else sees only their own.
    pub fn list_claims(&self, caller_id: &str, request_id: &str) -> LedgerResult<Vec<TargetClaim>> {
        require_caller(caller_id)?;
        self.db.with_conn(|conn| {
            let request = connection_requests::require_request(conn, request_id)?;
            let claims = target_claims::list_for_request(conn, request_id)?;
            if request.creator_id == caller_id {
                Ok(claims)
            } else {
                Ok(claims.into_iter().filter(|c| c.claimant_id == caller_id).collect())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::credit_balances;

    fn service() -> ChainService {
        let db = Arc::new(LedgerDb::open_in_memory().unwrap());
        ChainService::new(db, Arc::new(EventBus::new()), ChainSettings::default())
    }

    fn balance(svc: &ChainService, user_id: &str) -> i64 {
        svc.db
            .with_conn(|conn| credit_balances::get_or_create_balance(conn, user_id))
            .unwrap()
            .total_credits
    }

    fn new_request(svc: &ChainService, creator: &str, reward: i64) -> ConnectionRequest {
        svc.create_request(
            creator,
            &CreateRequestInput {
                target: "A product designer at Acme".into(),
                reward,
                message: Some("Looking for an intro".into()),
            },
        )
        .unwrap()
    }

    fn join(request_id: &str) -> JoinInput {
        JoinInput {
            request_id: request_id.to_string(),
            ..Default::default()
        }
    }

    fn details() -> ClaimDetails {
        ClaimDetails {
            contact_name: "Dana".into(),
            contact_phone: Some("+1 555 0100".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_creator_is_first_participant() {
        let svc = service();
        let request = new_request(&svc, "alice", 90);

        let view = svc.get_request(&request.id).unwrap();
        assert_eq!(view.state, ChainState::Active);
        assert_eq!(view.chain_length, 1);
        assert_eq!(view.participants[0].user_id, "alice");
        assert_eq!(view.participants[0].position, 1);
    }

    #[test]
    fn test_create_request_validation() {
        let svc = service();
        let blank_target = CreateRequestInput { target: " ".into(), reward: 1, message: None };
        assert!(matches!(svc.create_request("alice", &blank_target), Err(LedgerError::Validation(_))));
        let negative = CreateRequestInput { target: "x".into(), reward: -1, message: None };
        assert!(matches!(svc.create_request("alice", &negative), Err(LedgerError::Validation(_))));
    }

    #[test]
    fn test_join_awards_joiner_and_creator() {
        let svc = service();
        let request = new_request(&svc, "bob", 0);

        let outcome = svc.join_chain("alice", Some("Alice"), &join(&request.id)).unwrap();
        assert!(outcome.participant_created);
        assert_eq!(outcome.chain_length, 2);
        assert_eq!(outcome.joiner_award.transaction.amount, 2);
        match &outcome.creator_award {
            CreatorAward::Posted { transaction } => {
                assert_eq!(transaction.user_id, "bob");
                assert_eq!(transaction.amount, 3);
                assert!(transaction.description.contains("Alice"));
            }
            other => panic!("unexpected creator award: {other:?}"),
        }
        assert_eq!(balance(&svc, "alice"), 2);
        assert_eq!(balance(&svc, "bob"), 3);
    }

    #[test]
    fn test_self_join_awards_once() {
        let svc = service();
        let request = new_request(&svc, "bob", 0);

        let outcome = svc.join_chain("bob", None, &join(&request.id)).unwrap();
        assert!(!outcome.participant_created);
        assert!(matches!(outcome.creator_award, CreatorAward::Skipped));
        assert_eq!(balance(&svc, "bob"), 2);

        svc.join_chain("bob", None, &join(&request.id)).unwrap();
        assert_eq!(balance(&svc, "bob"), 2);
    }

    #[test]
    fn test_rejoin_is_idempotent() {
        let svc = service();
        let request = new_request(&svc, "bob", 0);

        svc.join_chain("alice", None, &join(&request.id)).unwrap();
        let again = svc.join_chain("alice", None, &join(&request.id)).unwrap();
        assert!(!again.participant_created);
        assert!(again.joiner_award.replayed);
        assert!(matches!(again.creator_award, CreatorAward::Replayed { .. }));
        assert_eq!(again.chain_length, 2);
        assert_eq!(balance(&svc, "alice"), 2);
        assert_eq!(balance(&svc, "bob"), 3);
    }

    #[test]
    fn test_join_body_must_match_request() {
        let svc = service();
        let request = new_request(&svc, "bob", 0);
        let input = JoinInput {
            creator_id: Some("mallory".into()),
            ..join(&request.id)
        };
        assert!(matches!(svc.join_chain("alice", None, &input), Err(LedgerError::Validation(_))));
        assert!(matches!(svc.join_chain("alice", None, &join("missing")), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_claim_flow_and_reward() {
        let svc = service();
        let request = new_request(&svc, "alice", 90);
        svc.join_chain("bob", None, &join(&request.id)).unwrap();
        svc.join_chain("carol", None, &join(&request.id)).unwrap();

        let claim = svc.submit_claim("dana", &request.id, &details()).unwrap();
        assert_eq!(svc.get_request(&request.id).unwrap().state, ChainState::ClaimPending);

        let outcome = svc
            .resolve_claim("alice", &claim.id, &ResolveInput { decision: Decision::Approve, reason: None })
            .unwrap();
        assert_eq!(outcome.claim.status, claim_statuses::APPROVED);
        assert_eq!(outcome.request_status, request_statuses::COMPLETED);
        assert_eq!(outcome.payouts.iter().map(|t| t.amount).collect::<Vec<_>>(), vec![30, 30, 30]);

        assert_eq!(balance(&svc, "alice"), 30 + 3 + 3);
        assert_eq!(balance(&svc, "bob"), 32);
        assert_eq!(balance(&svc, "carol"), 32);
        assert_eq!(svc.get_request(&request.id).unwrap().state, ChainState::Completed);
    }

    #[test]
    fn test_resolution_replay_and_conflict() {
        let svc = service();
        let request = new_request(&svc, "alice", 10);
        let claim = svc.submit_claim("dana", &request.id, &details()).unwrap();
        let approve = ResolveInput { decision: Decision::Approve, reason: None };

        svc.resolve_claim("alice", &claim.id, &approve).unwrap();
        let replay = svc.resolve_claim("alice", &claim.id, &approve).unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.payouts.len(), 1);
        assert_eq!(balance(&svc, "alice"), 10);

        let reject = ResolveInput { decision: Decision::Reject, reason: None };
        assert!(matches!(svc.resolve_claim("alice", &claim.id, &reject), Err(LedgerError::Conflict(_))));
    }

    #[test]
    fn test_only_creator_resolves() {
        let svc = service();
        let request = new_request(&svc, "alice", 10);
        let claim = svc.submit_claim("dana", &request.id, &details()).unwrap();

        let err = svc
            .resolve_claim("dana", &claim.id, &ResolveInput { decision: Decision::Approve, reason: None })
            .unwrap_err();
        assert!(matches!(err, LedgerError::Forbidden(_)));
        assert_eq!(svc.get_request(&request.id).unwrap().state, ChainState::ClaimPending);
    }

    #[test]
    fn test_reject_reopens_chain() {
        let svc = service();
        let request = new_request(&svc, "alice", 10);
        let claim = svc.submit_claim("dana", &request.id, &details()).unwrap();

        let outcome = svc
            .resolve_claim(
                "alice",
                &claim.id,
                &ResolveInput { decision: Decision::Reject, reason: Some("Not the right person".into()) },
            )
            .unwrap();
        assert_eq!(outcome.claim.rejection_reason.as_deref(), Some("Not the right person"));
        assert_eq!(outcome.request_status, request_statuses::ACTIVE);
        assert!(outcome.payouts.is_empty());

        assert_eq!(svc.get_request(&request.id).unwrap().state, ChainState::Active);
        svc.submit_claim("erin", &request.id, &details()).unwrap();
        assert_eq!(svc.list_claims("alice", &request.id).unwrap().len(), 2);
        assert_eq!(svc.list_claims("erin", &request.id).unwrap().len(), 1);
    }

    #[test]
    fn test_claim_rules() {
        let svc = service();
        let request = new_request(&svc, "alice", 10);

        assert!(matches!(
            svc.submit_claim("alice", &request.id, &details()),
            Err(LedgerError::Validation(_))
        ));
        let no_contact = ClaimDetails { contact_name: "Dana".into(), ..Default::default() };
        assert!(matches!(
            svc.submit_claim("dana", &request.id, &no_contact),
            Err(LedgerError::Validation(_))
        ));

        svc.submit_claim("dana", &request.id, &details()).unwrap();
        assert!(matches!(
            svc.submit_claim("erin", &request.id, &details()),
            Err(LedgerError::Conflict(_))
        ));
    }

    #[test]
    fn test_completed_chain_rejects_new_joins() {
        let svc = service();
        let request = new_request(&svc, "alice", 10);
        svc.join_chain("bob", None, &join(&request.id)).unwrap();
        let claim = svc.submit_claim("dana", &request.id, &details()).unwrap();
        svc.resolve_claim("alice", &claim.id, &ResolveInput { decision: Decision::Approve, reason: None })
            .unwrap();

        assert!(matches!(svc.join_chain("zed", None, &join(&request.id)), Err(LedgerError::Conflict(_))));
        let retry = svc.join_chain("bob", None, &join(&request.id)).unwrap();
        assert!(retry.joiner_award.replayed);
    }
}

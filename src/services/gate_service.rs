//! Unlock and like gate
//!
//! An unlock is a one-time spend: the `unlock_chain` entry and the
//! `unlocked_chains` row commit together or not at all. Likes are a
//! free toggle with no ledger effect.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use ts_rs::TS;

use crate::db::connection_requests;
use crate::db::models::credit_sources;
use crate::db::{chain_likes, unlocked_chains};
use crate::db::{ConnectionRequest, CreditTransaction, LedgerDb, UnlockedChain};
use crate::error::{LedgerError, LedgerResult};

use super::events::{EventBus, LedgerEvent};
use super::ledger_service::{announce, spend_in_tx, CreditInput};

#[derive(Debug, Clone, Deserialize)]
pub struct UnlockInput {
    pub request_id: String,
    #[serde(default)]
    pub chain_id: Option<String>,
    pub credits_cost: i64,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct UnlockOutcome {
    pub unlock: UnlockedChain,
    pub transaction: CreditTransaction,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LikeInput {
    pub request_id: String,
    #[serde(default)]
    pub chain_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct LikeOutcome {
    pub liked: bool,
    pub like_count: i64,
}

/// What a caller can see of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct AccessView {
    pub unlocked: bool,
    pub liked: bool,
}

pub fn unlock_key(chain_id: &str, user_id: &str) -> String {
    format!("unlock_chain:{}:{}", chain_id, user_id)
}

fn check_chain(request: &ConnectionRequest, chain_id: Option<&str>) -> LedgerResult<()> {
    match chain_id {
        Some(id) if id != request.chain_id => Err(LedgerError::Validation("chain_id does not match request".into())),
        _ => Ok(()),
    }
}

pub struct GateService {
    db: Arc<LedgerDb>,
    events: Arc<EventBus>,
}

impl GateService {
    pub fn new(db: Arc<LedgerDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    /// Spend `credits_cost` to unlock a chain's details
    ///
    /// A second unlock is a `Conflict` and spends nothing.
    pub fn unlock_chain(&self, user_id: &str, input: &UnlockInput) -> LedgerResult<UnlockOutcome> {
        if user_id.trim().is_empty() {
            return Err(LedgerError::Unauthorized("caller identity is required".into()));
        }
        if input.credits_cost <= 0 {
            return Err(LedgerError::Validation(format!(
                "credits_cost must be positive, got {}",
                input.credits_cost
            )));
        }

        let (outcome, posted) = self.db.with_write_tx(|conn| {
            let request = connection_requests::require_request(conn, &input.request_id)?;
            check_chain(&request, input.chain_id.as_deref())?;

            if unlocked_chains::get_unlock(conn, user_id, &request.chain_id)?.is_some() {
                return Err(LedgerError::Conflict(format!("Chain {} already unlocked", request.chain_id)));
            }

            let posted = spend_in_tx(
                conn,
                user_id,
                &CreditInput {
                    amount: input.credits_cost,
                    source: credit_sources::UNLOCK_CHAIN.to_string(),
                    description: format!("Unlocked chain details for {}", request.target),
                    chain_id: Some(request.chain_id.clone()),
                    request_id: Some(request.id.clone()),
                    related_user_id: Some(request.creator_id.clone()),
                    idempotency_key: Some(unlock_key(&request.chain_id, user_id)),
                },
            )?;
            let unlock = unlocked_chains::insert_unlock(
                conn,
                user_id,
                &request.chain_id,
                &request.id,
                input.credits_cost,
                &posted.transaction.id,
            )?;

            Ok((
                UnlockOutcome {
                    unlock,
                    transaction: posted.transaction.clone(),
                },
                posted,
            ))
        })?;

        info!(user_id, chain_id = %outcome.unlock.chain_id, cost = input.credits_cost, "Chain unlocked");
        announce(&self.events, &posted);
        self.events.emit(LedgerEvent::ChainUnlocked {
            user_id: user_id.to_string(),
            chain_id: outcome.unlock.chain_id.clone(),
            credits_spent: outcome.unlock.credits_spent,
        });
        Ok(outcome)
    }

    /// Like the chain if not liked, otherwise remove the like
    pub fn toggle_like(&self, user_id: &str, input: &LikeInput) -> LedgerResult<LikeOutcome> {
        if user_id.trim().is_empty() {
            return Err(LedgerError::Unauthorized("caller identity is required".into()));
        }

        let (chain_id, outcome) = self.db.with_write_tx(|conn| {
            let request = connection_requests::require_request(conn, &input.request_id)?;
            check_chain(&request, input.chain_id.as_deref())?;

            let liked = chain_likes::toggle(conn, user_id, &request.chain_id, &request.id)?;
            let like_count = chain_likes::like_count(conn, &request.chain_id)?;
            Ok((request.chain_id, LikeOutcome { liked, like_count }))
        })?;

        self.events.emit(LedgerEvent::LikeToggled {
            user_id: user_id.to_string(),
            chain_id,
            liked: outcome.liked,
        });
        Ok(outcome)
    }

    pub fn is_unlocked(&self, user_id: &str, request_id: &str) -> LedgerResult<bool> {
        Ok(self.access(user_id, request_id)?.unlocked)
    }

    pub fn like_count(&self, request_id: &str) -> LedgerResult<i64> {
        self.db.with_conn(|conn| {
            let request = connection_requests::require_request(conn, request_id)?;
            chain_likes::like_count(conn, &request.chain_id)
        })
    }

    /// Unlock and like state of a chain for one user
    pub fn access(&self, user_id: &str, request_id: &str) -> LedgerResult<AccessView> {
        self.db.with_conn(|conn| {
            let request = connection_requests::require_request(conn, request_id)?;
            Ok(AccessView {
                unlocked: unlocked_chains::get_unlock(conn, user_id, &request.chain_id)?.is_some(),
                liked: chain_likes::has_liked(conn, user_id, &request.chain_id)?,
            })
        })
    }
}

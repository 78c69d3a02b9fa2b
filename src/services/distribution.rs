//! Reward distribution
//!
//! [`split_reward`] is pure: it decides who gets what. [`distribute_in_tx`]
//! posts one keyed `chain_reward` entry per non-zero share inside the caller's
//! transaction, so the payout commits or rolls back with the claim approval.

use diesel::SqliteConnection;
use serde::Serialize;
use ts_rs::TS;

use crate::config::RemainderPolicy;
use crate::db::chain_participants;
use crate::db::models::credit_sources;
use crate::db::ConnectionRequest;
use crate::error::{LedgerError, LedgerResult};

use super::ledger_service::{award_in_tx, CreditInput, Posted};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export, export_to = "../bindings/")]
pub struct Share {
    pub user_id: String,
    pub amount: i64,
}

/// Split `reward` over `participants` (in join order)
///
/// Every participant gets `reward / n`; the remainder goes to one recipient
/// chosen by `policy`. Zero shares are dropped, so the result sums to
/// `reward` exactly.
pub fn split_reward(
    reward: i64,
    participants: &[String],
    creator_id: &str,
    policy: RemainderPolicy,
) -> LedgerResult<Vec<Share>> {
    if reward < 0 {
        return Err(LedgerError::Validation(format!("reward must not be negative, got {}", reward)));
    }
    if participants.is_empty() {
        return Err(LedgerError::Internal("cannot split a reward over an empty chain".into()));
    }

    let n = participants.len() as i64;
    let base = reward / n;
    let remainder = reward % n;

    let creator_index = participants.iter().position(|p| p == creator_id);
    let remainder_index = match policy {
        RemainderPolicy::Creator => creator_index.unwrap_or(0),
        RemainderPolicy::EarliestJoiner => participants
            .iter()
            .position(|p| p != creator_id)
            .or(creator_index)
            .unwrap_or(0),
    };

    Ok(participants
        .iter()
        .enumerate()
        .map(|(i, user_id)| Share {
            user_id: user_id.clone(),
            amount: if i == remainder_index { base + remainder } else { base },
        })
        .filter(|share| share.amount > 0)
        .collect())
}

pub fn reward_key(request_id: &str, user_id: &str) -> String {
    format!("chain_reward:{}:{}", request_id, user_id)
}

/// Pay the request's reward pool to its participants
pub fn distribute_in_tx(
    conn: &mut SqliteConnection,
    request: &ConnectionRequest,
    policy: RemainderPolicy,
) -> LedgerResult<Vec<Posted>> {
    let participants: Vec<String> = chain_participants::list_participants(conn, &request.chain_id)?
        .into_iter()
        .map(|p| p.user_id)
        .collect();

    let shares = split_reward(request.reward, &participants, &request.creator_id, policy)?;

    shares
        .iter()
        .map(|share| {
            award_in_tx(
                conn,
                &share.user_id,
                &CreditInput {
                    amount: share.amount,
                    source: credit_sources::CHAIN_REWARD.to_string(),
                    description: format!("Reward share for reaching {}", request.target),
                    chain_id: Some(request.chain_id.clone()),
                    request_id: Some(request.id.clone()),
                    related_user_id: Some(request.creator_id.clone()),
                    idempotency_key: Some(reward_key(&request.id, &share.user_id)),
                },
            )
        })
        .collect()
}

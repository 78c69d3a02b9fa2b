//! Balance projection operations
//!
//! Balances only move through single conditional UPDATE statements; there is
//! no read-modify-write in application code.

use diesel::prelude::*;

use super::diesel_schema::user_credit_balances;
use super::models::{current_timestamp, NewUserCreditBalance, UserCreditBalance};
use crate::error::LedgerError;

/// Get a user's balance row, if one was ever materialized
pub fn get_balance(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<Option<UserCreditBalance>, LedgerError> {
    user_credit_balances::table
        .filter(user_credit_balances::user_id.eq(user_id))
        .first(conn)
        .optional()
        .map_err(LedgerError::from)
}

/// Materialize a zero balance row if none exists
pub fn ensure_balance(conn: &mut SqliteConnection, user_id: &str) -> Result<(), LedgerError> {
    let now = current_timestamp();
    diesel::insert_or_ignore_into(user_credit_balances::table)
        .values(&NewUserCreditBalance {
            user_id,
            total_credits: 0,
            earned_credits: 0,
            spent_credits: 0,
            updated_at: &now,
        })
        .execute(conn)?;
    Ok(())
}

/// Get the balance, creating a zero row on first access
pub fn get_or_create_balance(
    conn: &mut SqliteConnection,
    user_id: &str,
) -> Result<UserCreditBalance, LedgerError> {
    ensure_balance(conn, user_id)?;
    get_balance(conn, user_id)?
        .ok_or_else(|| LedgerError::Internal(format!("Balance row missing for {}", user_id)))
}

/// Increment total and earned credits
///
/// Refuses (with `Validation`, changing nothing) an amount that would push
/// either counter past `i64::MAX`.
pub fn apply_earned(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
) -> Result<UserCreditBalance, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::Validation(format!("amount must be positive, got {}", amount)));
    }
    ensure_balance(conn, user_id)?;

    let headroom = i64::MAX - amount;
    let now = current_timestamp();
    let updated = diesel::update(
        user_credit_balances::table
            .filter(user_credit_balances::user_id.eq(user_id))
            .filter(user_credit_balances::total_credits.le(headroom))
            .filter(user_credit_balances::earned_credits.le(headroom)),
    )
    .set((
        user_credit_balances::total_credits.eq(user_credit_balances::total_credits + amount),
        user_credit_balances::earned_credits.eq(user_credit_balances::earned_credits + amount),
        user_credit_balances::updated_at.eq(&now),
    ))
    .execute(conn)?;

    if updated == 0 {
        return Err(LedgerError::Validation(format!(
            "Awarding {} would overflow the balance of {}",
            amount, user_id
        )));
    }
    get_or_create_balance(conn, user_id)
}

/// Decrement total and increment spent credits, only if the balance covers `amount`
///
/// Returns `InsufficientCredits` (and changes nothing) when it does not.
pub fn apply_spent(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
) -> Result<UserCreditBalance, LedgerError> {
    ensure_balance(conn, user_id)?;

    let now = current_timestamp();
    let updated = diesel::update(
        user_credit_balances::table
            .filter(user_credit_balances::user_id.eq(user_id))
            .filter(user_credit_balances::total_credits.ge(amount)),
    )
    .set((
        user_credit_balances::total_credits.eq(user_credit_balances::total_credits - amount),
        user_credit_balances::spent_credits.eq(user_credit_balances::spent_credits + amount),
        user_credit_balances::updated_at.eq(&now),
    ))
    .execute(conn)?;

    let balance = get_or_create_balance(conn, user_id)?;
    if updated == 0 {
        return Err(LedgerError::InsufficientCredits {
            available: balance.total_credits,
            required: amount,
        });
    }
    Ok(balance)
}

/// Overwrite the projection with totals replayed from the log
pub fn overwrite_balance(
    conn: &mut SqliteConnection,
    user_id: &str,
    earned: i64,
    spent: i64,
) -> Result<UserCreditBalance, LedgerError> {
    ensure_balance(conn, user_id)?;

    let now = current_timestamp();
    diesel::update(user_credit_balances::table.filter(user_credit_balances::user_id.eq(user_id)))
        .set((
            user_credit_balances::total_credits.eq(earned - spent),
            user_credit_balances::earned_credits.eq(earned),
            user_credit_balances::spent_credits.eq(spent),
            user_credit_balances::updated_at.eq(&now),
        ))
        .execute(conn)?;

    get_or_create_balance(conn, user_id)
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

    #[test]
    fn test_lazy_zero_balance() {
        let mut conn = setup_test_db();
        assert!(get_balance(&mut conn, "alice").unwrap().is_none());

        let balance = get_or_create_balance(&mut conn, "alice").unwrap();
        assert_eq!(balance.total_credits, 0);
        assert!(get_balance(&mut conn, "alice").unwrap().is_some());
    }

    #[test]
    fn test_earn_then_spend() {
        let mut conn = setup_test_db();
        apply_earned(&mut conn, "alice", 10).unwrap();
        let balance = apply_spent(&mut conn, "alice", 4).unwrap();

        assert_eq!(balance.total_credits, 6);
        assert_eq!(balance.earned_credits, 10);
        assert_eq!(balance.spent_credits, 4);
    }

    #[test]
    fn test_overspend_changes_nothing() {
        let mut conn = setup_test_db();
        apply_earned(&mut conn, "alice", 5).unwrap();

        let err = apply_spent(&mut conn, "alice", 10).unwrap_err();
        match err {
            LedgerError::InsufficientCredits { available, required } => {
                assert_eq!(available, 5);
                assert_eq!(required, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let balance = get_balance(&mut conn, "alice").unwrap().unwrap();
        assert_eq!(balance.total_credits, 5);
        assert_eq!(balance.spent_credits, 0);
    }

    #[test]
    fn test_earn_past_i64_max_is_refused() {
        let mut conn = setup_test_db();
        apply_earned(&mut conn, "alice", i64::MAX).unwrap();

        let err = apply_earned(&mut conn, "alice", 1).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let balance = get_balance(&mut conn, "alice").unwrap().unwrap();
        assert_eq!(balance.total_credits, i64::MAX);
        assert_eq!(balance.earned_credits, i64::MAX);
    }

    #[test]
    fn test_spend_exact_balance() {
        let mut conn = setup_test_db();
        apply_earned(&mut conn, "alice", 7).unwrap();
        let balance = apply_spent(&mut conn, "alice", 7).unwrap();
        assert_eq!(balance.total_credits, 0);
    }
}

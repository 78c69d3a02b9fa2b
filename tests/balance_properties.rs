//! Property tests: arbitrary earn/spend sequences never drive a balance negative

use std::sync::Arc;

use chain_ledger::services::{CreditInput, EventBus, LedgerService};
use chain_ledger::{LedgerDb, LedgerError};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Earn(i64),
    Spend(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..50).prop_map(Op::Earn),
        (1i64..80).prop_map(Op::Spend),
    ]
}

fn input(amount: i64, source: &str) -> CreditInput {
    CreditInput {
        amount,
        source: source.to_string(),
        description: "generated".to_string(),
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn balance_tracks_model_and_stays_non_negative(ops in prop::collection::vec(op(), 1..40)) {
        let db = Arc::new(LedgerDb::open_in_memory().unwrap());
        let ledger = LedgerService::new(db, Arc::new(EventBus::new()), 100);
        let mut model = 0i64;

        for op in ops {
            match op {
                Op::Earn(amount) => {
                    ledger.award_credits("user", &input(amount, "bonus")).unwrap();
                    model += amount;
                }
                Op::Spend(amount) => match ledger.spend_credits("user", &input(amount, "unlock_chain")) {
                    Ok(_) => {
                        prop_assert!(model >= amount);
                        model -= amount;
                    }
                    Err(LedgerError::InsufficientCredits { available, required }) => {
                        prop_assert!(model < amount);
                        prop_assert_eq!(available, model);
                        prop_assert_eq!(required, amount);
                    }
                    Err(other) => prop_assert!(false, "unexpected error: {}", other),
                },
            }

            let balance = ledger.get_balance("user").unwrap();
            prop_assert!(balance.total_credits >= 0);
            prop_assert_eq!(balance.total_credits, model);
            prop_assert_eq!(balance.total_credits, balance.earned_credits - balance.spent_credits);
        }

        let report = ledger.reconcile_balance("user").unwrap();
        prop_assert!(!report.repaired);
    }
}

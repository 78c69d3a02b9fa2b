//! Service layer for chain-ledger
//!
//! Services sit between the HTTP handlers and the repositories. Each one
//! validates input, owns the transaction boundary for its operations, and
//! emits events after commit.
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (validation, transactions, events)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod response;
pub mod events;
pub mod locks;
pub mod ledger_service;
pub mod distribution;
pub mod chain_service;
pub mod gate_service;

// Re-exports
pub use events::{spawn_logging_listener, EventBus, EventListener, LedgerEvent};
pub use ledger_service::{CreditInput, LedgerService, Posted, ReconcileReport};
pub use distribution::{split_reward, Share};
pub use chain_service::{
    ChainService, ChainSettings, ChainState, CreatorAward, Decision, JoinInput, JoinOutcome, RequestView,
    ResolveInput, ResolveOutcome,
};
pub use gate_service::{AccessView, GateService, LikeInput, LikeOutcome, UnlockInput, UnlockOutcome};

use std::sync::Arc;

use crate::config::Config;
use crate::db::LedgerDb;

/// Service container shared by the HTTP handlers
pub struct Services {
    pub db: Arc<LedgerDb>,
    pub ledger: Arc<LedgerService>,
    pub chains: Arc<ChainService>,
    pub gate: Arc<GateService>,
    pub events: Arc<EventBus>,
}

impl Services {
    pub fn new(db: Arc<LedgerDb>, config: &Config) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            ledger: Arc::new(LedgerService::new(db.clone(), events.clone(), config.max_page_size)),
            chains: Arc::new(ChainService::new(db.clone(), events.clone(), ChainSettings::from(config))),
            gate: Arc::new(GateService::new(db.clone(), events.clone())),
            db,
            events,
        }
    }
}

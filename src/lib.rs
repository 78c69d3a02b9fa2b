//! Chain Ledger - credit ledger and referral chain state machine
//!
//! A creator posts a connection request with a reward pool. Other users join
//! the chain and earn credits for it; someone claims to be the target; the
//! creator approves and the pool is split over every participant.
//!
//! ## Guarantees
//!
//! - The transaction log is append-only and balances never go negative
//! - Each participant's reward share is posted once, with the claim approval
//! - Join, unlock and award retries are idempotent
//! - Two resolutions of one claim never both apply
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/chain-ledger/
//! ├── ledger.db              # SQLite (WAL) - log, balances, chains, claims, gates
//! └── config.toml            # Configuration
//! ```

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod services;

pub use config::{Config, RemainderPolicy};
pub use db::LedgerDb;
pub use error::{LedgerError, LedgerResult};
pub use http::HttpServer;
pub use services::Services;

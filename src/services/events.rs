//! Ledger event bus
//!
//! Every committed state change is broadcast after its transaction commits.
//! Listeners use it for audit logging and for picking up secondary awards
//! that need reconciliation.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Events emitted by services after commit
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    // Ledger events
    CreditsAwarded {
        transaction_id: String,
        user_id: String,
        amount: i64,
        source: String,
    },
    CreditsSpent {
        transaction_id: String,
        user_id: String,
        amount: i64,
        source: String,
    },
    BalanceReconciled {
        user_id: String,
        expected: i64,
        stored: i64,
        repaired: bool,
    },

    // Chain events
    RequestCreated {
        request_id: String,
        chain_id: String,
        creator_id: String,
        reward: i64,
    },
    ParticipantJoined {
        request_id: String,
        chain_id: String,
        user_id: String,
        position: i64,
    },
    SecondaryAwardFailed {
        request_id: String,
        user_id: String,
        source: String,
        reason: String,
    },
    ClaimSubmitted {
        claim_id: String,
        request_id: String,
        claimant_id: String,
    },
    ClaimApproved {
        claim_id: String,
        request_id: String,
    },
    ClaimRejected {
        claim_id: String,
        request_id: String,
    },
    RewardDistributed {
        request_id: String,
        total: i64,
        recipients: usize,
    },

    // Gate events
    ChainUnlocked {
        user_id: String,
        chain_id: String,
        credits_spent: i64,
    },
    LikeToggled {
        user_id: String,
        chain_id: String,
        liked: bool,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &LedgerEvent);
}

/// Event bus for broadcasting ledger events
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: LedgerEvent) {
        trace!(event = ?event, "Emitting ledger event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &LedgerEvent) {
        match event {
            LedgerEvent::CreditsAwarded { user_id, amount, source, .. } => {
                debug!(user_id = %user_id, amount, source = %source, "Credits awarded");
            }
            LedgerEvent::CreditsSpent { user_id, amount, source, .. } => {
                debug!(user_id = %user_id, amount, source = %source, "Credits spent");
            }
            LedgerEvent::SecondaryAwardFailed { request_id, user_id, source, reason } => {
                warn!(
                    request_id = %request_id,
                    user_id = %user_id,
                    source = %source,
                    reason = %reason,
                    "Secondary award failed; retry the join to repost"
                );
            }
            LedgerEvent::RewardDistributed { request_id, total, recipients } => {
                info!(request_id = %request_id, total, recipients, "Reward distributed");
            }
            LedgerEvent::BalanceReconciled { user_id, expected, stored, repaired: true } => {
                warn!(user_id = %user_id, expected, stored, "Balance projection repaired");
            }
            _ => {
                trace!(event = ?event, "Ledger event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(LedgerEvent::ClaimApproved {
            claim_id: "claim-1".into(),
            request_id: "req-1".into(),
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            LedgerEvent::ClaimApproved { claim_id, request_id } => {
                assert_eq!(claim_id, "claim-1");
                assert_eq!(request_id, "req-1");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit(LedgerEvent::LikeToggled {
            user_id: "u".into(),
            chain_id: "c".into(),
            liked: true,
        });
    }
}

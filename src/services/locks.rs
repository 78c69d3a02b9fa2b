//! Per-request lock table
//!
//! Chain operations (join, claim, resolve) on the same request run one at a
//! time inside this process. Across processes the IMMEDIATE write transaction
//! still serializes them; this keeps same-request writers from spinning on
//! SQLITE_BUSY.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;

#[derive(Default)]
pub struct ChainLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `request_id`
    pub fn with_lock<T>(&self, request_id: &str, f: impl FnOnce() -> T) -> T {
        let lock = self
            .locks
            .entry(request_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            // A panicking holder leaves no state behind the mutex
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };

        drop(lock);
        self.locks.remove_if(request_id, |_, l| Arc::strong_count(l) == 1);
        result
    }

    /// True when no request holds a live lock entry
    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

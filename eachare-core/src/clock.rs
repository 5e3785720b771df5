//! Lamport-style logical clock. One instance per process, shared by every
//! outbound and inbound message.

use std::sync::{Mutex, PoisonError};

/// Scalar logical clock guarded by a single lock. Never decreases.
#[derive(Debug, Default)]
pub struct LogicalClock {
    value: Mutex<u64>,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance before sending. Returns the new value.
    pub fn tick(&self) -> u64 {
        let mut value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        *value = value.saturating_add(1);
        *value
    }

    /// Merge a received value: local = max(local, remote) + 1. Returns the new value.
    pub fn merge(&self, remote: u64) -> u64 {
        let mut value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        *value = (*value).max(remote).saturating_add(1);
        *value
    }

    /// Current value, without advancing.
    pub fn get(&self) -> u64 {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

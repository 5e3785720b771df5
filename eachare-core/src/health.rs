//! Healthy origins for a single download: failure counts per origin, eviction at a threshold.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use rand::seq::SliceRandom;

/// Default failures before an origin is evicted.
pub const DEFAULT_MAX_FAILURES_PER_ORIGIN: u32 = 15;

#[derive(Debug)]
struct HealthState {
    origins: Vec<String>,
    failures: HashMap<String, u32>,
}

/// Origins still considered usable by one in-flight download.
/// Evicted origins never come back within the same download.
#[derive(Debug)]
pub struct HealthyOrigins {
    state: Mutex<HealthState>,
    max_failures: u32,
}

impl HealthyOrigins {
    pub fn new(origins: Vec<String>, max_failures: u32) -> Self {
        Self {
            state: Mutex::new(HealthState {
                origins,
                failures: HashMap::new(),
            }),
            max_failures: max_failures.max(1),
        }
    }

    /// Record a failure against `origin`. Returns true if this call evicted it.
    pub fn mark_failed(&self, origin: &str) -> bool {
        if origin.is_empty() {
            return false;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let count = state.failures.entry(origin.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        if *count < self.max_failures {
            return false;
        }
        let before = state.origins.len();
        state.origins.retain(|o| o != origin);
        state.origins.len() != before
    }

    /// A healthy origin chosen uniformly at random.
    pub fn pick(&self) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.origins.choose(&mut rand::thread_rng()).cloned()
    }

    /// Copy of the healthy set, in the order origins were given.
    pub fn snapshot(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .origins
            .clone()
    }

    /// `origin: n failures` for every origin that failed at least once, sorted by origin.
    pub fn summary(&self) -> String {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut counts: Vec<(&String, &u32)> = state.failures.iter().collect();
        counts.sort();
        counts
            .iter()
            .map(|(origin, n)| format!("{origin}: {n} failures"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origins() -> Vec<String> {
        vec!["a:1".to_string(), "b:2".to_string(), "c:3".to_string()]
    }

    #[test]
    fn evicts_at_threshold() {
        let h = HealthyOrigins::new(origins(), 3);
        assert!(!h.mark_failed("b:2"));
        assert!(!h.mark_failed("b:2"));
        assert_eq!(h.snapshot().len(), 3);
        assert!(h.mark_failed("b:2"));
        assert_eq!(h.snapshot(), vec!["a:1".to_string(), "c:3".to_string()]);
        // Further failures keep counting but evict nothing new.
        assert!(!h.mark_failed("b:2"));
        assert_eq!(h.summary(), "b:2: 4 failures");
    }

    #[test]
    fn pick_only_returns_healthy() {
        let h = HealthyOrigins::new(origins(), 1);
        h.mark_failed("a:1");
        h.mark_failed("c:3");
        for _ in 0..20 {
            assert_eq!(h.pick().as_deref(), Some("b:2"));
        }
        h.mark_failed("b:2");
        assert_eq!(h.pick(), None);
        assert!(h.snapshot().is_empty());
    }

    #[test]
    fn empty_origin_ignored() {
        let h = HealthyOrigins::new(origins(), 1);
        assert!(!h.mark_failed(""));
        assert_eq!(h.snapshot().len(), 3);
    }

    #[test]
    fn unknown_origin_counted_not_evicted() {
        let h = HealthyOrigins::new(origins(), 1);
        assert!(!h.mark_failed("z:9"));
        assert_eq!(h.summary(), "z:9: 1 failures");
        assert_eq!(h.snapshot().len(), 3);
    }

    #[test]
    fn summary_lists_failures() {
        let h = HealthyOrigins::new(origins(), 5);
        h.mark_failed("c:3");
        h.mark_failed("a:1");
        h.mark_failed("a:1");
        assert_eq!(h.summary(), "a:1: 2 failures, c:3: 1 failures");
    }
}

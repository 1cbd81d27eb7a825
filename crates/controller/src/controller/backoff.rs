//! # Fibonacci Backoff
//!
//! Retry delays for failed reconciles: `min, min, 2min, 3min, 5min, ...` seconds,
//! capped at `max`. Each resource keeps its own sequence in a [`BackoffTable`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    max_secs: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        Self {
            min_secs,
            max_secs: max_secs.max(min_secs),
            previous: 0,
            current: min_secs,
        }
    }

    /// Next delay in seconds, advancing the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let delay = self.current.min(self.max_secs);
        if self.current < self.max_secs {
            let next = self.previous.saturating_add(self.current);
            self.previous = self.current;
            self.current = next;
        }
        delay
    }

    /// Delay for the `error_count`-th consecutive error (0-indexed)
    pub fn calculate_for_error_count(error_count: u32, min_secs: u64, max_secs: u64) -> Duration {
        let mut backoff = Self::new(min_secs, max_secs);
        let mut delay = backoff.next_backoff_seconds();
        for _ in 0..error_count {
            delay = backoff.next_backoff_seconds();
        }
        Duration::from_secs(delay)
    }
}

/// Error history of one resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

/// Backoff states keyed by `kind/namespace/name`
///
/// Entries are dropped when a resource reconciles successfully or disappears.
#[derive(Debug)]
pub struct BackoffTable {
    min_secs: u64,
    max_secs: u64,
    states: Mutex<HashMap<String, BackoffState>>,
}

impl BackoffTable {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs,
            max_secs,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure of `key`, returning the retry delay in seconds and the error count
    pub fn record_error(&self, key: &str) -> (u64, u32) {
        match self.states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(key.to_owned())
                    .or_insert_with(|| BackoffState::new(self.min_secs, self.max_secs));
                state.increment_error();
                (state.backoff.next_backoff_seconds(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using minimum backoff", e);
                let delay =
                    FibonacciBackoff::calculate_for_error_count(1, self.min_secs, self.max_secs);
                (delay.as_secs(), 0)
            }
        }
    }

    /// Drop the error history of `key`
    pub fn forget(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }

    pub fn is_tracked(&self, key: &str) -> bool {
        self.states
            .lock()
            .is_ok_and(|states| states.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_fibonacci_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 300);
        let delays: Vec<u64> = (0..8).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(delays, vec![1, 1, 2, 3, 5, 8, 13, 21]);
    }

    #[test]
    fn caps_at_max() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        let delays: Vec<u64> = (0..10).map(|_| backoff.next_backoff_seconds()).collect();
        assert_eq!(delays[6..], [10, 10, 10, 10]);
    }

    #[test]
    fn table_tracks_each_resource_separately() {
        let table = BackoffTable::new(1, 300);
        let delays: Vec<u64> = (0..4).map(|_| table.record_error("a").0).collect();
        assert_eq!(delays, vec![1, 1, 2, 3]);
        assert_eq!(table.record_error("b"), (1, 1));
    }

    #[test]
    fn forgotten_resource_starts_over() {
        let table = BackoffTable::new(2, 100);
        table.record_error("CFServiceInstance/ns/db");
        table.record_error("CFServiceInstance/ns/db");
        table.forget("CFServiceInstance/ns/db");

        assert!(!table.is_tracked("CFServiceInstance/ns/db"));
        assert_eq!(table.record_error("CFServiceInstance/ns/db"), (2, 1));
    }

    #[test]
    fn error_count_indexes_the_sequence() {
        assert_eq!(
            FibonacciBackoff::calculate_for_error_count(0, 1, 300),
            Duration::from_secs(1)
        );
        assert_eq!(
            FibonacciBackoff::calculate_for_error_count(4, 1, 300),
            Duration::from_secs(5)
        );
        assert_eq!(
            FibonacciBackoff::calculate_for_error_count(50, 1, 300),
            Duration::from_secs(300)
        );
    }
}

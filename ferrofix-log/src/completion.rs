/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Cooperative shutdown signal.
//!
//! At shutdown the engine records, per publisher, the final position it
//! committed, then flips the completion flag. The indexer observes the flag
//! in `quiesce` and drains its subscription only up to those positions;
//! fragments beyond a publisher's completed position are post-termination
//! and dropped.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Signal carrying the per-publisher completed positions at shutdown.
#[derive(Debug, Default)]
pub struct CompletionPosition {
    completed: AtomicBool,
    startup_complete: AtomicBool,
    positions: Mutex<HashMap<i32, u64>>,
}

impl CompletionPosition {
    /// Creates an incomplete signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once completion has been declared.
    #[inline]
    #[must_use]
    pub fn has_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Returns true if completion was declared before startup finished, in
    /// which case there is nothing to drain.
    #[inline]
    #[must_use]
    pub fn was_startup_complete(&self) -> bool {
        self.startup_complete.load(Ordering::Acquire)
    }

    /// Declares completion with the final committed position per publisher.
    pub fn complete(&self, positions: HashMap<i32, u64>) {
        *self.positions.lock() = positions;
        self.completed.store(true, Ordering::Release);
    }

    /// Declares completion before startup ever finished.
    pub fn complete_during_startup(&self) {
        self.startup_complete.store(true, Ordering::Release);
        self.completed.store(true, Ordering::Release);
    }

    /// Returns the completed position recorded for a publisher.
    #[must_use]
    pub fn completed_position(&self, log_session_id: i32) -> Option<u64> {
        self.positions.lock().get(&log_session_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_flow() {
        let completion = CompletionPosition::new();
        assert!(!completion.has_completed());
        assert!(!completion.was_startup_complete());

        let mut positions = HashMap::new();
        positions.insert(5, 1024);
        completion.complete(positions);

        assert!(completion.has_completed());
        assert!(!completion.was_startup_complete());
        assert_eq!(completion.completed_position(5), Some(1024));
        assert_eq!(completion.completed_position(6), None);
    }

    #[test]
    fn test_completion_during_startup() {
        let completion = CompletionPosition::new();
        completion.complete_during_startup();
        assert!(completion.has_completed());
        assert!(completion.was_startup_complete());
    }
}

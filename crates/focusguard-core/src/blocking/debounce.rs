//! Trailing-edge debounce for rule reconciliation.
//!
//! A call that arrives within the window after the previous reconciliation
//! finished waits for the window to close. If another call arrived in the
//! meantime, the earlier one is dropped and only the latest runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub struct Debouncer {
    window: Duration,
    generation: AtomicU64,
    last_finished: Mutex<Option<Instant>>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            generation: AtomicU64::new(0),
            last_finished: Mutex::new(None),
        }
    }

    /// Register a call. The returned ticket is passed to [`Debouncer::settle`].
    pub fn ticket(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Wait until the window after the last finished run has closed.
    /// Returns false when a later call superseded this ticket.
    pub async fn settle(&self, ticket: u64) -> bool {
        loop {
            let wait = self
                .closes_at()
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or_default();
            if wait.is_zero() {
                break;
            }
            tokio::time::sleep(wait).await;
            if self.generation.load(Ordering::SeqCst) != ticket {
                return false;
            }
        }
        self.generation.load(Ordering::SeqCst) == ticket
    }

    /// Mark a reconciliation as finished; opens a new window.
    pub fn finished(&self) {
        let mut last = self.last_finished.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(Instant::now());
    }

    fn closes_at(&self) -> Option<Instant> {
        let last = self.last_finished.lock().unwrap_or_else(|e| e.into_inner());
        last.map(|at| at + self.window)
    }
}

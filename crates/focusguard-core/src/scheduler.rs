//! Named one-shot deadlines.
//!
//! The session machine keeps at most one deadline alive at a time. When it
//! fires, the scheduler only reports the name; deciding whether the deadline
//! is still relevant is the receiver's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::ScheduleError;

/// A deadline that reached its fire time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineFired {
    pub name: String,
}

#[async_trait]
pub trait DeadlineScheduler: Send + Sync {
    /// Schedule `name` to fire at `at`, replacing any deadline with that name.
    async fn schedule(&self, name: &str, at: DateTime<Utc>) -> Result<(), ScheduleError>;

    /// Cancel `name`. Cancelling an unknown name is not an error.
    async fn cancel(&self, name: &str) -> Result<(), ScheduleError>;
}

/// Scheduler backed by sleeping tokio tasks.
///
/// Fired deadlines are delivered on the receiver returned by [`TokioScheduler::new`].
pub struct TokioScheduler {
    clock: Arc<dyn Clock>,
    fired: mpsc::UnboundedSender<DeadlineFired>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TokioScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<DeadlineFired>) {
        let (fired, rx) = mpsc::unbounded_channel();
        (
            Self {
                clock,
                fired,
                timers: Mutex::new(HashMap::new()),
            },
            rx,
        )
    }
}

#[async_trait]
impl DeadlineScheduler for TokioScheduler {
    async fn schedule(&self, name: &str, at: DateTime<Utc>) -> Result<(), ScheduleError> {
        if self.fired.is_closed() {
            return Err(ScheduleError::Failed {
                name: name.to_string(),
                message: "deadline receiver dropped".into(),
            });
        }
        let delay = (at - self.clock.now()).to_std().unwrap_or_default();
        let tx = self.fired.clone();
        let fired_name = name.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(DeadlineFired { name: fired_name }).is_err() {
                tracing::debug!("Deadline fired after receiver was dropped");
            }
        });

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.retain(|_, h| !h.is_finished());
        if let Some(previous) = timers.insert(name.to_string(), handle) {
            previous.abort();
        }
        tracing::debug!(name, delay_secs = delay.as_secs(), "Deadline scheduled");
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<(), ScheduleError> {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = timers.remove(name) {
            handle.abort();
            tracing::debug!(name, "Deadline cancelled");
        }
        Ok(())
    }
}

/// Scheduler that only records deadlines. The owner decides when they fire.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<BTreeMap<String, DateTime<Utc>>>,
    failing: AtomicBool,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `schedule` call fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn pending(&self) -> Vec<(String, DateTime<Utc>)> {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.iter().map(|(n, at)| (n.clone(), *at)).collect()
    }

    pub fn deadline(&self, name: &str) -> Option<DateTime<Utc>> {
        let pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.get(name).copied()
    }

    /// Remove and return every deadline due at `now`.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let due: Vec<String> = pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &due {
            pending.remove(name);
        }
        due
    }
}

#[async_trait]
impl DeadlineScheduler for ManualScheduler {
    async fn schedule(&self, name: &str, at: DateTime<Utc>) -> Result<(), ScheduleError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ScheduleError::Failed {
                name: name.to_string(),
                message: "scheduler unavailable".into(),
            });
        }
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.insert(name.to_string(), at);
        Ok(())
    }

    async fn cancel(&self, name: &str) -> Result<(), ScheduleError> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    #[tokio::test]
    async fn manual_scheduler_replaces_and_takes_due() {
        let scheduler = ManualScheduler::new();
        let t0 = Utc::now();
        scheduler.schedule("a", t0).await.unwrap();
        scheduler
            .schedule("a", t0 + Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(scheduler.pending().len(), 1);
        assert!(scheduler.take_due(t0).is_empty());
        assert_eq!(scheduler.take_due(t0 + Duration::seconds(10)), vec!["a"]);
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn manual_scheduler_can_fail() {
        let scheduler = ManualScheduler::new();
        scheduler.set_failing(true);
        assert!(scheduler.schedule("a", Utc::now()).await.is_err());
        assert!(scheduler.cancel("a").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_fires_after_delay() {
        let clock = Arc::new(ManualClock::starting_now());
        let (scheduler, mut rx) = TokioScheduler::new(clock.clone());
        scheduler
            .schedule("session-end", clock.now() + Duration::seconds(30))
            .await
            .unwrap();
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.name, "session-end");
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_scheduler_cancel_prevents_fire() {
        let clock = Arc::new(ManualClock::starting_now());
        let (scheduler, mut rx) = TokioScheduler::new(clock.clone());
        scheduler
            .schedule("a", clock.now() + Duration::seconds(5))
            .await
            .unwrap();
        scheduler.cancel("a").await.unwrap();
        scheduler
            .schedule("b", clock.now() + Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().name, "b");
    }
}

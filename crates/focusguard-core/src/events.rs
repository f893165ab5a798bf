use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::session::SessionKind;

/// Every state change in the core produces an Event.
/// Dashboards and popups subscribe to them; the core never waits on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: Uuid,
        kind: SessionKind,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    SessionPaused {
        session_id: Uuid,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    SessionResumed {
        session_id: Uuid,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    SessionEnded {
        session_id: Uuid,
        kind: Option<SessionKind>,
        completed: bool,
        at: DateTime<Utc>,
    },
    /// A deadline fired for a session that is no longer live.
    StaleDeadlineIgnored {
        name: String,
        at: DateTime<Utc>,
    },
    RulesApplied {
        installed: usize,
        added: usize,
        removed: usize,
        at: DateTime<Utc>,
    },
    /// Fail-safe path: every block rule was removed.
    RulesCleared {
        reason: String,
        at: DateTime<Utc>,
    },
    AllowanceGranted {
        site: String,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    AllowancesExpired {
        sites: Vec<String>,
        at: DateTime<Utc>,
    },
    StreakMilestone {
        streak: u32,
        at: DateTime<Utc>,
    },
}

/// Broadcast channel for [`Event`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: Event) {
        if let Err(e) = self.sender.send(event) {
            tracing::trace!("No subscribers for event: {}", e);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

pub type SharedEventBus = Arc<EventBus>;

//! The persisted session record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Focus,
    Break,
    Paused,
}

/// The two kinds of timed interval. A paused session remembers its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Focus,
    Break,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Focus => "focus",
            SessionKind::Break => "break",
        }
    }
}

impl From<SessionKind> for SessionState {
    fn from(kind: SessionKind) -> Self {
        match kind {
            SessionKind::Focus => SessionState::Focus,
            SessionKind::Break => SessionState::Break,
        }
    }
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Focus => "focus",
            SessionState::Break => "break",
            SessionState::Paused => "paused",
        }
    }

    /// The running kind, if this state is Focus or Break.
    pub fn running_kind(&self) -> Option<SessionKind> {
        match self {
            SessionState::Focus => Some(SessionKind::Focus),
            SessionState::Break => Some(SessionKind::Break),
            _ => None,
        }
    }
}

/// One timed interval. `Session::idle()` is the value when nothing is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Identity token; nil while idle.
    #[serde(default)]
    pub id: Uuid,
    #[serde(default)]
    pub state: SessionState,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Planned length in seconds.
    #[serde(default)]
    pub duration: u64,
    /// Seconds left; authoritative only while paused.
    #[serde(default)]
    pub remaining_time: u64,
    #[serde(default)]
    pub prior_state: Option<SessionKind>,
    #[serde(default)]
    pub reminder_sent: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::idle()
    }
}

impl Session {
    pub fn idle() -> Self {
        Self {
            id: Uuid::nil(),
            state: SessionState::Idle,
            start_time: None,
            end_time: None,
            duration: 0,
            remaining_time: 0,
            prior_state: None,
            reminder_sent: false,
        }
    }

    /// A freshly started session.
    pub fn running(kind: SessionKind, duration_secs: u64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: kind.into(),
            start_time: Some(now),
            end_time: Some(end_after(now, duration_secs).unwrap_or(DateTime::<Utc>::MAX_UTC)),
            duration: duration_secs,
            remaining_time: duration_secs,
            prior_state: None,
            reminder_sent: false,
        }
    }

    pub fn is_live(&self) -> bool {
        self.state != SessionState::Idle
    }

    pub fn is_running(&self) -> bool {
        self.state.running_kind().is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.state == SessionState::Paused
    }

    /// Focus or Break, looking through a pause.
    pub fn effective_kind(&self) -> Option<SessionKind> {
        match self.state {
            SessionState::Paused => self.prior_state,
            other => other.running_kind(),
        }
    }

    /// Whole seconds left, never negative. Partial seconds round up so the
    /// countdown does not reach zero before the deadline.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        match self.state {
            SessionState::Idle => 0,
            SessionState::Paused => self.remaining_time,
            SessionState::Focus | SessionState::Break => match self.end_time {
                Some(end) => {
                    let ms = (end - now).num_milliseconds().max(0) as u64;
                    ms.div_ceil(1000)
                }
                None => 0,
            },
        }
    }

    /// Minutes for display: the ceiling of remaining seconds / 60.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> u64 {
        self.remaining_secs(now).div_ceil(60)
    }

    /// A running session whose end time has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_running() && self.end_time.is_some_and(|end| now >= end)
    }

    /// 0..=100 progress through the planned duration.
    pub fn progress_percent(&self, now: DateTime<Utc>) -> u64 {
        if !self.is_live() || self.duration == 0 {
            return 0;
        }
        let elapsed = self.duration.saturating_sub(self.remaining_secs(now));
        (u128::from(elapsed) * 100 / u128::from(self.duration)).min(100) as u64
    }

    /// Name of the deadline that completes this session.
    pub fn deadline_name(&self) -> String {
        format!("{DEADLINE_PREFIX}{}", self.id)
    }

    /// Freeze the countdown. Caller guarantees the session is running.
    pub(crate) fn pause_at(&mut self, now: DateTime<Utc>) {
        self.remaining_time = self.remaining_secs(now);
        self.prior_state = self.state.running_kind();
        self.state = SessionState::Paused;
    }

    /// Restart the countdown from the frozen remainder.
    pub(crate) fn resume_at(&mut self, now: DateTime<Utc>) {
        let kind = self.prior_state.take().unwrap_or(SessionKind::Focus);
        self.state = kind.into();
        self.start_time = Some(now);
        self.end_time = Some(end_after(now, self.remaining_time).unwrap_or(DateTime::<Utc>::MAX_UTC));
    }
}

/// Deadline names are `session-end:<uuid>`.
pub const DEADLINE_PREFIX: &str = "session-end:";

/// Session id embedded in a deadline name.
pub fn session_id_from_deadline(name: &str) -> Option<Uuid> {
    name.strip_prefix(DEADLINE_PREFIX)
        .and_then(|id| Uuid::parse_str(id).ok())
}

/// `now + secs`, or None when the result is not representable.
pub fn end_after(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(secs).ok()?;
    now.checked_add_signed(Duration::try_seconds(secs)?)
}

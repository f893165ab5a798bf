//! Outbound requests toward the presentation layer.
//!
//! The core decides *what* to show (notification text, badge text and color);
//! rendering, sounds and permission prompts belong to the host.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::session::{Session, SessionKind, SessionState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub buttons: Vec<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            buttons: Vec::new(),
        }
    }

    pub fn with_buttons(mut self, buttons: &[&str]) -> Self {
        self.buttons = buttons.iter().map(|b| b.to_string()).collect();
        self
    }

    /// Shown when a session reaches its deadline.
    pub fn session_complete(kind: SessionKind, duration_secs: u64) -> Self {
        match kind {
            SessionKind::Focus => Self::new(
                "Focus Session Complete!",
                format!(
                    "Great job! You completed {} minutes of focused work.",
                    duration_secs.div_ceil(60)
                ),
            )
            .with_buttons(&["Take a break", "Keep focusing"]),
            SessionKind::Break => Self::new(
                "Break Over",
                "Break time is over! Ready to get back to work?",
            )
            .with_buttons(&["Start focus"]),
        }
    }

    pub fn break_reminder(minutes_left: u64) -> Self {
        Self::new(
            "Break Coming Up",
            format!("{minutes_left} minutes left in this focus session."),
        )
    }

    pub fn streak_milestone(streak: u32) -> Self {
        Self::new(
            "Streak Milestone",
            format!("{streak} days in a row with a completed focus session."),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub color: String,
}

pub const FOCUS_COLOR: &str = "#4CAF50";
pub const BREAK_COLOR: &str = "#2196F3";
pub const PAUSED_COLOR: &str = "#FFA000";
pub const IDLE_COLOR: &str = "#9E9E9E";

/// Badge for a session: empty when idle, `||` when paused, otherwise the
/// remaining minutes rounded up.
pub fn badge_for(session: &Session, now: DateTime<Utc>) -> Badge {
    let (text, color) = match session.state {
        SessionState::Idle => (String::new(), IDLE_COLOR),
        SessionState::Paused => ("||".to_string(), PAUSED_COLOR),
        SessionState::Focus => (session.remaining_minutes(now).to_string(), FOCUS_COLOR),
        SessionState::Break => (session.remaining_minutes(now).to_string(), BREAK_COLOR),
    };
    Badge {
        text,
        color: color.to_string(),
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);

    async fn set_badge(&self, badge: Badge);
}

/// Notifier that writes to the log. Used when no presentation layer exists.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) {
        tracing::info!(
            title = %notification.title,
            buttons = ?notification.buttons,
            "{}",
            notification.message
        );
    }

    async fn set_badge(&self, badge: Badge) {
        tracing::trace!(text = %badge.text, color = %badge.color, "Badge updated");
    }
}

/// Notifier that keeps everything it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
    badges: Mutex<Vec<Badge>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_badge(&self) -> Option<Badge> {
        self.badges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) {
        self.notifications
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }

    async fn set_badge(&self, badge: Badge) {
        self.badges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(badge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn badge_text_tracks_state() {
        let now = Utc::now();
        assert_eq!(badge_for(&Session::idle(), now).text, "");

        let mut focus = Session::running(SessionKind::Focus, 25 * 60, now);
        let badge = badge_for(&focus, now + Duration::seconds(30));
        assert_eq!(badge.text, "25");
        assert_eq!(badge.color, FOCUS_COLOR);
        assert_eq!(badge_for(&focus, now + Duration::seconds(1499)).text, "1");

        focus.pause_at(now);
        let badge = badge_for(&focus, now);
        assert_eq!(badge.text, "||");
        assert_eq!(badge.color, PAUSED_COLOR);

        let rest = Session::running(SessionKind::Break, 5 * 60, now);
        assert_eq!(badge_for(&rest, now).color, BREAK_COLOR);
    }

    #[test]
    fn completion_messages_differ_by_kind() {
        let focus = Notification::session_complete(SessionKind::Focus, 1500);
        assert_eq!(focus.title, "Focus Session Complete!");
        assert!(focus.message.contains("25 minutes"));
        assert_eq!(focus.buttons.len(), 2);
        let rest = Notification::session_complete(SessionKind::Break, 300);
        assert_eq!(rest.title, "Break Over");
    }
}

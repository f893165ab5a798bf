//! Completed-interval bookkeeping.
//!
//! The session machine hands every ended session to a [`StatsRecorder`]
//! exactly once. [`StoreStats`] keeps a day streak and per-day counters in
//! the key-value store.

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::StoreError;
use crate::session::{Session, SessionKind};
use crate::store::{keys, load, save, KeyValueStore};

/// Streak milestones are announced every this many days.
pub const STREAK_MILESTONE_EVERY: u32 = 5;

/// A session at the moment it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndedSession {
    pub session: Session,
    pub kind: Option<SessionKind>,
    /// Reached its deadline rather than being stopped early.
    pub completed: bool,
    pub ended_at: DateTime<Utc>,
}

impl EndedSession {
    /// True when this counts as one completed focus interval.
    pub fn is_completed_focus(&self) -> bool {
        self.completed && self.kind == Some(SessionKind::Focus)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsOutcome {
    /// New streak value when it crossed a milestone.
    pub milestone: Option<u32>,
}

#[async_trait]
pub trait StatsRecorder: Send + Sync {
    async fn record_session(&self, ended: &EndedSession) -> Result<StatsOutcome, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakData {
    pub current_streak: u32,
    pub last_completed_date: Option<NaiveDate>,
}

impl StreakData {
    /// Count a completed focus interval on `today`. Returns true when the
    /// streak value changed.
    pub fn record(&mut self, today: NaiveDate) -> bool {
        if self.last_completed_date == Some(today) {
            return false;
        }
        let continues = self
            .last_completed_date
            .and_then(|last| last.succ_opt())
            .is_some_and(|next| next == today);
        self.current_streak = if continues { self.current_streak + 1 } else { 1 };
        self.last_completed_date = Some(today);
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub focus_sessions: u32,
    pub break_sessions: u32,
    pub total_focus_minutes: u64,
    pub total_break_minutes: u64,
    /// Sessions ended before their deadline.
    #[serde(default)]
    pub interrupted_sessions: u32,
}

/// Stats kept under `streakData` and `sessionStats`.
pub struct StoreStats {
    store: Arc<dyn KeyValueStore>,
}

impl StoreStats {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn streak(&self) -> Result<StreakData, StoreError> {
        Ok(load(self.store.as_ref(), keys::STREAK_DATA)
            .await?
            .unwrap_or_default())
    }

    pub async fn daily(&self, date: NaiveDate) -> Result<DailyStats, StoreError> {
        let all = self.all_days().await?;
        Ok(all.get(&date.to_string()).cloned().unwrap_or_default())
    }

    async fn all_days(&self) -> Result<BTreeMap<String, DailyStats>, StoreError> {
        Ok(load(self.store.as_ref(), keys::SESSION_STATS)
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl StatsRecorder for StoreStats {
    async fn record_session(&self, ended: &EndedSession) -> Result<StatsOutcome, StoreError> {
        let today = ended.ended_at.with_timezone(&Local).date_naive();
        let mut days = self.all_days().await?;
        let day = days.entry(today.to_string()).or_default();
        let minutes = ended.session.duration / 60;

        match (ended.completed, ended.kind) {
            (true, Some(SessionKind::Focus)) => {
                day.focus_sessions += 1;
                day.total_focus_minutes += minutes;
            }
            (true, Some(SessionKind::Break)) => {
                day.break_sessions += 1;
                day.total_break_minutes += minutes;
            }
            (false, Some(_)) => day.interrupted_sessions += 1,
            (_, None) => {}
        }
        save(self.store.as_ref(), keys::SESSION_STATS, &days).await?;

        let mut outcome = StatsOutcome::default();
        if ended.is_completed_focus() {
            let mut streak = self.streak().await?;
            if streak.record(today) {
                save(self.store.as_ref(), keys::STREAK_DATA, &streak).await?;
                if streak.current_streak % STREAK_MILESTONE_EVERY == 0 {
                    outcome.milestone = Some(streak.current_streak);
                }
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ended(kind: SessionKind, completed: bool) -> EndedSession {
        let now = Utc::now();
        EndedSession {
            session: Session::running(kind, 25 * 60, now),
            kind: Some(kind),
            completed,
            ended_at: now,
        }
    }

    #[test]
    fn streak_counts_consecutive_days() {
        let mut streak = StreakData::default();
        assert!(streak.record(date(2026, 3, 1)));
        assert!(!streak.record(date(2026, 3, 1)));
        assert!(streak.record(date(2026, 3, 2)));
        assert_eq!(streak.current_streak, 2);
        assert!(streak.record(date(2026, 3, 5)));
        assert_eq!(streak.current_streak, 1);
    }

    #[tokio::test]
    async fn completed_focus_is_counted_once() {
        let store = Arc::new(MemoryStore::new());
        let stats = StoreStats::new(store);
        stats.record_session(&ended(SessionKind::Focus, true)).await.unwrap();
        stats.record_session(&ended(SessionKind::Focus, false)).await.unwrap();
        stats.record_session(&ended(SessionKind::Break, true)).await.unwrap();

        let today = Local::now().date_naive();
        let day = stats.daily(today).await.unwrap();
        assert_eq!(day.focus_sessions, 1);
        assert_eq!(day.total_focus_minutes, 25);
        assert_eq!(day.break_sessions, 1);
        assert_eq!(day.interrupted_sessions, 1);
        assert_eq!(stats.streak().await.unwrap().current_streak, 1);
    }

    #[tokio::test]
    async fn milestone_reported_every_fifth_day() {
        let store = Arc::new(MemoryStore::new());
        let today = Local::now().date_naive();
        save(
            store.as_ref(),
            keys::STREAK_DATA,
            &StreakData {
                current_streak: 4,
                last_completed_date: today.pred_opt(),
            },
        )
        .await
        .unwrap();
        let stats = StoreStats::new(store);
        let outcome = stats
            .record_session(&ended(SessionKind::Focus, true))
            .await
            .unwrap();
        assert_eq!(outcome.milestone, Some(5));
    }
}

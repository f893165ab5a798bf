//! Focus/break lifecycle.
//!
//! The machine owns the live [`Session`]. Every transition persists the
//! record, keeps exactly one deadline scheduled for a running session, and
//! then signals the blocking engine. Collaborator failures are logged and
//! never stop a transition: a session can always be ended.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::model::{end_after, session_id_from_deadline, Session, SessionKind, SessionState};
use crate::blocking::BlockingSignal;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{Result, ValidationError};
use crate::events::{Event, SharedEventBus};
use crate::notify::{badge_for, Notification, Notifier};
use crate::scheduler::DeadlineScheduler;
use crate::stats::{EndedSession, StatsRecorder};
use crate::store::{keys, load, save, KeyValueStore};

#[derive(Debug, Clone)]
pub struct MachineOptions {
    pub notifications_enabled: bool,
    /// Minutes before the end of a focus session to send a reminder; 0 disables.
    pub break_reminder_minutes: u64,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            break_reminder_minutes: 5,
        }
    }
}

impl From<&Config> for MachineOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            notifications_enabled: cfg.notifications.enabled,
            break_reminder_minutes: cfg.notifications.break_reminder_minutes,
        }
    }
}

/// Everything the machine talks to.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub store: Arc<dyn KeyValueStore>,
    pub scheduler: Arc<dyn DeadlineScheduler>,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<dyn StatsRecorder>,
    pub notifier: Arc<dyn Notifier>,
    pub blocking: Arc<dyn BlockingSignal>,
    pub events: SharedEventBus,
}

pub struct SessionMachine {
    session: Mutex<Session>,
    deps: SessionCollaborators,
    options: MachineOptions,
    /// The last persist failed, so the store lags the in-memory session.
    unsaved: AtomicBool,
}

impl SessionMachine {
    pub fn new(deps: SessionCollaborators, options: MachineOptions) -> Self {
        Self {
            session: Mutex::new(Session::idle()),
            deps,
            options,
            unsaved: AtomicBool::new(false),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start a new session, ending any live one first.
    pub async fn start(&self, duration_secs: u64, kind: SessionKind) -> Result<Session> {
        let now = self.deps.clock.now();
        if duration_secs == 0 || end_after(now, duration_secs).is_none() {
            return Err(ValidationError::InvalidDuration(duration_secs).into());
        }

        let mut session = self.session.lock().await;
        if session.is_live() {
            tracing::info!(previous = %session.id, "Ending live session before starting a new one");
            self.end_locked(&mut session, false).await;
        }

        let next = Session::running(kind, duration_secs, now);
        self.persist(&next).await;
        if let Some(end) = next.end_time {
            self.schedule_deadline(&next.deadline_name(), end).await;
        }
        *session = next.clone();

        tracing::info!(id = %next.id, kind = kind.as_str(), duration_secs, "Session started");
        self.deps.events.publish(Event::SessionStarted {
            session_id: next.id,
            kind,
            duration_secs,
            at: now,
        });
        self.push_badge(&next).await;
        self.deps.blocking.session_changed().await;
        Ok(next)
    }

    /// Freeze a running session. No-op otherwise.
    pub async fn pause(&self) -> Session {
        let mut session = self.session.lock().await;
        if !session.is_running() {
            return session.clone();
        }
        self.cancel_deadline(&session.deadline_name()).await;

        let now = self.deps.clock.now();
        session.pause_at(now);
        self.persist(&session).await;

        tracing::info!(id = %session.id, remaining = session.remaining_time, "Session paused");
        self.deps.events.publish(Event::SessionPaused {
            session_id: session.id,
            remaining_secs: session.remaining_time,
            at: now,
        });
        self.push_badge(&session).await;
        self.deps.blocking.session_changed().await;
        session.clone()
    }

    /// Continue a paused session from its frozen remainder. No-op otherwise.
    pub async fn resume(&self) -> Session {
        let mut session = self.session.lock().await;
        if !session.is_paused() {
            return session.clone();
        }

        let now = self.deps.clock.now();
        session.resume_at(now);
        self.persist(&session).await;
        if let Some(end) = session.end_time {
            self.schedule_deadline(&session.deadline_name(), end).await;
        }

        tracing::info!(id = %session.id, remaining = session.remaining_time, "Session resumed");
        self.deps.events.publish(Event::SessionResumed {
            session_id: session.id,
            remaining_secs: session.remaining_time,
            at: now,
        });
        self.push_badge(&session).await;
        self.deps.blocking.session_changed().await;
        session.clone()
    }

    /// End the live session. `completed` is true only for natural completion.
    pub async fn end(&self, completed: bool) -> Option<EndedSession> {
        let mut session = self.session.lock().await;
        let ended = self.end_locked(&mut session, completed).await;
        if ended.is_some() {
            self.deps.blocking.session_changed().await;
        }
        ended
    }

    // ── Timer backstops ──────────────────────────────────────────────

    /// Handle a fired deadline. Returns true when it completed the live session.
    pub async fn on_deadline_fired(&self, name: &str) -> bool {
        let mut session = self.session.lock().await;
        let matches_live = session_id_from_deadline(name)
            .is_some_and(|id| session.is_running() && id == session.id);
        if !matches_live {
            tracing::debug!(name, "Ignoring stale deadline");
            self.deps.events.publish(Event::StaleDeadlineIgnored {
                name: name.to_string(),
                at: self.deps.clock.now(),
            });
            return false;
        }
        self.end_locked(&mut session, true).await;
        self.deps.blocking.session_changed().await;
        true
    }

    /// Complete a running session whose end time has passed. Covers lost or
    /// never-scheduled deadlines.
    pub async fn resync(&self) -> Option<EndedSession> {
        let mut session = self.session.lock().await;
        if !session.is_due(self.deps.clock.now()) {
            return None;
        }
        tracing::info!(id = %session.id, "Session overdue, completing");
        let ended = self.end_locked(&mut session, true).await;
        self.deps.blocking.session_changed().await;
        ended
    }

    /// Load the persisted session at process start.
    pub async fn restore(&self) -> Session {
        let mut session = self.session.lock().await;
        let persisted: Session = match load(self.deps.store.as_ref(), keys::SESSION).await {
            Ok(s) => s.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Could not restore session, starting idle: {}", e);
                Session::idle()
            }
        };
        *session = persisted;

        let now = self.deps.clock.now();
        if session.is_due(now) {
            tracing::info!(id = %session.id, "Restored session already elapsed");
            self.end_locked(&mut session, true).await;
        } else if session.is_running() {
            if let Some(end) = session.end_time {
                self.schedule_deadline(&session.deadline_name(), end).await;
            }
            tracing::info!(id = %session.id, remaining = session.remaining_secs(now), "Session restored");
        }
        self.push_badge(&session).await;
        self.deps.blocking.session_changed().await;
        session.clone()
    }

    /// Adopt the persisted session when another process changed it. Returns
    /// true when the in-memory session was replaced.
    ///
    /// If our own last write failed, the store is stale instead and the
    /// in-memory session is written back.
    pub async fn reload(&self) -> bool {
        let mut session = self.session.lock().await;
        if self.unsaved.load(Ordering::SeqCst) {
            self.persist(&session).await;
            return false;
        }
        let persisted: Session = match load(self.deps.store.as_ref(), keys::SESSION).await {
            Ok(s) => s.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Could not reload session, keeping current: {}", e);
                return false;
            }
        };
        if persisted == *session {
            return false;
        }

        tracing::info!(
            previous = %session.id,
            current = %persisted.id,
            state = persisted.state.as_str(),
            "Session changed by another process"
        );
        if session.is_running() {
            self.cancel_deadline(&session.deadline_name()).await;
        }
        *session = persisted;
        if session.is_running() {
            if let Some(end) = session.end_time {
                self.schedule_deadline(&session.deadline_name(), end).await;
            }
        }
        self.push_badge(&session).await;
        self.deps.blocking.session_changed().await;
        true
    }

    /// Send the pre-end reminder once per focus session.
    pub async fn maybe_remind(&self) -> bool {
        let minutes = self.options.break_reminder_minutes;
        if !self.options.notifications_enabled || minutes == 0 {
            return false;
        }
        let mut session = self.session.lock().await;
        let window = minutes * 60;
        let remaining = session.remaining_secs(self.deps.clock.now());
        let due = session.state == SessionState::Focus
            && !session.reminder_sent
            && session.duration > window
            && remaining > 0
            && remaining <= window;
        if !due {
            return false;
        }
        session.reminder_sent = true;
        self.persist(&session).await;
        self.deps
            .notifier
            .notify(Notification::break_reminder(session.remaining_minutes(self.deps.clock.now())))
            .await;
        true
    }

    /// Re-send the badge for the current countdown.
    pub async fn refresh_badge(&self) {
        let session = self.session.lock().await;
        self.push_badge(&session).await;
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> Session {
        self.session.lock().await.clone()
    }

    pub async fn remaining_secs(&self) -> u64 {
        self.session
            .lock()
            .await
            .remaining_secs(self.deps.clock.now())
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn end_locked(&self, session: &mut Session, completed: bool) -> Option<EndedSession> {
        if !session.is_live() {
            return None;
        }
        self.cancel_deadline(&session.deadline_name()).await;

        let now = self.deps.clock.now();
        let ended = EndedSession {
            session: session.clone(),
            kind: session.effective_kind(),
            completed,
            ended_at: now,
        };
        match self.deps.stats.record_session(&ended).await {
            Ok(outcome) => {
                if let Some(streak) = outcome.milestone {
                    self.deps.events.publish(Event::StreakMilestone { streak, at: now });
                    if self.options.notifications_enabled {
                        self.deps
                            .notifier
                            .notify(Notification::streak_milestone(streak))
                            .await;
                    }
                }
            }
            Err(e) => tracing::warn!("Could not record session stats: {}", e),
        }

        *session = Session::idle();
        self.persist(session).await;

        tracing::info!(id = %ended.session.id, completed, "Session ended");
        self.deps.events.publish(Event::SessionEnded {
            session_id: ended.session.id,
            kind: ended.kind,
            completed,
            at: now,
        });
        if completed && self.options.notifications_enabled {
            if let Some(kind) = ended.kind {
                self.deps
                    .notifier
                    .notify(Notification::session_complete(kind, ended.session.duration))
                    .await;
            }
        }
        self.push_badge(session).await;
        Some(ended)
    }

    async fn persist(&self, session: &Session) {
        let result = save(self.deps.store.as_ref(), keys::SESSION, session).await;
        if let Err(e) = &result {
            tracing::warn!("Could not persist session: {}", e);
        }
        self.unsaved.store(result.is_err(), Ordering::SeqCst);
    }

    async fn schedule_deadline(&self, name: &str, at: chrono::DateTime<chrono::Utc>) {
        if let Err(e) = self.deps.scheduler.schedule(name, at).await {
            tracing::warn!("Deadline not scheduled, heartbeat will complete the session: {}", e);
        }
    }

    async fn cancel_deadline(&self, name: &str) {
        if let Err(e) = self.deps.scheduler.cancel(name).await {
            tracing::warn!("Could not cancel deadline: {}", e);
        }
    }

    async fn push_badge(&self, session: &Session) {
        self.deps
            .notifier
            .set_badge(badge_for(session, self.deps.clock.now()))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::{CoreError, StoreError};
    use crate::events::EventBus;
    use crate::notify::RecordingNotifier;
    use crate::scheduler::ManualScheduler;
    use crate::session::SessionState;
    use crate::stats::StatsOutcome;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingSignal(AtomicUsize);

    #[async_trait]
    impl BlockingSignal for CountingSignal {
        async fn session_changed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingStats {
        ended: StdMutex<Vec<EndedSession>>,
        fail: bool,
    }

    #[async_trait]
    impl StatsRecorder for RecordingStats {
        async fn record_session(
            &self,
            ended: &EndedSession,
        ) -> std::result::Result<StatsOutcome, StoreError> {
            self.ended.lock().unwrap().push(ended.clone());
            if self.fail {
                return Err(StoreError::Unavailable {
                    key: "sessionStats".into(),
                    message: "quota".into(),
                });
            }
            Ok(StatsOutcome::default())
        }
    }

    struct Harness {
        machine: SessionMachine,
        store: Arc<MemoryStore>,
        scheduler: Arc<ManualScheduler>,
        clock: Arc<ManualClock>,
        stats: Arc<RecordingStats>,
        notifier: Arc<RecordingNotifier>,
        signal: Arc<CountingSignal>,
    }

    fn harness_with(stats: RecordingStats) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(ManualScheduler::new());
        let clock = Arc::new(ManualClock::starting_now());
        let stats = Arc::new(stats);
        let notifier = Arc::new(RecordingNotifier::new());
        let signal = Arc::new(CountingSignal::default());
        let machine = SessionMachine::new(
            SessionCollaborators {
                store: store.clone(),
                scheduler: scheduler.clone(),
                clock: clock.clone(),
                stats: stats.clone(),
                notifier: notifier.clone(),
                blocking: signal.clone(),
                events: Arc::new(EventBus::default()),
            },
            MachineOptions::default(),
        );
        Harness {
            machine,
            store,
            scheduler,
            clock,
            stats,
            notifier,
            signal,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingStats::default())
    }

    fn signals(h: &Harness) -> usize {
        h.signal.0.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn start_persists_schedules_and_signals() {
        let h = harness();
        let s = h.machine.start(1500, SessionKind::Focus).await.unwrap();
        assert_eq!(s.state, SessionState::Focus);
        assert_eq!(h.scheduler.deadline(&s.deadline_name()), s.end_time);
        let stored: Session = load(h.store.as_ref(), keys::SESSION).await.unwrap().unwrap();
        assert_eq!(stored, s);
        assert_eq!(signals(&h), 1);
        assert_eq!(h.notifier.last_badge().unwrap().text, "25");
    }

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let h = harness();
        let err = h.machine.start(0, SessionKind::Focus).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::InvalidDuration(0))
        ));
        assert!(!h.machine.snapshot().await.is_live());
        assert_eq!(signals(&h), 0);
    }

    #[tokio::test]
    async fn unrepresentable_duration_is_rejected() {
        let h = harness();
        let err = h.machine.start(u64::MAX, SessionKind::Focus).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::InvalidDuration(u64::MAX))
        ));
        assert!(!h.machine.snapshot().await.is_live());
        assert!(h.scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn start_over_live_session_ends_it_once() {
        let h = harness();
        let first = h.machine.start(1500, SessionKind::Focus).await.unwrap();
        let second = h.machine.start(300, SessionKind::Break).await.unwrap();
        assert_ne!(first.id, second.id);

        let ended = h.stats.ended.lock().unwrap().clone();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].session.id, first.id);
        assert!(!ended[0].completed);
        assert_eq!(h.scheduler.pending().len(), 1);
        assert!(h.scheduler.deadline(&first.deadline_name()).is_none());
    }

    #[tokio::test]
    async fn pause_and_resume_keep_remaining_time() {
        let h = harness();
        h.machine.start(1500, SessionKind::Focus).await.unwrap();
        h.clock.advance(Duration::seconds(600));

        let paused = h.machine.pause().await;
        assert_eq!(paused.state, SessionState::Paused);
        assert_eq!(paused.remaining_time, 900);
        assert!(h.scheduler.pending().is_empty());
        assert_eq!(h.notifier.last_badge().unwrap().text, "||");

        h.clock.advance(Duration::hours(2));
        let resumed = h.machine.resume().await;
        assert_eq!(resumed.state, SessionState::Focus);
        assert_eq!(h.machine.remaining_secs().await, 900);
        assert_eq!(
            h.scheduler.deadline(&resumed.deadline_name()),
            Some(h.clock.now() + Duration::seconds(900))
        );
        assert_eq!(signals(&h), 3);
    }

    #[tokio::test]
    async fn pause_and_resume_are_noops_in_wrong_state() {
        let h = harness();
        assert_eq!(h.machine.pause().await.state, SessionState::Idle);
        h.machine.start(60, SessionKind::Break).await.unwrap();
        assert_eq!(h.machine.resume().await.state, SessionState::Break);
        assert_eq!(signals(&h), 1);
    }

    #[tokio::test]
    async fn deadline_completes_matching_session_only() {
        let h = harness();
        let first = h.machine.start(60, SessionKind::Focus).await.unwrap();
        let second = h.machine.start(60, SessionKind::Focus).await.unwrap();

        assert!(!h.machine.on_deadline_fired(&first.deadline_name()).await);
        assert!(h.machine.snapshot().await.is_running());

        h.clock.advance(Duration::seconds(60));
        assert!(h.machine.on_deadline_fired(&second.deadline_name()).await);
        assert!(!h.machine.snapshot().await.is_live());

        let notes = h.notifier.notifications();
        assert_eq!(notes.last().unwrap().title, "Focus Session Complete!");
        let ended = h.stats.ended.lock().unwrap().clone();
        assert_eq!(ended.len(), 2);
        assert!(ended[1].is_completed_focus());
    }

    #[tokio::test]
    async fn deadline_for_paused_session_is_ignored() {
        let h = harness();
        let s = h.machine.start(60, SessionKind::Focus).await.unwrap();
        h.machine.pause().await;
        assert!(!h.machine.on_deadline_fired(&s.deadline_name()).await);
        assert!(h.machine.snapshot().await.is_paused());
    }

    #[tokio::test]
    async fn scheduler_failure_is_covered_by_resync() {
        let h = harness();
        h.scheduler.set_failing(true);
        h.machine.start(60, SessionKind::Focus).await.unwrap();
        assert!(h.scheduler.pending().is_empty());
        assert!(h.machine.resync().await.is_none());

        h.clock.advance(Duration::seconds(61));
        let ended = h.machine.resync().await.unwrap();
        assert!(ended.completed);
        assert!(!h.machine.snapshot().await.is_live());
    }

    #[tokio::test]
    async fn stats_failure_still_signals_end() {
        let h = harness_with(RecordingStats {
            fail: true,
            ..Default::default()
        });
        h.machine.start(60, SessionKind::Focus).await.unwrap();
        let ended = h.machine.end(false).await.unwrap();
        assert_eq!(ended.kind, Some(SessionKind::Focus));
        assert!(!h.machine.snapshot().await.is_live());
        assert_eq!(signals(&h), 2);
        assert!(h.machine.end(false).await.is_none());
        assert_eq!(signals(&h), 2);
    }

    #[tokio::test]
    async fn store_outage_does_not_block_transitions() {
        let h = harness();
        h.store.set_offline(true);
        let s = h.machine.start(60, SessionKind::Focus).await.unwrap();
        assert!(s.is_running());
        assert!(h.machine.end(false).await.is_some());
    }

    #[tokio::test]
    async fn restore_completes_elapsed_and_reschedules_future() {
        let h = harness();
        let running = Session::running(SessionKind::Focus, 600, h.clock.now());
        save(h.store.as_ref(), keys::SESSION, &running).await.unwrap();

        let restored = h.machine.restore().await;
        assert_eq!(restored.id, running.id);
        assert_eq!(h.scheduler.deadline(&running.deadline_name()), running.end_time);

        let h = harness();
        let stale = Session::running(SessionKind::Focus, 600, h.clock.now() - Duration::hours(1));
        save(h.store.as_ref(), keys::SESSION, &stale).await.unwrap();
        assert!(!h.machine.restore().await.is_live());
        assert!(h.stats.ended.lock().unwrap()[0].completed);
    }

    #[tokio::test]
    async fn reload_adopts_pause_from_another_writer() {
        let h = harness();
        let s = h.machine.start(1500, SessionKind::Focus).await.unwrap();
        assert!(!h.machine.reload().await);

        let mut paused = s.clone();
        paused.pause_at(h.clock.now() + Duration::seconds(60));
        save(h.store.as_ref(), keys::SESSION, &paused).await.unwrap();

        assert!(h.machine.reload().await);
        assert!(h.machine.snapshot().await.is_paused());
        assert!(h.scheduler.pending().is_empty());

        h.clock.advance(Duration::minutes(30));
        assert!(h.machine.resync().await.is_none());
        let stored: Session = load(h.store.as_ref(), keys::SESSION).await.unwrap().unwrap();
        assert_eq!(stored.state, SessionState::Paused);
        assert!(h.stats.ended.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reload_schedules_session_started_elsewhere() {
        let h = harness();
        let elsewhere = Session::running(SessionKind::Focus, 600, h.clock.now());
        save(h.store.as_ref(), keys::SESSION, &elsewhere).await.unwrap();

        assert!(h.machine.reload().await);
        assert_eq!(
            h.scheduler.deadline(&elsewhere.deadline_name()),
            elsewhere.end_time
        );
        assert_eq!(signals(&h), 1);
        h.clock.advance(Duration::seconds(600));
        assert!(h.machine.on_deadline_fired(&elsewhere.deadline_name()).await);
    }

    #[tokio::test]
    async fn reload_writes_back_after_failed_persist() {
        let h = harness();
        h.store.set_offline(true);
        let s = h.machine.start(1500, SessionKind::Focus).await.unwrap();
        h.store.set_offline(false);

        assert!(!h.machine.reload().await);
        assert_eq!(h.machine.snapshot().await.id, s.id);
        let stored: Session = load(h.store.as_ref(), keys::SESSION).await.unwrap().unwrap();
        assert_eq!(stored.id, s.id);
    }

    #[tokio::test]
    async fn resume_persists_before_scheduling() {
        let h = harness();
        h.machine.start(1500, SessionKind::Focus).await.unwrap();
        h.machine.pause().await;
        h.scheduler.set_failing(true);
        let resumed = h.machine.resume().await;
        let stored: Session = load(h.store.as_ref(), keys::SESSION).await.unwrap().unwrap();
        assert_eq!(stored, resumed);
        assert!(h.scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn break_reminder_fires_once() {
        let h = harness();
        h.machine.start(25 * 60, SessionKind::Focus).await.unwrap();
        assert!(!h.machine.maybe_remind().await);

        h.clock.advance(Duration::minutes(20));
        assert!(h.machine.maybe_remind().await);
        assert!(!h.machine.maybe_remind().await);
        assert_eq!(h.notifier.notifications().last().unwrap().title, "Break Coming Up");
    }
}

//! Process-wide wiring.
//!
//! [`FocusRuntime`] is built once at startup and owns one of each component.
//! Hosts feed it [`HostEvent`]s; [`FocusRuntime::run`] does that from the
//! store change stream, the deadline channel and a heartbeat interval.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::blocking::{BlockingEngine, EngineOptions, SiteLists};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::Result;
use crate::events::{EventBus, SharedEventBus};
use crate::interceptor::NetworkInterceptor;
use crate::notify::Notifier;
use crate::scheduler::{DeadlineFired, DeadlineScheduler};
use crate::session::{MachineOptions, Session, SessionCollaborators, SessionKind, SessionMachine};
use crate::stats::{StatsRecorder, StoreStats};
use crate::store::{keys, KeyValueStore, StoreChange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

/// Inputs from the host environment.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    StoreChanged(StoreChange),
    DeadlineFired(String),
    IdleStateChanged(IdleState),
}

/// Collaborators supplied by the host.
pub struct RuntimeParts {
    pub store: Arc<dyn KeyValueStore>,
    pub interceptor: Arc<dyn NetworkInterceptor>,
    pub scheduler: Arc<dyn DeadlineScheduler>,
    pub clock: Arc<dyn Clock>,
    pub notifier: Arc<dyn Notifier>,
    pub stats: Arc<dyn StatsRecorder>,
}

impl RuntimeParts {
    /// Parts with stats kept in `store`.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        interceptor: Arc<dyn NetworkInterceptor>,
        scheduler: Arc<dyn DeadlineScheduler>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let stats = Arc::new(StoreStats::new(store.clone()));
        Self {
            store,
            interceptor,
            scheduler,
            clock,
            notifier,
            stats,
        }
    }
}

pub struct FocusRuntime {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    events: SharedEventBus,
    engine: Arc<BlockingEngine>,
    machine: Arc<SessionMachine>,
    sites: SiteLists,
}

impl FocusRuntime {
    pub fn new(config: Config, parts: RuntimeParts) -> Self {
        let events: SharedEventBus = Arc::new(EventBus::default());
        let engine = Arc::new(BlockingEngine::new(
            parts.store.clone(),
            parts.interceptor,
            parts.clock.clone(),
            events.clone(),
            EngineOptions::from(&config.blocking),
        ));
        let machine = Arc::new(SessionMachine::new(
            SessionCollaborators {
                store: parts.store.clone(),
                scheduler: parts.scheduler,
                clock: parts.clock,
                stats: parts.stats,
                notifier: parts.notifier,
                blocking: engine.clone(),
                events: events.clone(),
            },
            MachineOptions::from(&config),
        ));
        let sites = SiteLists::new(parts.store.clone());
        Self {
            config,
            store: parts.store,
            events,
            engine,
            machine,
            sites,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn engine(&self) -> &BlockingEngine {
        &self.engine
    }

    pub fn sites(&self) -> &SiteLists {
        &self.sites
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Initialize the engine and restore the persisted session.
    pub async fn start(&self) -> Session {
        self.engine.initialize().await;
        self.machine.restore().await
    }

    /// Start a session, using the configured length when `minutes` is None.
    pub async fn start_session(&self, kind: SessionKind, minutes: Option<u32>) -> Result<Session> {
        let minutes = minutes.unwrap_or(match kind {
            SessionKind::Focus => self.config.session.focus_minutes,
            SessionKind::Break => self.config.session.break_minutes,
        });
        self.machine.start(u64::from(minutes) * 60, kind).await
    }

    pub async fn handle(&self, event: HostEvent) {
        match event {
            HostEvent::StoreChanged(change) => {
                if keys::BLOCKING_INPUTS.contains(&change.key.as_str()) {
                    tracing::debug!(key = %change.key, "Blocking input changed");
                    self.engine.update().await;
                }
            }
            HostEvent::DeadlineFired(name) => {
                self.machine.reload().await;
                self.machine.on_deadline_fired(&name).await;
            }
            HostEvent::IdleStateChanged(state) => match state {
                IdleState::Idle | IdleState::Locked if self.config.idle.pause_on_idle => {
                    self.machine.reload().await;
                    let session = self.machine.pause().await;
                    if session.is_paused() {
                        tracing::info!(?state, "Paused session on idle");
                    }
                }
                _ => {}
            },
        }
    }

    /// Periodic backstop: sessions changed by other processes, overdue
    /// sessions, expired allowances, reminder, badge.
    pub async fn heartbeat(&self) {
        self.machine.reload().await;
        self.machine.resync().await;
        self.engine.sweep_allowances().await;
        self.machine.maybe_remind().await;
        self.machine.refresh_badge().await;
    }

    /// Remove block rules before the process exits.
    pub async fn shutdown(&self) {
        if let Err(e) = self.engine.clear_all().await {
            tracing::error!("Could not clear block rules on shutdown: {}", e);
        }
        tracing::info!("Runtime stopped");
    }

    /// Drive the runtime until `shutdown` resolves.
    pub async fn run<F>(
        self: Arc<Self>,
        mut deadlines: mpsc::UnboundedReceiver<DeadlineFired>,
        shutdown: F,
    ) where
        F: Future<Output = ()>,
    {
        let mut changes = self.store.subscribe();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat.interval());
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        self.start().await;
        tracing::info!("Runtime running");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                change = changes.recv() => match change {
                    Ok(change) => {
                        // Spawned so bursts of edits reach the debounce concurrently.
                        let runtime = self.clone();
                        tokio::spawn(async move {
                            runtime.handle(HostEvent::StoreChanged(change)).await;
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Store change stream lagged, reconciling");
                        self.engine.update_now().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                Some(fired) = deadlines.recv() => {
                    self.handle(HostEvent::DeadlineFired(fired.name)).await;
                }
                _ = heartbeat.tick() => self.heartbeat().await,
            }
        }

        self.shutdown().await;
    }
}

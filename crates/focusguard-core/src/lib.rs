//! # FocusGuard Core Library
//!
//! This library provides the core logic for timed focus sessions that block
//! distracting sites. Every operation is available through the standalone
//! `focusguard` CLI; any other front end is a thin layer over the same core.
//!
//! ## Architecture
//!
//! - **Session Machine**: focus/break/pause lifecycle driven by one named
//!   deadline per running session, with a heartbeat resync as backstop
//! - **Blocking Engine**: turns the block list, whitelist, temporary
//!   allowances and session state into installed network-intercept rules
//! - **Storage**: async key-value store (SQLite or in-memory) and TOML
//!   configuration
//!
//! ## Key Components
//!
//! - [`SessionMachine`]: session state machine
//! - [`BlockingEngine`]: rule reconciliation with debounce and fail-safe clear
//! - [`FocusRuntime`]: wires the components together and consumes host events
//! - [`Config`]: application configuration management

pub mod blocking;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod interceptor;
pub mod notify;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod store;

pub use blocking::{
    BlockListEntry, BlockingEngine, BlockingSignal, EngineOptions, EnginePhase, SiteLists,
    SitePattern, TemporaryAllowance,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{
    ConfigError, CoreError, RuleApplyError, ScheduleError, StoreError, ValidationError,
};
pub use events::{Event, EventBus};
pub use interceptor::{InterceptRule, MemoryInterceptor, NetworkInterceptor, RuleFileInterceptor};
pub use notify::{Badge, LogNotifier, Notification, Notifier};
pub use runtime::{FocusRuntime, HostEvent, IdleState, RuntimeParts};
pub use scheduler::{DeadlineFired, DeadlineScheduler, ManualScheduler, TokioScheduler};
pub use session::{Session, SessionKind, SessionMachine, SessionState};
pub use stats::{StatsRecorder, StoreStats};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};

//! Builds the core runtime over the on-disk store and rule file.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

use focusguard_core::store::data_dir;
use focusguard_core::{
    Clock, Config, DeadlineFired, FocusRuntime, RuleFileInterceptor, RuntimeParts, SqliteStore,
    SystemClock, TokioScheduler,
};

use crate::notifier::ConsoleNotifier;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub const DB_FILE: &str = "focusguard.db";
pub const RULES_FILE: &str = "rules.json";

/// Open the runtime over `~/.config/focusguard/`.
pub fn open_runtime(
    config: Config,
) -> CliResult<(Arc<FocusRuntime>, mpsc::UnboundedReceiver<DeadlineFired>)> {
    let dir = data_dir()?;
    let store = Arc::new(SqliteStore::open(&dir.join(DB_FILE))?);
    let interceptor = Arc::new(RuleFileInterceptor::new(dir.join(RULES_FILE)));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (scheduler, deadlines) = TokioScheduler::new(clock.clone());

    let parts = RuntimeParts::new(
        store,
        interceptor,
        Arc::new(scheduler),
        clock,
        Arc::new(ConsoleNotifier),
    );
    Ok((Arc::new(FocusRuntime::new(config, parts)), deadlines))
}

/// Load config, start the runtime and run one command against it.
///
/// Starting restores the persisted session, so a session whose end time
/// passed while no process was running is completed here.
pub fn with_runtime<F, Fut>(f: F) -> CliResult
where
    F: FnOnce(Arc<FocusRuntime>) -> Fut,
    Fut: Future<Output = CliResult>,
{
    let config = Config::load()?;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(async move {
        let (runtime, _deadlines) = open_runtime(config)?;
        runtime.start().await;
        f(runtime).await
    })
}

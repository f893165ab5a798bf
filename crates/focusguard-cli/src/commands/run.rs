use focusguard_core::Config;

use crate::context::{open_runtime, CliResult};

/// Run the runtime in the foreground until Ctrl-C. Deadlines fire on time,
/// the heartbeat sweeps allowances, and block rules are cleared on exit.
pub fn run() -> CliResult {
    let config = Config::load()?;
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(async move {
        let (runtime, deadlines) = open_runtime(config)?;
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        runtime.run(deadlines, shutdown).await;
        CliResult::Ok(())
    })
}

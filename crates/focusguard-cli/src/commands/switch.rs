use crate::context::{with_runtime, CliResult};

/// Turn blocking on or off without touching the lists.
pub fn run(enabled: bool) -> CliResult {
    with_runtime(|runtime| async move {
        runtime.sites().set_enabled(enabled).await?;
        runtime.engine().update_now().await;
        println!("blocking {}", if enabled { "enabled" } else { "disabled" });
        CliResult::Ok(())
    })
}

use crate::context::{with_runtime, CliResult};

/// Print installed intercept rules as JSON.
pub fn list() -> CliResult {
    with_runtime(|runtime| async move {
        let rules = runtime.engine().installed_rules().await;
        println!("{}", serde_json::to_string_pretty(&rules)?);
        CliResult::Ok(())
    })
}

/// Report whether the installed rules redirect `url`.
pub fn check(url: String) -> CliResult {
    with_runtime(|runtime| async move {
        let verdict = if runtime.engine().is_blocked(&url).await {
            "blocked"
        } else {
            "allowed"
        };
        println!("{verdict}");
        CliResult::Ok(())
    })
}

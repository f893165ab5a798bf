use crate::context::{with_runtime, CliResult};

/// Unblock `site` for `minutes`.
pub fn run(site: String, minutes: u64) -> CliResult {
    with_runtime(|runtime| async move {
        let allowance = runtime.engine().allow_temporarily(&site, minutes).await?;
        println!("{}", serde_json::to_string_pretty(&allowance)?);
        CliResult::Ok(())
    })
}

use clap::Subcommand;

use crate::context::{with_runtime, CliResult};

#[derive(Subcommand)]
pub enum WhitelistAction {
    /// Never block a site
    Add { site: String },
    /// Remove a site from the whitelist
    Remove { site: String },
    /// List whitelisted sites
    List,
}

pub fn run(action: WhitelistAction) -> CliResult {
    with_runtime(|runtime| async move {
        let sites = runtime.sites();
        match action {
            WhitelistAction::Add { site } => {
                let key = sites.add_whitelisted(&site).await?;
                println!("whitelisted: {key}");
            }
            WhitelistAction::Remove { site } => {
                if sites.remove_whitelisted(&site).await? {
                    println!("removed: {site}");
                } else {
                    println!("not whitelisted: {site}");
                }
            }
            WhitelistAction::List => {
                for site in sites.whitelist().await? {
                    println!("{site}");
                }
                return Ok(());
            }
        }
        runtime.engine().update_now().await;
        CliResult::Ok(())
    })
}

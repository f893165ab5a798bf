use clap::Subcommand;

use crate::context::{with_runtime, CliResult};

#[derive(Subcommand)]
pub enum BlockAction {
    /// Add a site (domain, URL, or "regex:<expr>")
    Add { site: String },
    /// Remove a site
    Remove { site: String },
    /// Flip a site between active and inactive
    Toggle { site: String },
    /// List the block list
    List {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: BlockAction) -> CliResult {
    with_runtime(|runtime| async move {
        let sites = runtime.sites();
        match action {
            BlockAction::Add { site } => {
                let entry = sites.add_blocked(&site).await?;
                println!("blocked: {}", entry.pattern);
            }
            BlockAction::Remove { site } => {
                if sites.remove_blocked(&site).await? {
                    println!("removed: {site}");
                } else {
                    println!("not in block list: {site}");
                }
            }
            BlockAction::Toggle { site } => match sites.toggle_blocked(&site).await? {
                Some(true) => println!("active: {site}"),
                Some(false) => println!("inactive: {site}"),
                None => println!("not in block list: {site}"),
            },
            BlockAction::List { json } => {
                let list = sites.block_list().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&list)?);
                } else {
                    for entry in list {
                        let mark = if entry.is_active { "x" } else { " " };
                        println!("[{mark}] {}", entry.pattern);
                    }
                }
                return Ok(());
            }
        }
        runtime.engine().update_now().await;
        CliResult::Ok(())
    })
}

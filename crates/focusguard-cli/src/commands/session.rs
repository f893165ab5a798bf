use chrono::{Local, Utc};
use clap::Subcommand;
use serde::Serialize;

use focusguard_core::{Session, SessionKind, StoreStats};

use crate::context::{with_runtime, CliResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a focus session
    Start {
        /// Length in minutes (defaults to session.focus_minutes)
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Start a break
    Break {
        /// Length in minutes (defaults to session.break_minutes)
        #[arg(long)]
        minutes: Option<u32>,
    },
    /// Pause the running session
    Pause,
    /// Resume a paused session
    Resume,
    /// End the current session early
    End,
    /// Print current session state as JSON
    Status,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    session: Session,
    remaining_secs: u64,
    remaining_minutes: u64,
    progress_percent: u64,
    current_streak: u32,
    focus_sessions_today: u32,
}

pub fn run(action: SessionAction) -> CliResult {
    with_runtime(|runtime| async move {
        let machine = runtime.machine();
        match action {
            SessionAction::Start { minutes } => {
                let session = runtime.start_session(SessionKind::Focus, minutes).await?;
                println!("{}", serde_json::to_string_pretty(&session)?);
            }
            SessionAction::Break { minutes } => {
                let session = runtime.start_session(SessionKind::Break, minutes).await?;
                println!("{}", serde_json::to_string_pretty(&session)?);
            }
            SessionAction::Pause => {
                let session = machine.pause().await;
                println!("{}", serde_json::to_string_pretty(&session)?);
            }
            SessionAction::Resume => {
                let session = machine.resume().await;
                println!("{}", serde_json::to_string_pretty(&session)?);
            }
            SessionAction::End => match machine.end(false).await {
                Some(ended) => println!("{}", serde_json::to_string_pretty(&ended)?),
                None => println!("{{\"type\": \"no_session\"}}"),
            },
            SessionAction::Status => {
                let session = machine.snapshot().await;
                let now = Utc::now();
                let stats = StoreStats::new(runtime.store().clone());
                let streak = stats.streak().await?;
                let today = stats.daily(Local::now().date_naive()).await?;
                let view = StatusView {
                    remaining_secs: session.remaining_secs(now),
                    remaining_minutes: session.remaining_minutes(now),
                    progress_percent: session.progress_percent(now),
                    current_streak: streak.current_streak,
                    focus_sessions_today: today.focus_sessions,
                    session,
                };
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
        }
        CliResult::Ok(())
    })
}

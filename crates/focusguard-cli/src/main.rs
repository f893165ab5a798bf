use clap::{Parser, Subcommand};
use focusguard_core::Config;

mod commands;
mod context;
mod logging;
mod notifier;

#[derive(Parser)]
#[command(name = "focusguard", version, about = "Focus sessions with site blocking")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Focus and break sessions
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Block list management
    Block {
        #[command(subcommand)]
        action: commands::block::BlockAction,
    },
    /// Whitelist management
    Whitelist {
        #[command(subcommand)]
        action: commands::whitelist::WhitelistAction,
    },
    /// Temporarily allow a blocked site
    Allow {
        site: String,
        /// Minutes until the site is blocked again
        #[arg(long, default_value = "5")]
        minutes: u64,
    },
    /// Turn blocking on
    Enable,
    /// Turn blocking off
    Disable,
    /// Print installed intercept rules
    Rules,
    /// Check whether a URL is currently blocked
    Check { url: String },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Run in the foreground: fire deadlines, sweep allowances, clear rules on exit
    Run,
}

fn main() {
    let cli = Cli::parse();
    let level = Config::load_or_default().logging.level;
    logging::setup(&level, cli.verbose);

    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action),
        Commands::Block { action } => commands::block::run(action),
        Commands::Whitelist { action } => commands::whitelist::run(action),
        Commands::Allow { site, minutes } => commands::allow::run(site, minutes),
        Commands::Enable => commands::switch::run(true),
        Commands::Disable => commands::switch::run(false),
        Commands::Rules => commands::rules::list(),
        Commands::Check { url } => commands::rules::check(url),
        Commands::Config { action } => commands::config::run(action),
        Commands::Run => commands::run::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

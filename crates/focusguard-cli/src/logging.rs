//! Logging setup for the CLI.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install a stderr fmt layer. `RUST_LOG` wins over `default_level`;
/// `verbose` forces debug.
pub fn setup(default_level: &str, verbose: bool) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) if !verbose => filter,
        _ => EnvFilter::new(if verbose { "debug" } else { default_level }),
    };

    // stdout carries command output, so logs go to stderr.
    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    if tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: logging was already initialized");
    }
}

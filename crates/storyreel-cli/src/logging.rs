//! Logging initialization.

use crate::config::CliConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the level derived from `-v`/`-q`.
/// Logs go to stderr so stdout stays clean for `list` output.
pub fn init_logging(config: &CliConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()));

    if config.log_json {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    } else {
        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_ansi(config.color.should_color())
            .with_target(config.verbosity.is_verbose())
            .finish();
        tracing::subscriber::set_global_default(subscriber).ok();
    }
}

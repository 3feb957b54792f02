//! Tracing initialisation for the `legalflow` binary.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter variable checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "LEGALFLOW_LOG";

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON instead of human-readable lines.
/// * `level`: default verbosity when neither `LEGALFLOW_LOG` nor `RUST_LOG`
///   is set.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
pub fn init_tracing(json: bool, level: Level) {
    let filter = env_filter(level);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

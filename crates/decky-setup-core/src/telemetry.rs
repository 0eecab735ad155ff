//! Centralised tracing initialisation for the decky-setup binary.
//!
//! Call [`init_tracing`] once at program start. Subsequent calls are silently
//! ignored (the global subscriber can only be set once per process).

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "DECKY_SETUP_LOG";

/// Build the filter: `DECKY_SETUP_LOG`, then `RUST_LOG`, then `level`.
///
/// The HTTP stack is capped at `warn` unless a directive says otherwise, so
/// installer downloads do not flood the console.
pub fn build_filter(level: Level) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV) {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn",
            level.as_str().to_lowercase()
        ))
    })
}

/// Initialise the global tracing subscriber.
///
/// * `json`: when `true`, emit newline-delimited JSON log lines.
/// * `level`: default verbosity when no filter variable is set.
///
/// Logs go to stderr so the run report on stdout stays machine-readable.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = build_filter(level);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

//! Structured logging setup (§4.10): `tracing` + `tracing-subscriber` to
//! stderr by default, with an optional non-blocking file appender mirroring
//! output to `log_dir/virtwho.log` when file logging is enabled.

use std::path::Path;

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Holds the file appender's worker guard alive for the process lifetime;
/// dropping it would stop background log flushing.
pub struct LoggingGuard(#[allow(dead_code)] Option<tracing_appender::non_blocking::WorkerGuard>);

/// Initializes the global subscriber. `debug` raises the default filter
/// level; `log_dir`, when set, enables the mirrored file appender
/// (§6: `log_dir/virtwho.log`).
pub fn init(debug: bool, log_dir: Option<&Path>) -> LoggingGuard {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_dir {
        Some(dir) => {
            let _ = std::fs::create_dir_all(dir);
            let appender = tracing_appender::rolling::never(dir, "virtwho.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let writer = non_blocking.and(std::io::stderr);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .init();
            LoggingGuard(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            LoggingGuard(None)
        }
    }
}

//! Log output setup.
//!
//! All components log through the `tracing` macros. This module installs the
//! subscriber once at startup. With `non_blocking` enabled, formatted lines
//! are handed to a background writer thread so the reactor never waits on
//! stdout.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Installs the global subscriber.
///
/// Returns the flush guard when buffered output is enabled; keep it alive
/// until the process exits or buffered lines are lost. `RUST_LOG` takes
/// precedence over the configured level. A second call is a no-op.
pub fn init(cfg: &LogConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_ansi(cfg.ansi);

    if cfg.non_blocking {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        match builder.with_writer(writer).try_init() {
            Ok(()) => Some(guard),
            Err(e) => {
                already_installed(&*e);
                None
            }
        }
    } else {
        if let Err(e) = builder.try_init() {
            already_installed(&*e);
        }
        None
    }
}

fn already_installed(e: &(dyn std::error::Error + Send + Sync)) {
    // Goes to whichever subscriber won the race.
    tracing::debug!(error = %e, "Log subscriber already installed");
}

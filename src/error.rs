//! Startup and fatal server errors.
//!
//! Per-connection failures never surface here; they end as an HTTP error
//! response or a silent teardown inside the connection.

use std::io;

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to create readiness poller: {0}")]
    Poller(#[source] io::Error),

    #[error("failed to install signal bridge: {0}")]
    SignalBridge(#[source] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to start worker thread {index}: {source}")]
    WorkerSpawn {
        index: usize,
        #[source]
        source: io::Error,
    },

    #[error("readiness wait failed: {0}")]
    Wait(#[source] io::Error),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

use std::net::TcpListener;

use anyhow::Context;
use tracing::info;

use crate::config::Config;
use crate::error::ServerError;
use crate::server::reactor::Reactor;

/// Binds a non-blocking listening socket.
pub fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    let bind_err = |source| ServerError::Bind {
        addr: addr.to_string(),
        source,
    };
    let listener = TcpListener::bind(addr).map_err(bind_err)?;
    listener.set_nonblocking(true).map_err(bind_err)?;
    Ok(listener)
}

/// Serves `cfg` until a termination signal arrives.
pub fn run(cfg: &Config) -> anyhow::Result<()> {
    let mut reactor = Reactor::new(cfg).context("failed to start server")?;
    info!(
        workers = cfg.server.workers,
        max_connections = cfg.server.max_connections,
        "Server initialized"
    );
    reactor.run().context("event loop terminated")?;
    info!("Server stopped");
    Ok(())
}

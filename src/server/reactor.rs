//! The event loop.
//!
//! One thread owns the poller, the listening socket, the signal pipe, the
//! connection table and the timer list. It accepts, reads, writes and
//! sweeps; request processing runs on the worker pool.
//!
//! A connection socket is always registered one-shot. Once an event for it
//! is delivered, nothing more arrives until someone calls
//! [`Poller::rearm`]: the reactor after a write, or the worker after
//! `process()`. That is what keeps a connection on one thread at a time.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::{Config, ServerConfig};
use crate::error::ServerError;
use crate::http::connection::{ConnectionError, HttpConnection, ProcessResult, WriteStatus};
use crate::server::listener;
use crate::server::poller::{Event, Events, Interest, Poller};
use crate::server::pool::{Task, WorkerPool};
use crate::server::signal::{ShutdownHandle, SignalBridge};
use crate::server::timer::{TimerId, TimerList};

/// Sent to a client refused for lack of capacity, before the socket closes.
const BUSY_MESSAGE: &[u8] = b"Internal server busy";

/// Counters kept across every `process()` dispatch.
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatched: AtomicUsize,
    overlapping: AtomicUsize,
}

impl DispatchStats {
    /// Number of `process()` calls run on the pool.
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Calls that started while another call for the same connection was
    /// still in flight. Always zero unless the one-shot re-arm is broken.
    pub fn overlapping(&self) -> usize {
        self.overlapping.load(Ordering::Relaxed)
    }
}

/// Runs `process()` for one connection on a worker, then re-arms it.
pub struct ConnectionTask {
    conn: Arc<Mutex<HttpConnection>>,
    in_flight: Arc<AtomicUsize>,
    stats: Arc<DispatchStats>,
    poller: Arc<Poller>,
}

impl Task for ConnectionTask {
    fn run(self) {
        if self.in_flight.fetch_add(1, Ordering::AcqRel) != 0 {
            self.stats.overlapping.fetch_add(1, Ordering::Relaxed);
            tracing::error!("Connection dispatched to two workers at once");
        }
        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);

        let mut conn = self.conn.lock();
        let result = conn.process();
        let fd = conn.fd();
        if result == ProcessResult::Close {
            // The reactor sees the hang-up and tears the connection down.
            conn.shutdown();
        }
        drop(conn);
        // Must be released before the re-arm lets the next event through.
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        let interest = match result {
            ProcessResult::ResponseReady => Interest::Writable,
            ProcessResult::NeedMore | ProcessResult::Close => Interest::Readable,
        };
        if let Err(e) = self.poller.rearm(fd, interest) {
            // The reactor already dropped this connection.
            tracing::debug!(fd, error = %e, "Failed to re-arm connection");
        }
    }
}

struct Client {
    conn: Arc<Mutex<HttpConnection>>,
    in_flight: Arc<AtomicUsize>,
    peer: SocketAddr,
    timer: TimerId,
}

pub struct Reactor {
    config: Arc<ServerConfig>,
    doc_root: Arc<Path>,
    poller: Arc<Poller>,
    listener: TcpListener,
    signals: SignalBridge,
    pool: WorkerPool<ConnectionTask>,
    stats: Arc<DispatchStats>,
    connections: HashMap<RawFd, Client>,
    timers: TimerList<RawFd>,
    events: Events,
    timer_due: bool,
    stop: bool,
}

impl Reactor {
    /// Creates every resource the loop needs. Nothing is accepted until
    /// [`run`](Self::run) is called.
    pub fn new(config: &Config) -> Result<Self, ServerError> {
        config.validate()?;
        let server = Arc::new(config.server.clone());

        let poller = Arc::new(Poller::new().map_err(ServerError::Poller)?);
        let listener = listener::bind(&server.listen_addr)?;
        let signals = SignalBridge::install().map_err(ServerError::SignalBridge)?;

        poller
            .register(listener.as_raw_fd(), Interest::Readable, false, false)
            .map_err(ServerError::Poller)?;
        poller
            .register(signals.fd(), Interest::Readable, false, false)
            .map_err(ServerError::SignalBridge)?;

        let pool = WorkerPool::new(server.workers, server.queue_capacity)?;

        Ok(Self {
            doc_root: Arc::from(server.doc_root.as_path()),
            events: Events::with_capacity(server.max_events),
            config: server,
            poller,
            listener,
            signals,
            pool,
            stats: Arc::default(),
            connections: HashMap::new(),
            timers: TimerList::new(),
            timer_due: false,
            stop: false,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.signals.shutdown_handle()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Shared dispatch counters; still readable after `run` moved the
    /// reactor to another thread.
    pub fn stats(&self) -> Arc<DispatchStats> {
        Arc::clone(&self.stats)
    }

    fn idle_timeout(&self) -> Duration {
        self.config.idle_timeout()
    }

    /// Runs until a termination request arrives or the wait call fails.
    pub fn run(&mut self) -> Result<(), ServerError> {
        self.signals
            .start_alarm(self.config.timeslot())
            .map_err(ServerError::SignalBridge)?;

        let addr = self.local_addr().map_err(ServerError::Poller)?;
        tracing::info!(
            addr = %addr,
            doc_root = %self.config.doc_root.display(),
            idle_timeout_ms = self.idle_timeout().as_millis() as u64,
            "Listening"
        );

        while !self.stop {
            match self.poller.wait(&mut self.events, None) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Readiness wait failed");
                    self.close_all();
                    return Err(ServerError::Wait(e));
                }
            }

            for i in 0..self.events.len() {
                if let Some(event) = self.events.get(i) {
                    self.dispatch(event);
                }
            }

            if self.timer_due {
                self.sweep_timers();
                self.timer_due = false;
            }
        }

        tracing::info!(connections = self.connections.len(), "Shutting down");
        self.close_all();
        Ok(())
    }

    fn dispatch(&mut self, event: Event) {
        let fd = event.fd();

        if fd == self.listener.as_raw_fd() {
            self.accept_clients();
        } else if fd == self.signals.fd() {
            let flags = self.signals.drain();
            self.timer_due |= flags.timer_due;
            self.stop |= flags.stop;
        } else if event.is_hangup() {
            self.close_connection(fd, "hang-up");
        } else if event.is_readable() {
            self.on_readable(fd);
        } else if event.is_writable() {
            self.on_writable(fd);
        }
    }

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nonblocking(true) {
            tracing::warn!(peer = %peer, error = %e, "Failed to make socket non-blocking");
            return;
        }

        if self.connections.len() >= self.config.max_connections {
            tracing::warn!(
                peer = %peer,
                limit = self.config.max_connections,
                "Connection limit reached, rejecting client"
            );
            if let Err(e) = (&stream).write_all(BUSY_MESSAGE) {
                tracing::debug!(peer = %peer, error = %e, "Failed to send busy notice");
            }
            return;
        }

        let fd = stream.as_raw_fd();
        let conn = HttpConnection::new(stream, peer, Arc::clone(&self.doc_root));
        if let Err(e) = self.poller.register(fd, Interest::Readable, true, true) {
            tracing::warn!(peer = %peer, error = %e, "Failed to register connection");
            return;
        }

        let timer = self.timers.insert(Instant::now() + self.idle_timeout(), fd);
        self.connections.insert(
            fd,
            Client {
                conn: Arc::new(Mutex::new(conn)),
                in_flight: Arc::default(),
                peer,
                timer,
            },
        );

        tracing::info!(
            peer = %peer,
            fd,
            connections = self.connections.len(),
            "Accepted connection"
        );
    }

    fn on_readable(&mut self, fd: RawFd) {
        let Some(client) = self.connections.get(&fd) else {
            return;
        };
        let conn = Arc::clone(&client.conn);
        let in_flight = Arc::clone(&client.in_flight);
        let timer = client.timer;

        let read = {
            let mut guard = conn.lock();
            let read = guard.read();
            if read.is_ok() {
                guard.begin_processing();
            }
            read
        };

        match read {
            Ok(n) => {
                tracing::trace!(fd, bytes = n, "Read from client");
                self.timers
                    .reschedule_forward(timer, Instant::now() + self.idle_timeout());
                self.submit(fd, conn, in_flight);
            }
            Err(ConnectionError::PeerClosed) => self.close_connection(fd, "peer closed"),
            Err(ConnectionError::Io(e)) => {
                tracing::debug!(fd, error = %e, "Read failed");
                self.close_connection(fd, "read error");
            }
        }
    }

    fn on_writable(&mut self, fd: RawFd) {
        let Some(client) = self.connections.get(&fd) else {
            return;
        };
        let conn = Arc::clone(&client.conn);
        let in_flight = Arc::clone(&client.in_flight);
        let timer = client.timer;

        let status = conn.lock().write();
        match status {
            Ok(WriteStatus::Pending) => {
                self.timers
                    .reschedule_forward(timer, Instant::now() + self.idle_timeout());
                self.rearm(fd, Interest::Writable);
            }
            Ok(WriteStatus::KeepAlive { buffered: false }) => self.rearm(fd, Interest::Readable),
            Ok(WriteStatus::KeepAlive { buffered: true }) => self.submit(fd, conn, in_flight),
            Ok(WriteStatus::Close) => self.close_connection(fd, "response complete"),
            Err(e) => {
                tracing::debug!(fd, error = %e, "Write failed");
                self.close_connection(fd, "write error");
            }
        }
    }

    fn submit(
        &mut self,
        fd: RawFd,
        conn: Arc<Mutex<HttpConnection>>,
        in_flight: Arc<AtomicUsize>,
    ) {
        let task = ConnectionTask {
            conn,
            in_flight,
            stats: Arc::clone(&self.stats),
            poller: Arc::clone(&self.poller),
        };
        if self.pool.submit(task).is_err() {
            self.close_connection(fd, "task queue full");
        }
    }

    fn rearm(&mut self, fd: RawFd, interest: Interest) {
        if let Err(e) = self.poller.rearm(fd, interest) {
            tracing::warn!(fd, error = %e, "Failed to re-arm connection");
            self.close_connection(fd, "re-arm failed");
        }
    }

    /// Evicts every connection whose idle deadline has passed.
    fn sweep_timers(&mut self) {
        let now = Instant::now();
        let mut evicted = 0;
        while let Some((_, fd)) = self.timers.pop_expired(now) {
            self.close_connection(fd, "idle timeout");
            evicted += 1;
        }
        tracing::debug!(
            evicted,
            remaining = self.timers.len(),
            "Idle sweep finished"
        );
    }

    /// Deregisters the socket, drops its timer, and closes it.
    ///
    /// If a worker still holds the connection, the socket is closed when the
    /// worker lets go of it.
    fn close_connection(&mut self, fd: RawFd, reason: &'static str) {
        let Some(client) = self.connections.remove(&fd) else {
            return;
        };

        self.timers.remove(client.timer);
        if let Err(e) = self.poller.deregister(fd) {
            tracing::debug!(fd, error = %e, "Failed to deregister connection");
        }
        if let Some(conn) = client.conn.try_lock() {
            conn.shutdown();
        }

        tracing::info!(
            peer = %client.peer,
            reason,
            connections = self.connections.len(),
            "Closed connection"
        );
    }

    fn close_all(&mut self) {
        let fds: Vec<RawFd> = self.connections.keys().copied().collect();
        for fd in fds {
            self.close_connection(fd, "server shutdown");
        }
    }
}

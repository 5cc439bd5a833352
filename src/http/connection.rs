use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::sync::Arc;

use crate::http::file;
use crate::http::parser::RequestParser;
use crate::http::response::{Outcome, ResponseBuilder, WriteBufferFull};
use crate::http::writer::{ResponseWriter, WriteProgress};

/// Position of a connection in its read → process → write cycle.
///
/// The phase mirrors what the connection is armed for: while `Processing`,
/// its socket is disarmed in the reactor and exactly one worker owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Armed for read readiness, waiting for request bytes
    Reading,
    /// Disarmed, queued for or running on a worker
    Processing,
    /// Armed for write readiness, a response is queued
    Writing,
}

/// What `process()` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessResult {
    /// The request is incomplete; re-arm for reading.
    NeedMore,
    /// A response is queued; re-arm for writing.
    ResponseReady,
    /// No response can be produced; the connection must be torn down.
    Close,
}

/// What `write()` accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// The socket buffer filled up; re-arm for writing.
    Pending,
    /// Response sent on a keep-alive connection. `buffered` is set when a
    /// pipelined request is already waiting in the read buffer.
    KeepAlive { buffered: bool },
    /// Response sent and the client did not ask to keep the connection.
    Close,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("peer closed the connection")]
    PeerClosed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One client socket and everything needed to answer its requests.
///
/// None of the operations block: `read` and `write` stop at `WouldBlock`,
/// and `process` only looks at bytes already buffered.
pub struct HttpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    doc_root: Arc<Path>,
    parser: RequestParser,
    keep_alive: bool,
    writer: Option<ResponseWriter>,
    phase: Phase,
}

impl HttpConnection {
    /// Wraps an accepted, non-blocking socket.
    pub fn new(stream: TcpStream, peer: SocketAddr, doc_root: Arc<Path>) -> Self {
        Self {
            stream,
            peer,
            doc_root,
            parser: RequestParser::new(),
            keep_alive: false,
            writer: None,
            phase: Phase::Reading,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Called by the reactor right before the connection is handed to a
    /// worker.
    pub fn begin_processing(&mut self) {
        self.phase = Phase::Processing;
    }

    /// Drains the socket into the read buffer.
    ///
    /// Returns the number of bytes obtained, which may be zero. Stops early
    /// when the buffer is full; the parser reports the overflow.
    pub fn read(&mut self) -> Result<usize, ConnectionError> {
        let mut total = 0;

        while !self.parser.is_full() {
            match self.stream.read(self.parser.spare_mut()) {
                Ok(0) => return Err(ConnectionError::PeerClosed),
                Ok(n) => {
                    self.parser.advance(n);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(total)
    }

    /// Parses what has been buffered and, once a request is complete,
    /// resolves it and queues the response.
    pub fn process(&mut self) -> ProcessResult {
        debug_assert_eq!(self.phase, Phase::Processing);

        let outcome = match self.parser.parse() {
            Ok(None) => {
                self.phase = Phase::Reading;
                return ProcessResult::NeedMore;
            }
            Ok(Some(request)) => {
                self.keep_alive = request.keep_alive;
                let outcome = file::resolve(&self.doc_root, &request.target);
                tracing::debug!(
                    peer = %self.peer,
                    method = request.method.as_str(),
                    target = %request.target,
                    status = outcome.status().as_u16(),
                    "Request handled"
                );
                outcome
            }
            Err(e) => {
                tracing::debug!(peer = %self.peer, error = %e, "Malformed request");
                self.keep_alive = false;
                Outcome::BadRequest
            }
        };

        match self.queue_response(outcome) {
            Ok(()) => {
                self.phase = Phase::Writing;
                ProcessResult::ResponseReady
            }
            Err(e) => {
                tracing::warn!(peer = %self.peer, error = %e, "Failed to build response");
                ProcessResult::Close
            }
        }
    }

    fn queue_response(&mut self, outcome: Outcome) -> Result<(), WriteBufferFull> {
        let builder = ResponseBuilder::new(outcome.status()).keep_alive(self.keep_alive);

        let (head, body) = match outcome {
            Outcome::FileReady(mapping) => {
                let head = builder.content_length(mapping.len() as u64).build()?;
                (head, Some(mapping))
            }
            _ => (builder.build()?, None),
        };

        self.writer = Some(ResponseWriter::new(head, body));
        Ok(())
    }

    /// Sends the queued response without blocking.
    ///
    /// The file mapping is released as soon as the response is fully sent
    /// or the send fails.
    pub fn write(&mut self) -> Result<WriteStatus, ConnectionError> {
        let progress = match self.writer.as_mut() {
            Some(writer) => writer.write_to(&mut self.stream),
            None => Ok(WriteProgress::Complete),
        };

        match progress {
            Ok(WriteProgress::Pending) => Ok(WriteStatus::Pending),
            Ok(WriteProgress::Complete) => {
                self.writer = None;
                if !self.keep_alive {
                    return Ok(WriteStatus::Close);
                }

                self.parser.reset();
                self.keep_alive = false;
                let buffered = self.parser.buffered() > 0;
                self.phase = if buffered { Phase::Processing } else { Phase::Reading };
                Ok(WriteStatus::KeepAlive { buffered })
            }
            Err(e) => {
                self.writer = None;
                Err(e.into())
            }
        }
    }

    /// Shuts down both directions so the reactor observes a hang-up.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

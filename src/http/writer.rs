use std::io::{self, IoSlice, Write};

use bytes::BytesMut;

use crate::http::file::FileMapping;

/// Result of a non-blocking send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteProgress {
    /// Everything queued has been sent.
    Complete,
    /// The socket stopped accepting data; retry on write readiness.
    Pending,
}

/// Two-part send descriptor: the response head from the write buffer,
/// followed by the mapped file (if any).
///
/// Both parts go out through a single vectored write per attempt, so the
/// file body is never copied into the process's buffers.
pub struct ResponseWriter {
    head: BytesMut,
    body: Option<FileMapping>,
    queued: usize,
    sent: usize,
}

impl ResponseWriter {
    pub fn new(head: BytesMut, body: Option<FileMapping>) -> Self {
        let queued = head.len() + body.as_ref().map_or(0, FileMapping::len);
        Self {
            head,
            body,
            queued,
            sent: 0,
        }
    }

    /// Total bytes in the response.
    pub fn bytes_queued(&self) -> usize {
        self.queued
    }

    pub fn bytes_sent(&self) -> usize {
        self.sent
    }

    pub fn bytes_to_send(&self) -> usize {
        self.queued - self.sent
    }

    pub fn is_complete(&self) -> bool {
        self.sent >= self.queued
    }

    fn slices(&self) -> [IoSlice<'_>; 2] {
        let head_sent = self.sent.min(self.head.len());
        let body_sent = self.sent - head_sent;
        let body = self.body.as_ref().map_or(&[][..], FileMapping::as_slice);

        [
            IoSlice::new(&self.head[head_sent..]),
            IoSlice::new(&body[body_sent..]),
        ]
    }

    /// Sends as much as the writer accepts without blocking.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> io::Result<WriteProgress> {
        while !self.is_complete() {
            let result = writer.write_vectored(&self.slices());
            match result {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => self.sent += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteProgress::Pending);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(WriteProgress::Complete)
    }
}

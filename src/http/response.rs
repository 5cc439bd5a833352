use bytes::{BufMut, BytesMut};

use crate::http::file::FileMapping;

/// Capacity of a connection's write buffer (status line, headers and any
/// in-buffer error body).
pub const WRITE_BUFFER_SIZE: usize = 1024;

const HTTP_VERSION: &str = "HTTP/1.1";

/// HTTP status codes produced by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use emberd::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the reason phrase sent on the status line.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Error",
        }
    }

    /// Body sent with an error status. Empty for 200.
    pub fn error_body(&self) -> &'static str {
        match self {
            StatusCode::Ok => "",
            StatusCode::BadRequest => {
                "Your request has bad syntax or is inherently impossible to satisfy.\n"
            }
            StatusCode::Forbidden => "You do not have permission to get file from this server.\n",
            StatusCode::NotFound => "The requested file was not found on this server.\n",
            StatusCode::InternalServerError => {
                "There was an unusual problem serving the requested file.\n"
            }
        }
    }
}

/// What handling a complete request produced.
#[derive(Debug)]
pub enum Outcome {
    /// The target resolved to a readable regular file.
    FileReady(FileMapping),
    /// Syntax error, unsupported method, or a directory target.
    BadRequest,
    /// Nothing exists at the target path.
    NoResource,
    /// The file exists but is not world-readable.
    Forbidden,
    /// The file could not be opened or mapped.
    InternalError,
}

impl Outcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::FileReady(_) => StatusCode::Ok,
            Outcome::BadRequest => StatusCode::BadRequest,
            Outcome::NoResource => StatusCode::NotFound,
            Outcome::Forbidden => StatusCode::Forbidden,
            Outcome::InternalError => StatusCode::InternalServerError,
        }
    }
}

/// The write buffer ran out of room while building a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("response does not fit in the write buffer")]
pub struct WriteBufferFull;

/// Builds the in-buffer part of a response: the status line and the fixed
/// header set, followed by the error body for non-200 statuses.
///
/// # Example
///
/// ```ignore
/// let head = ResponseBuilder::new(StatusCode::Ok)
///     .content_length(file_len)
///     .keep_alive(true)
///     .build()?;
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    content_length: Option<u64>,
    keep_alive: bool,
    capacity: usize,
}

impl ResponseBuilder {
    /// Creates a builder for `status`. Error statuses carry their own body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            content_length: None,
            keep_alive: false,
            capacity: WRITE_BUFFER_SIZE,
        }
    }

    /// Length of a body sent after the buffer (the mapped file).
    pub fn content_length(mut self, len: u64) -> Self {
        self.content_length = Some(len);
        self
    }

    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Serializes into a buffer of at most the configured capacity.
    pub fn build(self) -> Result<BytesMut, WriteBufferFull> {
        let body = self.status.error_body();
        let content_length = self.content_length.unwrap_or(body.len() as u64);
        let head = format!(
            "{} {} {}\r\nContent-Length: {}\r\nContent-Type: text/html\r\nConnection: {}\r\n\r\n",
            HTTP_VERSION,
            self.status.as_u16(),
            self.status.reason_phrase(),
            content_length,
            if self.keep_alive { "keep-alive" } else { "close" },
        );

        if head.len() + body.len() > self.capacity {
            return Err(WriteBufferFull);
        }

        let mut buf = BytesMut::with_capacity(self.capacity);
        buf.put_slice(head.as_bytes());
        buf.put_slice(body.as_bytes());
        Ok(buf)
    }
}

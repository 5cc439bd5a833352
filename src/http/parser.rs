use crate::http::request::{Method, Request};

/// Capacity of a connection's read buffer. A whole request (request line,
/// headers and body) must fit in it.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Which part of the request the parser expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    Headers,
    Body,
}

/// Result of scanning the buffer for the next CRLF-terminated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineStatus {
    Complete,
    Malformed,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("request line must be `METHOD target HTTP/1.1`")]
    InvalidRequest,
    #[error("unknown method")]
    InvalidMethod,
    #[error("method {0:?} is not supported")]
    UnsupportedMethod(Method),
    #[error("only HTTP/1.1 is supported")]
    UnsupportedVersion,
    #[error("request target must start with `/`")]
    InvalidTarget,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("bare CR or LF in request")]
    MalformedLine,
    #[error("request does not fit in the read buffer")]
    BufferOverflow,
}

/// Incremental request parser over a fixed-capacity buffer.
///
/// Bytes are appended at the fill cursor and consumed one line at a time at
/// the scan cursor, so a request may arrive in any number of pieces.
/// `line_start <= checked <= filled <= capacity` always holds.
pub struct RequestParser {
    buf: Box<[u8]>,
    filled: usize,
    checked: usize,
    line_start: usize,
    state: ParseState,
    pending: Option<Request>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self::with_capacity(READ_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
            checked: 0,
            line_start: 0,
            state: ParseState::RequestLine,
            pending: None,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.buf.len()
    }

    /// Bytes received but not yet consumed by a completed request.
    pub fn buffered(&self) -> usize {
        self.filled - self.checked
    }

    /// Free space after the fill cursor, to be filled by a socket read.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.filled..]
    }

    /// Marks `n` bytes of [`spare_mut`](Self::spare_mut) as filled.
    pub fn advance(&mut self, n: usize) {
        self.filled = (self.filled + n).min(self.buf.len());
    }

    /// Copies as much of `bytes` as fits; returns the number copied.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let spare = self.spare_mut();
        let n = spare.len().min(bytes.len());
        spare[..n].copy_from_slice(&bytes[..n]);
        self.advance(n);
        n
    }

    /// Prepares for the next request on the same connection.
    ///
    /// Bytes past the end of the last request (a pipelined request) are
    /// moved to the front of the buffer rather than discarded.
    pub fn reset(&mut self) {
        self.buf.copy_within(self.checked..self.filled, 0);
        self.filled -= self.checked;
        self.checked = 0;
        self.line_start = 0;
        self.state = ParseState::RequestLine;
        self.pending = None;
    }

    /// Drops everything, including buffered bytes.
    pub fn clear(&mut self) {
        self.filled = 0;
        self.checked = 0;
        self.line_start = 0;
        self.state = ParseState::RequestLine;
        self.pending = None;
    }

    /// Runs the state machine over the buffered bytes.
    ///
    /// Returns `Ok(None)` when more bytes are needed, and `Ok(Some(request))`
    /// exactly once per complete request.
    pub fn parse(&mut self) -> Result<Option<Request>, ParseError> {
        loop {
            if self.state == ParseState::Body {
                let needed = self.pending.as_ref().map_or(0, |r| r.content_length);
                if self.filled - self.checked < needed {
                    return Ok(None);
                }
                self.checked += needed;
                self.line_start = self.checked;
                self.state = ParseState::RequestLine;
                return self.pending.take().map(Some).ok_or(ParseError::InvalidRequest);
            }

            match self.scan_line() {
                LineStatus::Incomplete if self.is_full() => return Err(ParseError::BufferOverflow),
                LineStatus::Incomplete => return Ok(None),
                LineStatus::Malformed => return Err(ParseError::MalformedLine),
                LineStatus::Complete => {}
            }

            let start = self.line_start;
            let end = self.checked - 2;
            self.line_start = self.checked;
            let text =
                std::str::from_utf8(&self.buf[start..end]).map_err(|_| ParseError::InvalidRequest)?;

            match self.state {
                ParseState::RequestLine => {
                    self.pending = Some(parse_request_line(text)?);
                    self.state = ParseState::Headers;
                }
                ParseState::Headers if text.is_empty() => {
                    let content_length = self.pending.as_ref().map_or(0, |r| r.content_length);
                    if content_length == 0 {
                        self.state = ParseState::RequestLine;
                        return self.pending.take().map(Some).ok_or(ParseError::InvalidRequest);
                    }
                    if content_length > self.buf.len() - self.checked {
                        return Err(ParseError::BufferOverflow);
                    }
                    self.state = ParseState::Body;
                }
                ParseState::Headers => {
                    let request = self.pending.as_mut().ok_or(ParseError::InvalidRequest)?;
                    parse_header(text, request)?;
                }
                ParseState::Body => unreachable!("body is consumed before line scanning"),
            }
        }
    }

    /// Advances `checked` past the next CRLF if one is buffered.
    fn scan_line(&mut self) -> LineStatus {
        while self.checked < self.filled {
            match self.buf[self.checked] {
                b'\r' => {
                    if self.checked + 1 == self.filled {
                        return LineStatus::Incomplete;
                    }
                    if self.buf[self.checked + 1] == b'\n' {
                        self.checked += 2;
                        return LineStatus::Complete;
                    }
                    return LineStatus::Malformed;
                }
                b'\n' => return LineStatus::Malformed,
                _ => self.checked += 1,
            }
        }
        LineStatus::Incomplete
    }
}

/// Parses `METHOD SP target SP HTTP/1.1`.
///
/// An absolute-form target (`http://host/path`) is reduced to its path.
pub fn parse_request_line(line: &str) -> Result<Request, ParseError> {
    let mut parts = line.split_ascii_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => return Err(ParseError::InvalidRequest),
    };

    let method = Method::from_str(method).ok_or(ParseError::InvalidMethod)?;
    if method != Method::GET {
        return Err(ParseError::UnsupportedMethod(method));
    }
    if version != "HTTP/1.1" {
        return Err(ParseError::UnsupportedVersion);
    }

    let target = match target.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("http://") => {
            let rest = &target[7..];
            rest.find('/').map(|i| &rest[i..]).ok_or(ParseError::InvalidTarget)?
        }
        _ => target,
    };
    if !target.starts_with('/') {
        return Err(ParseError::InvalidTarget);
    }

    Ok(Request::new(method, target.to_string()))
}

/// Applies one `Name: value` line. Headers the server does not act on are
/// skipped.
pub fn parse_header(line: &str, request: &mut Request) -> Result<(), ParseError> {
    let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
    let name = name.trim();
    let value = value.trim_matches(|c| c == ' ' || c == '\t');

    if name.eq_ignore_ascii_case("Connection") {
        request.keep_alive = value.eq_ignore_ascii_case("keep-alive");
    } else if name.eq_ignore_ascii_case("Content-Length") {
        request.content_length = value.parse().map_err(|_| ParseError::InvalidContentLength)?;
    } else if name.eq_ignore_ascii_case("Host") {
        request.host = Some(value.to_string());
    }
    Ok(())
}

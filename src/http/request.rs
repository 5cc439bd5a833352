/// HTTP request methods.
///
/// Represents the HTTP method/verb of a request. The server only serves GET;
/// other methods are recognized so they can be rejected with 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// # Arguments
    ///
    /// * `s` - String representation of the method (case-sensitive, uppercase)
    ///
    /// # Returns
    ///
    /// `Some(Method)` if the string matches a known method, `None` otherwise.
    ///
    /// # Example
    ///
    /// ```
    /// # use emberd::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }
}

/// A fully parsed request, as far as the server cares about it.
///
/// Only the headers that change server behavior are kept; everything else on
/// the wire is skipped by the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The HTTP method (always GET once parsing succeeds)
    pub method: Method,
    /// Origin-form target, always starting with `/`
    pub target: String,
    /// Raw `Host` header value, if sent
    pub host: Option<String>,
    /// Declared body length; the body itself is consumed and discarded
    pub content_length: usize,
    /// Whether the client sent `Connection: keep-alive`
    pub keep_alive: bool,
}

impl Request {
    pub(crate) fn new(method: Method, target: String) -> Self {
        Self {
            method,
            target,
            host: None,
            content_length: 0,
            keep_alive: false,
        }
    }
}

use emberd::http::parser::{ParseError, parse_header, parse_request_line};
use emberd::http::request::Method;

#[test]
fn test_method_from_str_known_methods() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("POST"), Some(Method::POST));
    assert_eq!(Method::from_str("PUT"), Some(Method::PUT));
    assert_eq!(Method::from_str("DELETE"), Some(Method::DELETE));
    assert_eq!(Method::from_str("HEAD"), Some(Method::HEAD));
    assert_eq!(Method::from_str("OPTIONS"), Some(Method::OPTIONS));
    assert_eq!(Method::from_str("PATCH"), Some(Method::PATCH));
}

#[test]
fn test_method_from_str_is_case_sensitive() {
    assert_eq!(Method::from_str("get"), None);
    assert_eq!(Method::from_str("Get"), None);
    assert_eq!(Method::from_str("BREW"), None);
}

#[test]
fn test_method_as_str_matches_wire_form() {
    for method in [Method::GET, Method::POST, Method::HEAD, Method::PATCH] {
        assert_eq!(Method::from_str(method.as_str()), Some(method));
    }
}

#[test]
fn test_request_defaults_after_request_line() {
    let req = parse_request_line("GET /index.html HTTP/1.1").unwrap();

    assert_eq!(req.method, Method::GET);
    assert_eq!(req.target, "/index.html");
    assert_eq!(req.host, None);
    assert_eq!(req.content_length, 0);
    assert!(!req.keep_alive);
}

#[test]
fn test_request_keep_alive_requires_explicit_header() {
    let mut req = parse_request_line("GET / HTTP/1.1").unwrap();

    parse_header("Connection: close", &mut req).unwrap();
    assert!(!req.keep_alive);

    parse_header("Connection: Keep-Alive", &mut req).unwrap();
    assert!(req.keep_alive);
}

#[test]
fn test_request_content_length_header() {
    let mut req = parse_request_line("GET / HTTP/1.1").unwrap();

    parse_header("Content-Length: 42", &mut req).unwrap();
    assert_eq!(req.content_length, 42);
}

#[test]
fn test_request_content_length_invalid() {
    let mut req = parse_request_line("GET / HTTP/1.1").unwrap();

    assert_eq!(
        parse_header("Content-Length: lots", &mut req),
        Err(ParseError::InvalidContentLength)
    );
}

#[test]
fn test_request_host_header_with_tabs() {
    let mut req = parse_request_line("GET / HTTP/1.1").unwrap();

    parse_header("Host:\t example.com:8080 ", &mut req).unwrap();
    assert_eq!(req.host.as_deref(), Some("example.com:8080"));
}

#[test]
fn test_request_unknown_headers_are_ignored() {
    let mut req = parse_request_line("GET / HTTP/1.1").unwrap();
    let before = req.clone();

    parse_header("User-Agent: curl/8.0", &mut req).unwrap();
    parse_header("Accept: */*", &mut req).unwrap();
    assert_eq!(req, before);
}

#[test]
fn test_request_header_without_colon_is_rejected() {
    let mut req = parse_request_line("GET / HTTP/1.1").unwrap();

    assert_eq!(
        parse_header("NoColonHere", &mut req),
        Err(ParseError::InvalidHeader)
    );
}

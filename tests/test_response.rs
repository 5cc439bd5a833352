use std::fs::{self, File};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use emberd::http::file::{self, FileMapping};
use emberd::http::response::{Outcome, ResponseBuilder, StatusCode, WriteBufferFull};
use emberd::http::writer::{ResponseWriter, WriteProgress};

fn write_file(dir: &Path, name: &str, contents: &[u8], mode: u32) {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
}

fn map(path: &Path) -> FileMapping {
    let file = File::open(path).unwrap();
    let len = file.metadata().unwrap().len() as usize;
    FileMapping::map(&file, len).unwrap()
}

/// Accepts at most `chunk` bytes per call and `budget` bytes in total, then
/// reports `WouldBlock` like a full socket buffer.
struct Throttled {
    out: Vec<u8>,
    chunk: usize,
    budget: usize,
}

impl Write for Throttled {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.budget == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(self.chunk).min(self.budget);
        self.out.extend_from_slice(&buf[..n]);
        self.budget -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::BadRequest.reason_phrase(), "Bad Request");
    assert_eq!(StatusCode::Forbidden.reason_phrase(), "Forbidden");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    assert_eq!(StatusCode::InternalServerError.reason_phrase(), "Internal Error");
}

#[test]
fn test_outcome_status_mapping() {
    assert_eq!(Outcome::BadRequest.status(), StatusCode::BadRequest);
    assert_eq!(Outcome::NoResource.status(), StatusCode::NotFound);
    assert_eq!(Outcome::Forbidden.status(), StatusCode::Forbidden);
    assert_eq!(Outcome::InternalError.status(), StatusCode::InternalServerError);
}

#[test]
fn test_response_builder_file_head() {
    let head = ResponseBuilder::new(StatusCode::Ok)
        .content_length(1234)
        .keep_alive(true)
        .build()
        .unwrap();

    assert_eq!(
        &head[..],
        b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\nContent-Type: text/html\r\nConnection: keep-alive\r\n\r\n"
    );
}

#[test]
fn test_response_builder_error_carries_body() {
    let head = ResponseBuilder::new(StatusCode::NotFound).build().unwrap();
    let text = std::str::from_utf8(&head).unwrap();
    let body = StatusCode::NotFound.error_body();

    assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(text.contains(&format!("Content-Length: {}\r\n", body.len())));
    assert!(text.contains("Connection: close\r\n"));
    assert!(text.ends_with(&format!("\r\n\r\n{body}")));
}

#[test]
fn test_response_builder_every_error_body_fits() {
    for status in [
        StatusCode::BadRequest,
        StatusCode::Forbidden,
        StatusCode::NotFound,
        StatusCode::InternalServerError,
    ] {
        assert!(!status.error_body().is_empty());
        assert!(ResponseBuilder::new(status).keep_alive(true).build().is_ok());
    }
}

#[test]
fn test_response_builder_rejects_overflow() {
    let result = ResponseBuilder::new(StatusCode::BadRequest).capacity(32).build();
    assert_eq!(result, Err(WriteBufferFull));
}

#[test]
fn test_writer_sends_head_then_file() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "page.html", b"<p>hi</p>", 0o644);

    let mapping = map(&dir.path().join("page.html"));
    let head = ResponseBuilder::new(StatusCode::Ok)
        .content_length(mapping.len() as u64)
        .build()
        .unwrap();
    let head_len = head.len();
    let mut writer = ResponseWriter::new(head, Some(mapping));
    assert_eq!(writer.bytes_queued(), head_len + 9);

    let mut out = Vec::new();
    assert_eq!(writer.write_to(&mut out).unwrap(), WriteProgress::Complete);
    assert!(writer.is_complete());
    assert!(out.ends_with(b"\r\n\r\n<p>hi</p>"));
    assert_eq!(out.len(), head_len + 9);
}

#[test]
fn test_writer_resumes_after_would_block() {
    let dir = tempfile::tempdir().unwrap();
    let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    write_file(dir.path(), "blob.bin", &body, 0o644);

    let head = ResponseBuilder::new(StatusCode::Ok)
        .content_length(body.len() as u64)
        .build()
        .unwrap();
    let expected: Vec<u8> = head.iter().copied().chain(body.iter().copied()).collect();
    let mut writer = ResponseWriter::new(head, Some(map(&dir.path().join("blob.bin"))));

    let mut sink = Throttled {
        out: Vec::new(),
        chunk: 700,
        budget: 3_000,
    };
    assert_eq!(writer.write_to(&mut sink).unwrap(), WriteProgress::Pending);
    assert_eq!(writer.bytes_sent(), 3_000);
    assert_eq!(writer.bytes_to_send(), expected.len() - 3_000);

    while writer.write_to(&mut sink).unwrap() == WriteProgress::Pending {
        sink.budget = 3_000;
    }
    assert_eq!(sink.out, expected);
}

#[test]
fn test_writer_head_only() {
    let head = ResponseBuilder::new(StatusCode::Forbidden).build().unwrap();
    let expected = head.to_vec();
    let mut writer = ResponseWriter::new(head, None);

    let mut out = Vec::new();
    assert_eq!(writer.write_to(&mut out).unwrap(), WriteProgress::Complete);
    assert_eq!(out, expected);
}

#[test]
fn test_resolve_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "public.html", b"open", 0o644);
    write_file(dir.path(), "private.html", b"closed", 0o600);
    write_file(dir.path(), "empty.html", b"", 0o644);
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::set_permissions(dir.path().join("sub"), fs::Permissions::from_mode(0o755)).unwrap();

    match file::resolve(dir.path(), "/public.html") {
        Outcome::FileReady(mapping) => assert_eq!(mapping.as_slice(), b"open"),
        other => panic!("expected file, got {other:?}"),
    }
    match file::resolve(dir.path(), "/empty.html") {
        Outcome::FileReady(mapping) => assert!(mapping.is_empty()),
        other => panic!("expected empty file, got {other:?}"),
    }
    assert!(matches!(file::resolve(dir.path(), "/private.html"), Outcome::Forbidden));
    assert!(matches!(file::resolve(dir.path(), "/sub"), Outcome::BadRequest));
    assert!(matches!(file::resolve(dir.path(), "/nope.html"), Outcome::NoResource));
}

#[test]
fn test_real_path_is_plain_concatenation() {
    let root = Path::new("/srv/www");

    assert_eq!(file::real_path(root, "/index.html"), Path::new("/srv/www/index.html"));
    assert_eq!(file::real_path(root, "/a?b=c"), Path::new("/srv/www/a?b=c"));
    assert_eq!(file::real_path(root, "/../etc/x"), Path::new("/srv/www/../etc/x"));
}

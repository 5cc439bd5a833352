//! HTTP protocol implementation.
//!
//! This module turns a byte stream into static-file responses without ever
//! blocking, through repeated calls on a per-socket state machine.
//!
//! # Architecture
//!
//! - **`connection`**: The per-socket state machine exposing `read`, `process` and `write`
//! - **`parser`**: Incremental request parser over a fixed read buffer
//! - **`request`**: HTTP method and parsed request representation
//! - **`file`**: Document-root resolution and read-only file mappings
//! - **`response`**: Status codes, request outcomes and the response head builder
//! - **`writer`**: Vectored send of the response head followed by the mapped file
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Armed for read readiness
//!        └──────┬──────┘
//!               │ bytes buffered, handed to a worker
//!               ▼
//!        ┌──────────────────┐
//!        │   Processing     │ ← Parse; resolve once the request is complete
//!        └──────┬───────────┘
//!               │ incomplete → Reading
//!               │ response queued
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Armed for write readiness
//!        └──────┬───────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → Reading (or Processing if pipelined bytes remain)
//!               └─ Close → torn down
//! ```
//!
//! The parser itself walks `RequestLine → Headers → Body` one CRLF line at a
//! time and reports "need more bytes" whenever a line is incomplete.

pub mod connection;
pub mod file;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

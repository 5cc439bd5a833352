//! emberd - static file HTTP server
//!
//! A single reactor thread multiplexes every socket over epoll and hands
//! request processing to a fixed worker pool. Files are memory-mapped and
//! sent with scatter/gather writes.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod server;

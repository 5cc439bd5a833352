//! Connection plumbing: readiness, timers, signals and the worker pool.
//!
//! [`reactor::Reactor`] ties these together. The other modules know nothing
//! about HTTP and are usable on their own.

pub mod listener;
pub mod poller;
pub mod pool;
pub mod queue;
pub mod reactor;
pub mod signal;
pub mod timer;

pub use reactor::{DispatchStats, Reactor};
pub use signal::ShutdownHandle;

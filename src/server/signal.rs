//! Signal-to-readiness bridge.
//!
//! Signal handlers only write the signal number as a single byte into one
//! end of a non-blocking socket pair. The other end is registered with the
//! reactor like any socket, and the reactor interprets the bytes on its own
//! thread after draining them.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use signal_hook::SigId;
use signal_hook::consts::{SIGALRM, SIGINT, SIGTERM};

/// Actions requested by the signals drained in one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SignalFlags {
    /// The idle-sweep alarm fired at least once.
    pub timer_due: bool,
    /// Termination was requested.
    pub stop: bool,
}

pub struct SignalBridge {
    reader: UnixStream,
    writer: Arc<UnixStream>,
    registrations: Vec<SigId>,
}

impl SignalBridge {
    /// Creates the pipe, ignores `SIGPIPE`, and routes `SIGALRM`, `SIGTERM`
    /// and `SIGINT` into the pipe.
    pub fn install() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;

        ignore_sigpipe()?;

        let mut bridge = Self {
            reader,
            writer: Arc::new(writer),
            registrations: Vec::with_capacity(3),
        };
        for signal in [SIGALRM, SIGTERM, SIGINT] {
            let id = forward(signal, bridge.writer.as_raw_fd())?;
            bridge.registrations.push(id);
        }

        Ok(bridge)
    }

    /// The descriptor the reactor watches for readability.
    pub fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Starts a periodic `SIGALRM` every `interval`.
    ///
    /// The interval timer is process-wide; if one is already running it is
    /// left as is.
    pub fn start_alarm(&self, interval: Duration) -> io::Result<()> {
        let mut current = libc::itimerval {
            it_interval: libc::timeval { tv_sec: 0, tv_usec: 0 },
            it_value: libc::timeval { tv_sec: 0, tv_usec: 0 },
        };
        if unsafe { libc::getitimer(libc::ITIMER_REAL, &mut current) } < 0 {
            return Err(io::Error::last_os_error());
        }
        if current.it_interval.tv_sec != 0 || current.it_interval.tv_usec != 0 {
            return Ok(());
        }

        let tick = libc::timeval {
            tv_sec: interval.as_secs() as libc::time_t,
            tv_usec: interval.subsec_micros() as libc::suseconds_t,
        };
        let timer = libc::itimerval {
            it_interval: tick,
            it_value: tick,
        };

        let res = unsafe { libc::setitimer(libc::ITIMER_REAL, &timer, std::ptr::null_mut()) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Reads every pending byte and maps each back to its signal.
    pub fn drain(&mut self) -> SignalFlags {
        let mut flags = SignalFlags::default();
        let mut buf = [0u8; 1024];

        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    for &byte in &buf[..n] {
                        match libc::c_int::from(byte) {
                            SIGALRM => flags.timer_due = true,
                            SIGTERM | SIGINT => flags.stop = true,
                            _ => {}
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to drain signal pipe");
                    break;
                }
            }
        }

        flags
    }

    /// A handle that requests shutdown through the same pipe `SIGTERM` uses.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        for id in self.registrations.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Requests a graceful stop of the reactor from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    writer: Arc<UnixStream>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) -> io::Result<()> {
        (&*self.writer).write_all(&[SIGTERM as u8])
    }
}

fn ignore_sigpipe() -> io::Result<()> {
    let previous = unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) };
    if previous == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn forward(signal: libc::c_int, fd: RawFd) -> io::Result<SigId> {
    let byte = signal as u8;
    // SAFETY: the action only calls send(2), which is async-signal-safe.
    unsafe {
        signal_hook::low_level::register(signal, move || {
            libc::send(
                fd,
                (&byte as *const u8).cast(),
                1,
                libc::MSG_DONTWAIT | libc::MSG_NOSIGNAL,
            );
        })
    }
}

//! Readiness notification over epoll.
//!
//! Connection sockets are registered edge-triggered and one-shot: after an
//! event fires, the socket produces nothing more until [`Poller::rearm`] is
//! called. The reactor and the workers rely on that contract so that only
//! one thread ever acts on a connection at a time.

use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

/// Which readiness a registration waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn flags(self) -> u32 {
        let base = match self {
            Interest::Readable => libc::EPOLLIN,
            Interest::Writable => libc::EPOLLOUT,
        };
        (base | libc::EPOLLRDHUP) as u32
    }
}

/// A readiness event returned by [`Poller::wait`].
#[derive(Debug, Clone, Copy)]
pub struct Event {
    token: u64,
    flags: u32,
}

impl Event {
    /// The file descriptor the event was registered for.
    pub fn fd(&self) -> RawFd {
        self.token as RawFd
    }

    pub fn is_readable(&self) -> bool {
        self.flags & libc::EPOLLIN as u32 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.flags & libc::EPOLLOUT as u32 != 0
    }

    /// Peer hang-up, half-close, or socket error.
    pub fn is_hangup(&self) -> bool {
        self.flags & (libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0
    }
}

/// Buffer the kernel fills on each wait.
pub struct Events {
    buf: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `i`th event of the last wait.
    pub fn get(&self, i: usize) -> Option<Event> {
        self.buf[..self.len].get(i).map(|ev| {
            let ev = *ev;
            Event {
                token: ev.u64,
                flags: ev.events,
            }
        })
    }
}

pub struct Poller {
    epfd: OwnedFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            epfd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Adds `fd` to the readiness set.
    pub fn register(
        &self,
        fd: RawFd,
        interest: Interest,
        edge_triggered: bool,
        one_shot: bool,
    ) -> io::Result<()> {
        let mut flags = interest.flags();
        if edge_triggered {
            flags |= libc::EPOLLET as u32;
        }
        if one_shot {
            flags |= libc::EPOLLONESHOT as u32;
        }
        self.ctl(libc::EPOLL_CTL_ADD, fd, flags)
    }

    /// Re-enables a one-shot registration, switching its interest.
    pub fn rearm(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        let flags = interest.flags() | (libc::EPOLLET | libc::EPOLLONESHOT) as u32;
        self.ctl(libc::EPOLL_CTL_MOD, fd, flags)
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let res = unsafe {
            libc::epoll_ctl(
                self.epfd.as_raw_fd(),
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut(),
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Blocks until at least one registered descriptor is ready.
    ///
    /// `None` waits forever. An interruption by a signal is reported as
    /// `ErrorKind::Interrupted`.
    pub fn wait(&self, events: &mut Events, timeout: Option<Duration>) -> io::Result<usize> {
        let timeout_ms = timeout.map_or(-1, |d| d.as_millis().min(i32::MAX as u128) as i32);
        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                events.buf.as_mut_ptr(),
                events.buf.len().min(i32::MAX as usize) as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            events.len = 0;
            return Err(io::Error::last_os_error());
        }
        events.len = n as usize;
        Ok(events.len)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, flags: u32) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: flags,
            u64: fd as u64,
        };
        let res = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut event) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

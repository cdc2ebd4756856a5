use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use libc::{EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLPRI, EPOLLRDHUP};

use crate::interest::Interest;
use crate::sys::unix::syscall;
use crate::token::Token;

const INIT_EVENTS_SIZE: usize = 16;
const MAX_EVENTS_SIZE: usize = 4096;

/// Thin wrapper around a single `epoll` instance.
///
/// Mirrors `EventManager`: one epoll fd per loop, an event buffer that
/// doubles in size whenever a `wait()` fills it completely (capped at
/// [`MAX_EVENTS_SIZE`] the same way the original caps its `m_event_list`),
/// and `epoll_ctl` calls with the ADD/MOD/DEL fallback resilience the
/// original's `apply_ops` applies when a registration has drifted out of
/// sync with the kernel's view (a closed-and-reused fd, a double delete).
#[derive(Debug)]
pub struct Epoll {
    fd: OwnedFd,
    events: Vec<libc::epoll_event>,
}

impl Epoll {
    pub fn new() -> io::Result<Epoll> {
        let fd = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?;
        // SAFETY: `epoll_create1` returned a valid, owned fd.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Epoll {
            fd,
            events: Vec::with_capacity(INIT_EVENTS_SIZE),
        })
    }

    pub fn add(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut ev = to_epoll_event(token, interest);
        match syscall!(epoll_ctl(self.raw(), libc::EPOLL_CTL_ADD, fd, &mut ev)) {
            Ok(_) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                syscall!(epoll_ctl(self.raw(), libc::EPOLL_CTL_MOD, fd, &mut ev)).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    pub fn modify(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut ev = to_epoll_event(token, interest);
        match syscall!(epoll_ctl(self.raw(), libc::EPOLL_CTL_MOD, fd, &mut ev)) {
            Ok(_) => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ENOENT) => {
                syscall!(epoll_ctl(self.raw(), libc::EPOLL_CTL_ADD, fd, &mut ev)).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    pub fn delete(&self, fd: RawFd) -> io::Result<()> {
        match syscall!(epoll_ctl(
            self.raw(),
            libc::EPOLL_CTL_DEL,
            fd,
            std::ptr::null_mut()
        )) {
            Ok(_) => Ok(()),
            Err(e)
                if matches!(
                    e.raw_os_error(),
                    Some(libc::ENOENT) | Some(libc::EBADF) | Some(libc::EPERM)
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Blocks for up to `timeout_ms` (negative meaning forever) and returns
    /// the events that became ready. Grows the event buffer and returns an
    /// empty slice on a bare timeout.
    pub fn wait(&mut self, timeout_ms: i32) -> io::Result<&[EpollEvent]> {
        let capacity = self.events.capacity();
        self.events.clear();
        let n = syscall!(epoll_wait(
            self.raw(),
            self.events.as_mut_ptr(),
            capacity as i32,
            timeout_ms,
        ))?;
        // SAFETY: `epoll_wait` initialized the first `n` slots.
        unsafe { self.events.set_len(n as usize) };

        if n as usize == capacity && capacity < MAX_EVENTS_SIZE {
            self.events.reserve(capacity);
        }

        // `libc::epoll_event` and `EpollEvent` are both `repr(transparent)`
        // newtype-shaped over the same layout.
        Ok(unsafe { std::slice::from_raw_parts(self.events.as_ptr().cast(), self.events.len()) })
    }

    fn raw(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

fn to_epoll_event(token: Token, interest: Interest) -> libc::epoll_event {
    let mut bits = EPOLLET;
    if interest.contains(Interest::READABLE) {
        bits |= EPOLLIN;
    }
    if interest.contains(Interest::WRITABLE) {
        bits |= EPOLLOUT;
    }
    if interest.contains(Interest::PRIORITY) {
        bits |= EPOLLPRI;
    }
    if interest.contains(Interest::HANGUP_READ) {
        bits |= EPOLLRDHUP;
    }
    libc::epoll_event {
        events: bits as u32,
        u64: usize::from(token) as u64,
    }
}

/// A single readiness notification returned from [`Epoll::wait`].
#[derive(Debug)]
#[repr(transparent)]
pub struct EpollEvent(libc::epoll_event);

impl EpollEvent {
    pub fn token(&self) -> Token {
        Token(self.0.u64 as usize)
    }

    pub fn is_readable(&self) -> bool {
        self.raw() & (EPOLLIN | EPOLLPRI) != 0
    }

    pub fn is_writable(&self) -> bool {
        self.raw() & EPOLLOUT != 0
    }

    pub fn is_priority(&self) -> bool {
        self.raw() & EPOLLPRI != 0
    }

    pub fn is_error(&self) -> bool {
        self.raw() & EPOLLERR != 0
    }

    /// Both halves of the socket have gone away.
    pub fn is_hangup(&self) -> bool {
        self.raw() & EPOLLHUP != 0
    }

    /// The peer shut down its write half (`EPOLLRDHUP`) or the socket
    /// hung up entirely.
    pub fn is_read_closed(&self) -> bool {
        self.raw() & EPOLLHUP != 0 || self.raw() & EPOLLRDHUP != 0
    }

    fn raw(&self) -> i32 {
        self.0.events as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_modify_wait_delete_round_trip_on_a_pipe() {
        let mut epoll = Epoll::new().expect("epoll_create1");
        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let [read_fd, write_fd] = fds;

        epoll
            .add(read_fd, Token(7), Interest::READABLE)
            .expect("add");

        assert_eq!(unsafe { libc::write(write_fd, b"x".as_ptr().cast(), 1) }, 1);

        let events = epoll.wait(1000).expect("wait");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].token(), Token(7));
        assert!(events[0].is_readable());

        epoll.delete(read_fd).expect("delete");
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}

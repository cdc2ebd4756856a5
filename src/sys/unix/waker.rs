use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::sys::unix::syscall;

/// Cross-thread wakeup primitive backed by Linux `eventfd`.
///
/// Grounded on `AsyncWaker`: a non-blocking, close-on-exec eventfd that any
/// thread can bump via [`Waker::wake`] to force the owning loop's
/// `epoll_wait` to return immediately. `Waker` is `Send + Sync` — unlike the
/// channels it sits next to, it carries no loop-confined state, so posting a
/// wakeup from a foreign thread needs no further synchronization.
#[derive(Debug)]
pub struct Waker {
    fd: OwnedFd,
}

impl Waker {
    pub fn new() -> io::Result<Waker> {
        let fd = syscall!(eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC))?;
        // SAFETY: `eventfd` returned a valid, owned fd.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Waker { fd })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Bumps the eventfd counter by one, waking up a blocked `epoll_wait` on
    /// the owning loop. Safe to call from any thread.
    pub fn wake(&self) -> io::Result<()> {
        let one: u64 = 1;
        let n = syscall!(write(
            self.fd.as_raw_fd(),
            (&one as *const u64).cast(),
            std::mem::size_of::<u64>(),
        ))?;
        if n as usize != std::mem::size_of::<u64>() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "eventfd wake wrote a partial u64",
            ));
        }
        Ok(())
    }

    /// Drains the counter after the fd is reported readable.
    pub fn reset(&self) -> io::Result<()> {
        let mut count: u64 = 0;
        match syscall!(read(
            self.fd.as_raw_fd(),
            (&mut count as *mut u64).cast(),
            std::mem::size_of::<u64>(),
        )) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_then_reset_drains_the_counter() {
        let waker = Waker::new().expect("eventfd");
        waker.wake().expect("wake");
        waker.wake().expect("wake again, coalesces");
        waker.reset().expect("reset");
        // A second reset with nothing pending should not block or error.
        waker.reset().expect("reset on empty counter");
    }

    #[test]
    fn waker_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Waker>();
    }
}

//! Linux backend: `epoll` for demultiplexing, `eventfd` for cross-thread
//! wakeup, `timerfd` for the timer wheel's own readiness source.
//!
//! Grounded directly on the original `EventManager`/`AsyncWaker`/`TimerQueue`
//! C++ sources, translated into the same raw-`libc` style `mio` itself uses
//! in `src/sys/unix/selector/epoll.rs` and `src/sys/unix/waker/eventfd.rs`
//! rather than pulling in a wrapper crate like `nix`.

mod epoll;
mod timerfd;
mod waker;

pub use self::epoll::{Epoll, EpollEvent};
pub use self::timerfd::TimerFd;
pub use self::waker::Waker;

/// Retries a libc call while it returns `EINTR`, turning `-1` into an
/// `io::Error`. Every raw syscall wrapper in this module goes through this.
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        loop {
            let res = unsafe { libc::$fn($($arg, )*) };
            if res == -1 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                break Err(err);
            }
            break Ok(res);
        }
    }};
}

pub(crate) use syscall;

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::sys::unix::syscall;

/// The timer wheel's own readiness source: a Linux `timerfd`, armed for the
/// single next expiration the wheel cares about.
///
/// Grounded on `TimerQueue::createTimerfd`/`startTimer`: the timer is always
/// one-shot (`it_interval` left zero — repeating timers are handled by the
/// wheel re-inserting and re-arming, not by the kernel), and arming never
/// requests less than 1000ms out, the same floor the original enforces to
/// avoid re-arming storms when several timers expire close together.
#[derive(Debug)]
pub struct TimerFd {
    fd: OwnedFd,
}

const MIN_ARM_MILLIS: i64 = 1000;

impl TimerFd {
    pub fn new() -> io::Result<TimerFd> {
        let fd = syscall!(timerfd_create(
            libc::CLOCK_MONOTONIC,
            libc::TFD_NONBLOCK | libc::TFD_CLOEXEC,
        ))?;
        // SAFETY: `timerfd_create` returned a valid, owned fd.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(TimerFd { fd })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Arms the timer to fire `millis_from_now` milliseconds from now,
    /// clamped up to [`MIN_ARM_MILLIS`].
    pub fn arm(&self, millis_from_now: i64) -> io::Result<()> {
        let millis = millis_from_now.max(MIN_ARM_MILLIS);
        let spec = libc::itimerspec {
            it_interval: libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
            it_value: libc::timespec {
                tv_sec: millis / 1000,
                tv_nsec: (millis % 1000) * 1_000_000,
            },
        };
        syscall!(timerfd_settime(
            self.fd.as_raw_fd(),
            0,
            &spec,
            std::ptr::null_mut()
        ))
        .map(|_| ())
    }

    /// Disarms the timer, e.g. when the wheel becomes empty.
    pub fn disarm(&self) -> io::Result<()> {
        let spec = libc::itimerspec {
            it_interval: libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
            it_value: libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            },
        };
        syscall!(timerfd_settime(
            self.fd.as_raw_fd(),
            0,
            &spec,
            std::ptr::null_mut()
        ))
        .map(|_| ())
    }

    /// Drains the expiration counter after the fd is reported readable.
    /// Returns the number of expirations coalesced into this one wakeup.
    pub fn consume(&self) -> io::Result<u64> {
        let mut count: u64 = 0;
        let n = syscall!(read(
            self.fd.as_raw_fd(),
            (&mut count as *mut u64).cast(),
            std::mem::size_of::<u64>(),
        ))?;
        if n as usize != std::mem::size_of::<u64>() {
            return Ok(0);
        }
        Ok(count)
    }
}

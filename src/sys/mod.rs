//! OS-specific primitives backing the demultiplexer, timer wheel, and waker.
//!
//! The reactor's core data structures (`EventLoop`, `Channel`,
//! `Demultiplexer`, ...) are written against the small surface exposed by
//! this module, the same split `mio` itself uses between its portable
//! `Poll`/`Registry` and `sys::unix`/`sys::windows` backends. Per the
//! kernel's own Non-goals (`spec.md` §1: "portability to non-Linux
//! demultiplexers"), only the Linux/epoll backend is implemented; a second
//! backend would slot in here without touching anything above this module.

#[cfg(unix)]
pub(crate) mod unix;
#[cfg(unix)]
pub(crate) use self::unix::{Epoll, EpollEvent, TimerFd, Waker};

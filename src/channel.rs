use std::os::fd::RawFd;

use crate::interest::Interest;
use crate::sys::EpollEvent;
use crate::token::Token;

/// Where a [`Channel`] sits in the demultiplexer's bookkeeping.
///
/// Mirrors the original `ChannelMark`: a fresh channel starts `New`, moves to
/// `Added` the first time [`Demultiplexer::sync`](crate::demux::Demultiplexer::sync)
/// issues `EPOLL_CTL_ADD` for it, and moves to `Deleted` once its interest
/// set drops back to empty and it is pulled out of epoll — at which point it
/// can be dropped or, if reused, synced again from scratch.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChannelMark {
    New,
    Added,
    Deleted,
}

/// A selectable I/O handle registered with a loop's demultiplexer.
///
/// Unlike the original's `Channel`, this carries no callbacks: the owning
/// loop thread is the only thing that ever touches a `Channel`, so readiness
/// is routed by matching on [`Token`] inside [`EventLoop`](crate::EventLoop)'s
/// own dispatch methods rather than through a stored closure (the same
/// `Token`-keyed `match` the demultiplexer's own worked example uses). A
/// `Channel` only tracks the bits epoll itself needs: its fd, its current
/// interest mask, its bookkeeping mark, and whether it participates in
/// periodic notification.
#[derive(Debug)]
pub struct Channel {
    fd: RawFd,
    token: Token,
    interest: Interest,
    mark: ChannelMark,
    periodic: bool,
}

impl Channel {
    pub fn new(fd: RawFd, token: Token, periodic: bool) -> Channel {
        Channel {
            fd,
            token,
            interest: Interest::NONE,
            mark: ChannelMark::New,
            periodic,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn mark(&self) -> ChannelMark {
        self.mark
    }

    pub(crate) fn set_mark(&mut self, mark: ChannelMark) {
        self.mark = mark;
    }

    pub fn supports_periodic_notification(&self) -> bool {
        self.periodic
    }

    pub fn enable_reading(&mut self) {
        self.interest
            .insert(Interest::READABLE | Interest::PRIORITY | Interest::HANGUP_READ);
    }

    pub fn enable_writing(&mut self) {
        self.interest.insert(Interest::WRITABLE);
    }

    pub fn disable_write(&mut self) {
        self.interest.remove(Interest::WRITABLE);
    }

    pub fn disable_all(&mut self) {
        self.interest = Interest::NONE;
    }

    pub fn is_none_events(&self) -> bool {
        self.interest.is_empty()
    }

    pub fn has_write_op(&self) -> bool {
        self.interest.contains(Interest::WRITABLE)
    }
}

/// The four dispatch branches a ready channel's revents can trigger. All four
/// are independent — not mutually exclusive — mirroring the original
/// `Channel::on_events`, which runs its error/read/write checks regardless of
/// hangup and only uses hangup to decide whether to close *after* read has
/// had a chance to drain whatever bytes arrived alongside it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ReadyOps {
    pub should_close: bool,
    pub should_error: bool,
    pub should_read: bool,
    pub should_write: bool,
}

pub(crate) fn dispatch_order(event: &EpollEvent) -> ReadyOps {
    ReadyOps {
        should_close: event.is_hangup() && !event.is_readable(),
        should_error: event.is_error(),
        should_read: event.is_readable() || event.is_priority() || event.is_read_closed(),
        should_write: event.is_writable(),
    }
}

use std::collections::{HashMap, HashSet};
use std::io;
use std::os::fd::RawFd;

use crate::channel::{dispatch_order, Channel, ChannelMark, ReadyOps};
use crate::clock::current_time_in_millis;
use crate::sys::Epoll;
use crate::token::Token;

/// Owns the loop's `epoll` instance and the bookkeeping the original
/// `EventManager` keeps alongside it: which fds are currently registered,
/// and which of those are periodic-notification observers.
///
/// A `Demultiplexer` only ever runs on its owning loop's thread — like every
/// other per-loop collaborator, it carries no internal locking.
#[derive(Debug)]
pub struct Demultiplexer {
    epoll: Epoll,
    registered: HashMap<RawFd, Token>,
    periodic_fds: HashSet<RawFd>,
}

impl Demultiplexer {
    pub fn new() -> io::Result<Demultiplexer> {
        Ok(Demultiplexer {
            epoll: Epoll::new()?,
            registered: HashMap::new(),
            periodic_fds: HashSet::new(),
        })
    }

    /// Applies `channel`'s current interest set to epoll, issuing
    /// `EPOLL_CTL_ADD`/`MOD`/`DEL` according to its mark and advancing the
    /// mark the same way `EventManager::updateChannel` does.
    pub fn sync(&mut self, channel: &mut Channel) -> io::Result<()> {
        let fd = channel.fd();
        match channel.mark() {
            ChannelMark::New => {
                debug_assert!(!self.registered.contains_key(&fd));
                self.registered.insert(fd, channel.token());
                if channel.supports_periodic_notification() {
                    self.periodic_fds.insert(fd);
                }
                channel.set_mark(ChannelMark::Added);
                self.epoll.add(fd, channel.token(), channel.interest())
            }
            ChannelMark::Deleted => {
                debug_assert_eq!(self.registered.get(&fd), Some(&channel.token()));
                channel.set_mark(ChannelMark::Added);
                self.epoll.add(fd, channel.token(), channel.interest())
            }
            ChannelMark::Added => {
                debug_assert_eq!(self.registered.get(&fd), Some(&channel.token()));
                if channel.is_none_events() {
                    self.epoll.delete(fd)?;
                    channel.set_mark(ChannelMark::Deleted);
                    Ok(())
                } else {
                    self.epoll.modify(fd, channel.token(), channel.interest())
                }
            }
        }
    }

    /// Drops `channel` from the demultiplexer entirely. The channel must
    /// already have an empty interest set (callers disable all interests and
    /// `sync` first, which deregisters it from epoll; this step only clears
    /// the bookkeeping).
    pub fn remove(&mut self, channel: &mut Channel) -> io::Result<()> {
        let fd = channel.fd();
        debug_assert!(channel.is_none_events());
        let mark = channel.mark();
        self.registered.remove(&fd);
        if channel.supports_periodic_notification() {
            self.periodic_fds.remove(&fd);
        }
        if mark == ChannelMark::Added {
            self.epoll.delete(fd)?;
        }
        channel.set_mark(ChannelMark::Deleted);
        Ok(())
    }

    /// Blocks up to `timeout_ms` and returns the monotonic time the wait
    /// returned at, plus each ready channel's token and decoded dispatch
    /// order. A negative `timeout_ms` blocks indefinitely.
    pub fn wait(&mut self, timeout_ms: i32) -> io::Result<(i64, Vec<(Token, ReadyOps)>)> {
        let events = self.epoll.wait(timeout_ms)?;
        let now = current_time_in_millis();
        let ready = events
            .iter()
            .map(|event| (event.token(), dispatch_order(event)))
            .collect();
        Ok((now, ready))
    }

    /// Tokens of every channel registered for periodic notification, used by
    /// [`EventLoop`](crate::EventLoop) to drive `check_periodic_observers`
    /// independently of epoll readiness.
    pub fn periodic_tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.periodic_fds
            .iter()
            .filter_map(|fd| self.registered.get(fd).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interest::Interest;

    #[test]
    fn sync_add_then_disable_marks_channel_deleted() {
        let mut demux = Demultiplexer::new().expect("epoll_create1");
        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let [read_fd, write_fd] = fds;

        let mut channel = Channel::new(read_fd, Token(42), false);
        channel.enable_reading();
        demux.sync(&mut channel).expect("add");
        assert_eq!(channel.mark(), ChannelMark::Added);

        channel.disable_all();
        demux.sync(&mut channel).expect("del");
        assert_eq!(channel.mark(), ChannelMark::Deleted);
        assert!(channel.interest() == Interest::NONE);

        demux.remove(&mut channel).expect("remove");
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }

    #[test]
    fn periodic_tokens_tracks_registered_observers() {
        let mut demux = Demultiplexer::new().expect("epoll_create1");
        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let [read_fd, write_fd] = fds;

        let mut channel = Channel::new(read_fd, Token(1), true);
        channel.enable_reading();
        demux.sync(&mut channel).expect("add");

        let tokens: Vec<_> = demux.periodic_tokens().collect();
        assert_eq!(tokens, vec![Token(1)]);

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }
}

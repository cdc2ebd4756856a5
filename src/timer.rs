use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::io;
use std::os::fd::RawFd;

use crate::channel::Channel;
use crate::clock::current_time_in_millis;
use crate::event_loop::EventLoop;
use crate::sys::TimerFd;
use crate::token::TIMER_TOKEN;

/// A one-shot or repeating timer callback, run on the owning loop's thread
/// with `&mut EventLoop` so it can touch connection state or reschedule
/// itself via [`EventLoop::run_at`]/[`run_after`](EventLoop::run_after).
pub type TimerCallback = Box<dyn FnMut(&mut EventLoop) + Send>;

/// One scheduled timer. Mirrors `TimerNode`: ordered purely by `expiration`,
/// with `seq` breaking ties in insertion order — `std::multiset` keeps
/// equivalent elements (those for which neither compares less than the
/// other) in the order they were inserted, which plain `(expiration,)`
/// ordering in a `BTreeSet` would not preserve, since a `BTreeSet` treats
/// equal keys as the same element.
pub(crate) struct TimerEntry {
    expiration: i64,
    interval: i64,
    repeat: bool,
    seq: u64,
    callback: TimerCallback,
}

impl TimerEntry {
    fn restart(&mut self, now: i64) {
        self.expiration = if self.repeat { now + self.interval } else { -1 };
    }

    /// Runs the callback and, if this entry repeats, returns it rearmed for
    /// its next expiration so the caller can reinsert it into the wheel.
    /// Consumes `self` rather than taking `&mut EventLoop` alongside `&mut
    /// TimerWheel`, since the caller (`EventLoop::dispatch_timer`) already
    /// holds the entry outside the wheel by the time it runs.
    pub(crate) fn fire(mut self, loop_: &mut EventLoop) -> Option<TimerEntry> {
        (self.callback)(loop_);
        if self.repeat {
            self.restart(current_time_in_millis());
            Some(self)
        } else {
            None
        }
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.expiration == other.expiration && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expiration
            .cmp(&other.expiration)
            .then(self.seq.cmp(&other.seq))
    }
}

/// The timer wheel: a `timerfd`-backed multiset of scheduled callbacks.
///
/// Grounded on `TimerQueue`: only the single nearest expiration is ever
/// armed in the kernel (via [`TimerFd::arm`](crate::sys::TimerFd::arm)'s
/// 1000ms floor); everything else just sits in `timers` until its turn.
pub struct TimerWheel {
    channel: Channel,
    timerfd: TimerFd,
    timers: BTreeSet<TimerEntry>,
    next_seq: u64,
}

impl TimerWheel {
    pub fn new() -> io::Result<TimerWheel> {
        let timerfd = TimerFd::new()?;
        let fd = timerfd.as_raw_fd();
        let mut channel = Channel::new(fd, TIMER_TOKEN, false);
        channel.enable_reading();
        Ok(TimerWheel {
            channel,
            timerfd,
            timers: BTreeSet::new(),
            next_seq: 0,
        })
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn fd(&self) -> RawFd {
        self.timerfd.as_raw_fd()
    }

    /// Schedules `callback` to run at `when` (loop-epoch ms), repeating
    /// every `interval` ms if `interval > 0`. Re-arms the kernel timer if
    /// this becomes the nearest expiration.
    pub fn add(&mut self, callback: TimerCallback, when: i64, interval: i64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let earliest = self
            .timers
            .iter()
            .next()
            .map_or(true, |first| when < first.expiration);
        self.timers.insert(TimerEntry {
            expiration: when,
            interval,
            repeat: interval > 0,
            seq,
            callback,
        });
        if earliest {
            self.rearm();
        }
    }

    /// Re-arms the kernel timer for the nearest remaining expiration, or
    /// disarms it if the wheel is empty.
    pub(crate) fn rearm(&self) {
        if let Some(first) = self.timers.iter().next() {
            let millis = first.expiration - current_time_in_millis();
            let _ = self.timerfd.arm(millis);
        } else {
            let _ = self.timerfd.disarm();
        }
    }

    /// Called when the timer channel reports readable. Drains the kernel
    /// counter and pulls out every entry whose expiration is strictly
    /// before `now` — matching `getExpired`'s `lower_bound`, which leaves an
    /// entry expiring at exactly `now` for the following iteration rather
    /// than firing it early.
    pub(crate) fn take_expired(&mut self, now: i64) -> Vec<TimerEntry> {
        let _ = self.timerfd.consume();
        let mut expired = Vec::new();
        while self
            .timers
            .iter()
            .next()
            .is_some_and(|first| first.expiration < now)
        {
            expired.push(self.timers.pop_first().unwrap());
        }
        expired
    }

    pub(crate) fn reinsert(&mut self, entry: TimerEntry) {
        self.timers.insert(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_callback() -> TimerCallback {
        Box::new(|_: &mut EventLoop| {})
    }

    #[test]
    fn timer_entries_with_equal_expiration_preserve_insertion_order() {
        let mut wheel = TimerWheel::new().expect("timerfd_create");
        wheel.add(noop_callback(), 100, 0);
        wheel.add(noop_callback(), 100, 0);
        wheel.add(noop_callback(), 100, 0);
        assert_eq!(wheel.timers.len(), 3);
        let seqs: Vec<_> = wheel.timers.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn take_expired_excludes_entries_expiring_exactly_at_now() {
        let mut wheel = TimerWheel::new().expect("timerfd_create");
        wheel.add(noop_callback(), 100, 0);
        wheel.add(noop_callback(), 200, 0);
        let expired = wheel.take_expired(100);
        assert!(expired.is_empty());
        let expired = wheel.take_expired(101);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].expiration, 100);
    }
}

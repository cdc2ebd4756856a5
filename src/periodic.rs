use crate::clock::current_time_in_millis;
use crate::event_loop::EventLoop;

/// A deadline-ordered, in-process alternative to the timer wheel.
///
/// Grounded on `EventLoop::m_events`/`EventObject`: entries are kept sorted
/// ascending by deadline in a plain `Vec` (the original uses a `std::list`
/// with insert-in-place), and [`PeriodicList::call_events`] both fires due
/// entries and hands back the next `epoll_wait` timeout — capped at 1000ms,
/// defaulting to 1000ms when the list is empty, exactly like the original's
/// `call_events`. Unlike the timer wheel this has no `timerfd` backing and
/// no minimum-arm floor: its only job is to bound how long the loop can
/// block before the next deadline needs attention.
pub struct PeriodicList {
    entries: Vec<PeriodicEntry>,
    next_id: u64,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PeriodicId(u64);

struct PeriodicEntry {
    id: PeriodicId,
    deadline: i64,
    callback: Box<dyn FnMut(&mut EventLoop) + Send>,
}

impl PeriodicList {
    pub fn new() -> PeriodicList {
        PeriodicList {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// Schedules `callback` to run `timeout_ms` from now. Mirrors
    /// `EventLoop::schedule_event`'s sorted insert.
    pub fn schedule(
        &mut self,
        timeout_ms: i64,
        callback: Box<dyn FnMut(&mut EventLoop) + Send>,
    ) -> PeriodicId {
        let id = PeriodicId(self.next_id);
        self.next_id += 1;
        let deadline = current_time_in_millis() + timeout_ms;
        let pos = self
            .entries
            .iter()
            .position(|e| e.deadline > deadline)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            pos,
            PeriodicEntry {
                id,
                deadline,
                callback,
            },
        );
        id
    }

    /// Cancels a pending entry. A no-op if it already fired.
    pub fn remove(&mut self, id: PeriodicId) {
        self.entries.retain(|e| e.id != id);
    }

    /// Fires every entry whose deadline has passed and returns the `epoll`
    /// timeout (ms) to use for the next wait.
    ///
    /// Takes `loop_` by value-out-of-place: callers `mem::take` their
    /// `PeriodicList` field before calling this so `self` and `loop_` are
    /// disjoint borrows (a callback may itself call
    /// [`EventLoop::schedule_event`](crate::event_loop::EventLoop::schedule_event)
    /// to reschedule, which needs `&mut EventLoop`).
    pub fn call_events(&mut self, loop_: &mut EventLoop, now: i64) -> i32 {
        while self.entries.first().is_some_and(|e| e.deadline <= now) {
            let entry = self.entries.remove(0);
            let mut callback = entry.callback;
            callback(loop_);
        }
        match self.entries.first() {
            Some(e) => {
                let diff = e.deadline - current_time_in_millis();
                diff.clamp(0, 1000) as i32
            }
            None => 1000,
        }
    }
}

impl Default for PeriodicList {
    fn default() -> PeriodicList {
        PeriodicList::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_keeps_entries_sorted_by_deadline() {
        let mut list = PeriodicList::new();
        list.schedule(500, Box::new(|_| {}));
        list.schedule(10, Box::new(|_| {}));
        list.schedule(250, Box::new(|_| {}));
        let deadlines: Vec<_> = list.entries.iter().map(|e| e.deadline).collect();
        let mut sorted = deadlines.clone();
        sorted.sort();
        assert_eq!(deadlines, sorted);
    }

    #[test]
    fn remove_drops_the_matching_entry() {
        let mut list = PeriodicList::new();
        let id = list.schedule(100, Box::new(|_| {}));
        list.schedule(200, Box::new(|_| {}));
        list.remove(id);
        assert_eq!(list.entries.len(), 1);
    }
}

use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;

use crate::acceptor::Acceptor;
use crate::channel::Channel;
use crate::clock::current_time_in_millis;
use crate::connection::{ConnId, ConnState, Connection};
use crate::demux::Demultiplexer;
use crate::error::CloseReason;
use crate::periodic::{PeriodicId, PeriodicList};
use crate::scratch::ScratchBuffer;
use crate::sys::Waker;
use crate::timer::TimerWheel;
use crate::token::{Token, ACCEPTOR_TOKEN, TIMER_TOKEN, WAKER_TOKEN};

/// A unit of work posted from another thread, run on the owning loop's
/// thread during the next pending-queue drain. Closures capture only
/// `Send` data — typically a [`ConnId`] and a small payload — never a
/// borrowed reference into another loop's state.
pub type Task = Box<dyn FnOnce(&mut EventLoop) + Send + 'static>;

const DEFAULT_SCRATCH_CAPACITY: usize = 64 * 1024;

thread_local! {
    static LOOP_ON_THIS_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// A cloneable, `Send`-able handle to a running [`EventLoop`], usable from
/// any thread to post work onto it.
///
/// Grounded on the original's `EventLoop::queueInLoop`/`run`: posting never
/// blocks on the loop actually being idle — the task is appended under a
/// short-held lock and a single `eventfd` write wakes the loop out of
/// whatever `epoll_wait` it's blocked in.
#[derive(Clone)]
pub struct LoopHandle {
    thread_id: ThreadId,
    waker: Arc<Waker>,
    pending: Arc<Mutex<VecDeque<Task>>>,
}

impl LoopHandle {
    /// The OS thread this handle's loop runs on.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// `true` if called from the loop's own thread — a direct call would be
    /// safe here instead of posting, though `post` works either way.
    pub fn is_on_loop_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Queues `task` to run on the owning loop's thread and wakes it.
    pub fn post(&self, task: Task) {
        self.pending.lock().unwrap().push_back(task);
        let _ = self.waker.wake();
    }
}

/// A single-threaded reactor: one `epoll` instance, one timer wheel, one
/// periodic-deadline list, and the connections it owns, all touched only
/// from the thread that constructed it.
///
/// Grounded on `EventLoop.{hpp,cpp}`: exactly one `EventLoop` may exist per
/// OS thread (the original asserts this via a thread-local pointer set in
/// the constructor and cleared in the destructor; `new` panics the same
/// way here).
pub struct EventLoop {
    thread_id: ThreadId,
    demux: Demultiplexer,
    timer: TimerWheel,
    periodic: PeriodicList,
    waker: Arc<Waker>,
    waker_channel: Channel,
    acceptor: Option<Acceptor>,
    #[allow(clippy::type_complexity)]
    on_accept: Option<Box<dyn FnMut(&mut EventLoop, RawFd, String, u16) + Send>>,
    connections: HashMap<ConnId, Connection>,
    scratch: ScratchBuffer,
    pending: Arc<Mutex<VecDeque<Task>>>,
    quit: bool,
    /// `true` for the duration of [`EventLoop::drain_pending`]'s body, so
    /// [`EventLoop::queue`] knows a same-thread re-entrant post still needs
    /// a wake rather than silently riding along on the drain already in
    /// progress — mirrors the original's `m_calling_pending_queue`.
    draining: bool,
}

impl EventLoop {
    pub fn new() -> io::Result<EventLoop> {
        LOOP_ON_THIS_THREAD.with(|flag| {
            if flag.get() {
                panic!("only one EventLoop may be constructed per thread");
            }
            flag.set(true);
        });

        let mut demux = Demultiplexer::new()?;
        let timer = TimerWheel::new()?;
        let waker = Arc::new(Waker::new()?);
        let mut waker_channel = Channel::new(waker.as_raw_fd(), WAKER_TOKEN, false);
        waker_channel.enable_reading();
        demux.sync(&mut waker_channel)?;

        let mut loop_ = EventLoop {
            thread_id: std::thread::current().id(),
            demux,
            timer,
            periodic: PeriodicList::new(),
            waker,
            waker_channel,
            acceptor: None,
            on_accept: None,
            connections: HashMap::new(),
            scratch: ScratchBuffer::with_capacity(DEFAULT_SCRATCH_CAPACITY),
            pending: Arc::new(Mutex::new(VecDeque::new())),
            quit: false,
            draining: false,
        };
        // Register the timer wheel's own channel. `demux` and `timer` are
        // disjoint fields, so this borrows each independently.
        loop_.demux.sync(loop_.timer.channel_mut())?;
        Ok(loop_)
    }

    /// A cloneable handle other threads can use to post work onto this loop.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            thread_id: std::thread::current().id(),
            waker: Arc::clone(&self.waker),
            pending: Arc::clone(&self.pending),
        }
    }

    pub fn scratch_mut(&mut self) -> &mut ScratchBuffer {
        &mut self.scratch
    }

    pub(crate) fn sync_channel(&mut self, channel: &mut Channel) -> io::Result<()> {
        self.demux.sync(channel)
    }

    pub(crate) fn forget_channel(&mut self, channel: &mut Channel) {
        if let Err(e) = self.demux.remove(channel) {
            log::warn!("failed to deregister channel for fd {}: {}", channel.fd(), e);
        }
    }

    /// Installs the loop's listening socket and the callback invoked for
    /// every accepted client. Only the base loop of a [`Server`](crate::Server)
    /// ever calls this.
    pub fn set_acceptor(
        &mut self,
        mut acceptor: Acceptor,
        on_accept: impl FnMut(&mut EventLoop, RawFd, String, u16) + Send + 'static,
    ) -> io::Result<()> {
        acceptor.start_listening()?;
        self.demux.sync(acceptor.channel_mut())?;
        self.acceptor = Some(acceptor);
        self.on_accept = Some(Box::new(on_accept));
        Ok(())
    }

    pub fn insert_connection(&mut self, conn: Connection) {
        self.connections.insert(conn.conn_id(), conn);
    }

    pub fn establish_connection(&mut self, id: ConnId) {
        if let Some(mut conn) = self.connections.remove(&id) {
            conn.handle_established(self);
            self.connections.insert(id, conn);
        }
    }

    pub fn destroy_connection(&mut self, id: ConnId) {
        if let Some(mut conn) = self.connections.remove(&id) {
            conn.handle_destroyed(self);
            // `conn` drops here, closing its fd.
        }
    }

    pub fn write_to_connection(&mut self, id: ConnId, data: &[u8]) {
        if let Some(mut conn) = self.connections.remove(&id) {
            conn.write_buffer(self, data);
            self.connections.insert(id, conn);
        }
    }

    pub fn shutdown_connection(&mut self, id: ConnId) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.shutdown();
        }
    }

    pub fn brute_close_connection(&mut self, id: ConnId) {
        if let Some(mut conn) = self.connections.remove(&id) {
            conn.handle_close(self, CloseReason::Brute);
            self.connections.insert(id, conn);
        }
    }

    pub fn connection_state(&self, id: ConnId) -> Option<ConnState> {
        self.connections.get(&id).map(Connection::state)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn with_connection<R>(
        &mut self,
        id: ConnId,
        f: impl FnOnce(&mut Connection) -> R,
    ) -> Option<R> {
        self.connections.get_mut(&id).map(f)
    }

    pub(crate) fn notify_write_complete(&mut self, id: ConnId) {
        if let Some(mut conn) = self.connections.remove(&id) {
            let callbacks = Arc::clone(conn.callbacks());
            (callbacks.on_write_complete)(self, id);
            self.connections.insert(id, conn);
        }
    }

    /// `true` if called from this loop's own thread.
    pub fn is_on_loop_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Posts `task` to run on this loop's thread during the next pending
    /// queue drain. Safe to call from the loop's own thread (it will run on
    /// the following iteration) or from another thread via [`LoopHandle`].
    ///
    /// Only wakes the loop if the caller isn't on the loop's own thread, or
    /// if it is but the loop is currently inside [`EventLoop::drain_pending`]
    /// — a task that queues another task from outside the drain will be
    /// picked up on the loop's next iteration regardless, so waking again
    /// would be redundant; one queued mid-drain needs the wake so it isn't
    /// silently deferred to the next unrelated `epoll_wait` return.
    pub fn queue(&mut self, task: Task) {
        self.pending.lock().unwrap().push_back(task);
        if !self.is_on_loop_thread() || self.draining {
            let _ = self.waker.wake();
        }
    }

    /// Schedules `callback` to run once at `when_ms` (loop-epoch
    /// milliseconds), via the `timerfd`-backed timer wheel.
    pub fn run_at(&mut self, when_ms: i64, callback: impl FnMut(&mut EventLoop) + Send + 'static) {
        self.timer.add(Box::new(callback), when_ms, 0);
    }

    /// Schedules `callback` to run once, `delay_ms` from now.
    pub fn run_after(
        &mut self,
        delay_ms: i64,
        callback: impl FnMut(&mut EventLoop) + Send + 'static,
    ) {
        self.run_at(current_time_in_millis() + delay_ms, callback);
    }

    /// Schedules `callback` to run every `interval_ms`, starting
    /// `interval_ms` from now.
    pub fn run_every(
        &mut self,
        interval_ms: i64,
        callback: impl FnMut(&mut EventLoop) + Send + 'static,
    ) {
        let when = current_time_in_millis() + interval_ms;
        self.timer.add(Box::new(callback), when, interval_ms);
    }

    /// Schedules `callback` on the in-process periodic list, `timeout_ms`
    /// from now. Unlike [`EventLoop::run_after`], this never touches the
    /// kernel timer — it only shortens the next `epoll_wait` timeout.
    pub fn schedule_event(
        &mut self,
        timeout_ms: i64,
        callback: impl FnMut(&mut EventLoop) + Send + 'static,
    ) -> PeriodicId {
        self.periodic.schedule(timeout_ms, Box::new(callback))
    }

    pub fn remove_event(&mut self, id: PeriodicId) {
        self.periodic.remove(id);
    }

    /// Requests the loop exit after the current iteration finishes.
    pub fn quit(&mut self) {
        self.quit = true;
    }

    /// Runs iterations until [`EventLoop::quit`] is called.
    pub fn run_forever(&mut self) -> io::Result<()> {
        while !self.quit {
            self.run_once()?;
        }
        self.quit = false;
        Ok(())
    }

    /// Runs a single iteration: compute the next wait timeout from the
    /// periodic list, block in `epoll_wait`, dispatch every ready channel,
    /// drain the pending task queue, then poll every periodic-notification
    /// observer — mirroring `EventLoop::loop_once`.
    pub fn run_once(&mut self) -> io::Result<()> {
        let mut periodic = std::mem::take(&mut self.periodic);
        let now = current_time_in_millis();
        let timeout_ms = periodic.call_events(self, now);

        let (now, ready) = self.demux.wait(timeout_ms)?;
        periodic.call_events(self, now);
        self.periodic = periodic;

        for (token, ops) in ready {
            self.dispatch_token(token, ops, now);
        }

        self.drain_pending();
        self.check_periodic_observers(now);
        Ok(())
    }

    fn dispatch_token(&mut self, token: Token, ops: crate::channel::ReadyOps, now: i64) {
        match token {
            WAKER_TOKEN => self.dispatch_waker(ops),
            TIMER_TOKEN => self.dispatch_timer(ops, now),
            ACCEPTOR_TOKEN => self.dispatch_acceptor(ops),
            _ => self.dispatch_connection(ConnId::from(token), ops, now),
        }
    }

    fn dispatch_waker(&mut self, ops: crate::channel::ReadyOps) {
        if ops.should_read {
            let _ = self.waker.reset();
        }
    }

    fn dispatch_timer(&mut self, ops: crate::channel::ReadyOps, now: i64) {
        if !ops.should_read {
            return;
        }
        let expired = self.timer.take_expired(now);
        for entry in expired {
            if let Some(rearmed) = entry.fire(self) {
                self.timer.reinsert(rearmed);
            }
        }
        self.timer.rearm();
    }

    fn dispatch_acceptor(&mut self, ops: crate::channel::ReadyOps) {
        if !ops.should_read {
            return;
        }
        let Some(acceptor) = self.acceptor.take() else {
            return;
        };
        let mut accepted = Vec::new();
        acceptor.accept_ready(|fd, ip, port| accepted.push((fd, ip, port)));
        self.acceptor = Some(acceptor);

        let Some(mut on_accept) = self.on_accept.take() else {
            return;
        };
        for (fd, ip, port) in accepted {
            on_accept(self, fd, ip, port);
        }
        self.on_accept = Some(on_accept);
    }

    /// Runs every applicable branch for one ready channel. The branches are
    /// independent, not mutually exclusive — in particular `should_read` is
    /// dispatched even when `should_close` is also set, so bytes that
    /// arrived alongside a hangup are drained before the connection closes,
    /// matching `Channel::on_events`'s ordering.
    fn dispatch_connection(&mut self, id: ConnId, ops: crate::channel::ReadyOps, now: i64) {
        let Some(mut conn) = self.connections.remove(&id) else {
            return;
        };
        if ops.should_error {
            conn.handle_error_event(self);
        }
        if ops.should_read {
            conn.handle_read(self, now);
        }
        if ops.should_write {
            conn.handle_write(self);
        }
        if ops.should_close {
            conn.handle_close(self, CloseReason::PeerClosed);
        }
        self.connections.insert(id, conn);
    }

    fn drain_pending(&mut self) {
        self.draining = true;
        let tasks: Vec<Task> = self.pending.lock().unwrap().drain(..).collect();
        for task in tasks {
            task(self);
        }
        self.draining = false;
    }

    fn check_periodic_observers(&mut self, now: i64) {
        let ids: Vec<ConnId> = self.demux.periodic_tokens().map(ConnId::from).collect();
        for id in ids {
            if let Some(mut conn) = self.connections.remove(&id) {
                conn.on_periodic_notification(self, now);
                self.connections.insert(id, conn);
            }
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        LOOP_ON_THIS_THREAD.with(|flag| flag.set(false));
    }
}

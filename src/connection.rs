use std::any::Any;
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

use crate::byte_stream::ByteStream;
use crate::channel::Channel;
use crate::clock::current_time_in_millis;
use crate::error::CloseReason;
use crate::event_loop::EventLoop;
use crate::sockopt;
use crate::token::Token;

/// Identifies a connection across its lifetime, independent of which
/// worker loop owns it. Assigned once by [`Server`](crate::Server) and
/// reused as the `Token` the connection's channel registers under.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ConnId(pub u64);

impl From<ConnId> for Token {
    fn from(id: ConnId) -> Token {
        Token(id.0 as usize)
    }
}

impl From<Token> for ConnId {
    fn from(token: Token) -> ConnId {
        ConnId(token.0 as u64)
    }
}

/// Mirrors `TcpConnection`'s `StateE`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

/// The embedder-supplied hooks passed to [`Server::new`](crate::Server::new):
/// connection lifecycle, inbound data, and write completion. Shared behind
/// an `Arc` since one server installs the same three closures for every
/// connection it accepts.
pub struct Handlers {
    pub on_state_change: Box<dyn Fn(&mut EventLoop, ConnId, ConnState) + Send + Sync>,
    pub on_data: Box<dyn Fn(&mut EventLoop, ConnId, &[u8], i64) + Send + Sync>,
    pub on_write_complete: Box<dyn Fn(&mut EventLoop, ConnId) + Send + Sync>,
}

/// The full hook set a [`Connection`] actually invokes: the embedder's
/// [`Handlers`] plus an internal `on_closed` slot [`Server`](crate::Server)
/// wires to its own teardown bookkeeping. Unlike the original, where each
/// `TcpConnection` carries its own `std::function` copies, these are shared
/// behind an `Arc` since in practice one server installs the same handlers
/// for every connection it owns.
pub struct Callbacks {
    /// Called on the owning loop's thread when a connection's state
    /// changes to `Connected` or `Disconnected` — the counterpart of
    /// `connection_established`/`connection_destroyed`'s shared
    /// `m_connection_state_change_cb`.
    pub on_state_change: Box<dyn Fn(&mut EventLoop, ConnId, ConnState) + Send + Sync>,
    pub on_data: Box<dyn Fn(&mut EventLoop, ConnId, &[u8], i64) + Send + Sync>,
    pub on_write_complete: Box<dyn Fn(&mut EventLoop, ConnId) + Send + Sync>,
    /// Posted, not called inline: wired by `Server` to remove the
    /// connection from its table (on the base loop) and then queue
    /// `EventLoop::destroy_connection` back on the owning loop, mirroring
    /// `TcpServer::remove_connection`/`remove_connection_internal`.
    pub on_closed: Box<dyn Fn(&mut EventLoop, ConnId) + Send + Sync>,
}

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// A single accepted TCP connection and its read/write state machine.
///
/// Lives exclusively inside its owning [`EventLoop`]'s connection table —
/// see that module for how dispatch temporarily removes a `Connection` from
/// the table to get an unaliased `&mut EventLoop` alongside it.
pub struct Connection {
    fd: RawFd,
    ip: String,
    port: u16,
    conn_id: ConnId,
    state: ConnState,
    channel: Channel,
    outgoing: ByteStream,
    timeout_secs: i64,
    last_event_time: i64,
    callbacks: Arc<Callbacks>,
    context: Option<Box<dyn Any + Send>>,
}

impl Connection {
    pub fn new(
        fd: RawFd,
        ip: String,
        port: u16,
        conn_id: ConnId,
        callbacks: Arc<Callbacks>,
    ) -> Connection {
        let channel = Channel::new(fd, conn_id.into(), true);
        Connection {
            fd,
            ip,
            port,
            conn_id,
            state: ConnState::Connecting,
            channel,
            outgoing: ByteStream::new(),
            timeout_secs: 15,
            last_event_time: current_time_in_millis(),
            callbacks,
            context: None,
        }
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    pub fn ip_addr(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnState::Connected
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub(crate) fn callbacks(&self) -> &Arc<Callbacks> {
        &self.callbacks
    }

    pub fn set_timeout_secs(&mut self, timeout_secs: i64) {
        self.timeout_secs = timeout_secs;
        self.last_event_time = current_time_in_millis();
    }

    pub fn set_context(&mut self, context: Box<dyn Any + Send>) {
        self.context = Some(context);
    }

    pub fn context(&self) -> Option<&(dyn Any + Send)> {
        self.context.as_deref()
    }

    pub fn context_mut(&mut self) -> Option<&mut (dyn Any + Send)> {
        self.context.as_deref_mut()
    }

    /// Queues `data` for sending. If the connection isn't mid-write
    /// already, enables the writable interest so the next readiness pass
    /// drains it. No-op outside `Connected`, matching `write_buffer`'s
    /// state guard.
    pub(crate) fn write_buffer(&mut self, loop_: &mut EventLoop, data: &[u8]) {
        if self.state != ConnState::Connected {
            log::warn!(
                "write attempted on connection {} while not connected",
                self.conn_id.0
            );
            return;
        }
        self.outgoing.append(data);
        if !self.channel.has_write_op() && self.outgoing.has_data() {
            self.channel.enable_writing();
            let _ = loop_.sync_channel(&mut self.channel);
        }
    }

    /// Moves to `Connected`, starts reading, and notifies the embedder.
    pub(crate) fn handle_established(&mut self, loop_: &mut EventLoop) {
        debug_assert_eq!(self.state, ConnState::Connecting);
        self.state = ConnState::Connected;
        self.channel.enable_reading();
        let _ = loop_.sync_channel(&mut self.channel);
        self.last_event_time = current_time_in_millis();
        (self.callbacks.on_state_change)(loop_, self.conn_id, ConnState::Connected);
    }

    /// Finalizes teardown: deregisters the channel and notifies the
    /// embedder a final time. Accepts either `Connected` or
    /// `Disconnecting` — see `DESIGN.md` for why this departs from the
    /// original's `Connected`-only assertion.
    pub(crate) fn handle_destroyed(&mut self, loop_: &mut EventLoop) {
        debug_assert!(matches!(
            self.state,
            ConnState::Connected | ConnState::Disconnecting
        ));
        self.state = ConnState::Disconnected;
        self.channel.disable_all();
        let _ = loop_.sync_channel(&mut self.channel);
        (self.callbacks.on_state_change)(loop_, self.conn_id, ConnState::Disconnected);
        loop_.forget_channel(&mut self.channel);
    }

    /// Requests a graceful half-close: stops accepting new writes once the
    /// outgoing queue drains, then shuts down the write half.
    pub(crate) fn shutdown(&mut self) {
        if self.state != ConnState::Connected {
            log::warn!(
                "shutdown requested on connection {} in state {:?}",
                self.conn_id.0,
                self.state
            );
            return;
        }
        self.state = ConnState::Disconnecting;
        self.shutdown_internal();
    }

    fn shutdown_internal(&mut self) {
        if self.channel.has_write_op() {
            // Outgoing data is still pending; `handle_write` calls this
            // again once the queue drains.
            return;
        }
        if unsafe { libc::shutdown(self.fd, libc::SHUT_WR) } < 0 {
            let err = io::Error::last_os_error();
            log::warn!(
                "socket shutdown failed for connection {} [{}]: {}",
                self.conn_id.0,
                self.ip,
                err
            );
        }
    }

    pub(crate) fn handle_read(&mut self, loop_: &mut EventLoop, receive_time: i64) {
        if let Some(errno) = sockopt::take_socket_error(self.fd) {
            self.handle_socket_errno(loop_, errno);
            return;
        }

        loop {
            let scratch = loop_.scratch_mut();
            scratch.rewind();
            let n = unsafe {
                libc::recv(
                    self.fd,
                    scratch.as_mut_slice().as_mut_ptr().cast(),
                    READ_CHUNK_SIZE.min(scratch.as_mut_slice().len()),
                    0,
                )
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    break;
                }
                self.handle_socket_errno(loop_, err.raw_os_error().unwrap_or(0));
                return;
            }

            if n == 0 {
                self.handle_close(loop_, CloseReason::PeerClosed);
                return;
            }

            let scratch = loop_.scratch_mut();
            scratch.limit(n as usize);
            self.last_event_time = current_time_in_millis();
            let bytes = scratch.bytes().to_vec();
            (self.callbacks.on_data)(loop_, self.conn_id, &bytes, receive_time);
        }
    }

    pub(crate) fn handle_write(&mut self, loop_: &mut EventLoop) {
        if !self.channel.has_write_op() {
            log::warn!(
                "handle_write called on connection {} without a pending write",
                self.conn_id.0
            );
            return;
        }
        if let Some(errno) = sockopt::take_socket_error(self.fd) {
            self.handle_socket_errno(loop_, errno);
            return;
        }

        while self.outgoing.has_data() {
            let scratch = loop_.scratch_mut();
            scratch.clear();
            self.outgoing.get(scratch);
            scratch.flip();
            let chunk = scratch.bytes().to_vec();

            let n = unsafe { libc::send(self.fd, chunk.as_ptr().cast(), chunk.len(), 0) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    break;
                }
                self.handle_socket_errno(loop_, err.raw_os_error().unwrap_or(0));
                return;
            }
            self.outgoing.discard(n as usize);
            if (n as usize) < chunk.len() {
                // Partial send: the socket buffer is full, the rest waits
                // for the next writable readiness.
                break;
            }
        }

        if !self.outgoing.has_data() {
            self.channel.disable_write();
            let _ = loop_.sync_channel(&mut self.channel);
            let id = self.conn_id;
            loop_.queue(Box::new(move |loop_: &mut EventLoop| {
                loop_.notify_write_complete(id);
            }));
            if self.state == ConnState::Disconnecting {
                self.shutdown_internal();
            }
        }
    }

    pub(crate) fn handle_close(&mut self, loop_: &mut EventLoop, reason: CloseReason) {
        if self.channel.is_none_events() {
            // Already closing: `should_read` and `should_close` can both be
            // set for the same readiness event, and a `handle_read` that hit
            // EOF or a socket error already closed this connection.
            return;
        }
        debug_assert!(matches!(
            self.state,
            ConnState::Connected | ConnState::Disconnecting
        ));
        log::debug!(
            "closing connection {} [{}]: {:?}",
            self.conn_id.0,
            self.ip,
            reason
        );
        self.last_event_time = current_time_in_millis();
        self.channel.disable_all();
        let _ = loop_.sync_channel(&mut self.channel);
        let id = self.conn_id;
        let callbacks = Arc::clone(&self.callbacks);
        (callbacks.on_closed)(loop_, id);
    }

    /// A bare `EPOLLERR` readiness notification: read back `SO_ERROR` and
    /// close accordingly, matching `TcpConnection::handleError`.
    pub(crate) fn handle_error_event(&mut self, loop_: &mut EventLoop) {
        let errno = sockopt::take_socket_error(self.fd).unwrap_or(0);
        self.handle_socket_errno(loop_, errno);
    }

    fn handle_socket_errno(&mut self, loop_: &mut EventLoop, errno: i32) {
        match CloseReason::from_errno(errno) {
            Some(reason) => self.handle_close(loop_, reason),
            None => log::warn!(
                "unhandled socket error {} on connection {} [{}]",
                errno,
                self.conn_id.0,
                self.ip
            ),
        }
    }

    /// The periodic-notification hook: idle-timeout bookkeeping, run once
    /// per loop iteration regardless of `epoll` readiness.
    pub(crate) fn on_periodic_notification(&mut self, loop_: &mut EventLoop, now: i64) {
        self.check_timeout(loop_, now);
    }

    fn check_timeout(&mut self, loop_: &mut EventLoop, now: i64) {
        if self.timeout_secs == 0
            || !matches!(self.state, ConnState::Connected | ConnState::Disconnecting)
        {
            return;
        }
        let diff = now - self.last_event_time;
        let timeout_ms = self.timeout_secs * 1000;
        if diff <= timeout_ms {
            return;
        }
        if diff > timeout_ms + 10_000 {
            log::error!(
                "connection {} [{}] idle for {}ms past a {}ms timeout, forcing close",
                self.conn_id.0,
                self.ip,
                diff,
                timeout_ms
            );
            self.handle_close(loop_, CloseReason::Brute);
        } else {
            self.shutdown();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
        self.outgoing.clean();
    }
}

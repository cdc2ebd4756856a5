/// Why a [`Connection`](crate::Connection) was closed.
///
/// These are not propagated as an error type — per the kernel's error model
/// a socket-level failure never crosses connection boundaries, it only ever
/// terminates the one affected connection — they are simply recorded on the
/// close path and logged at the appropriate severity.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(i8)]
pub enum CloseReason {
    /// The peer closed its write half (`recv` returned `0`).
    PeerClosed = 0,
    /// Connection reset, host/network unreachable, protocol error, or the
    /// peer already shut down its side.
    ConnError = 1,
    /// The connection was idle past its configured timeout.
    IdleTimeout = 3,
    /// `send`/`recv` failed with `EPIPE`.
    BrokenPipe = 4,
    /// Closed immediately, bypassing any graceful half-close, because the
    /// connection was idle well past its grace period or the embedder asked
    /// for a forceful close.
    Brute = -1,
}

impl CloseReason {
    /// Maps a raw `errno` observed on a socket to a close reason, per §4.6 of
    /// the kernel's design: connection-remote and timeout errors are mapped,
    /// everything else is left for the caller to log and ignore.
    pub(crate) fn from_errno(errno: i32) -> Option<CloseReason> {
        match errno {
            libc::ECONNRESET | libc::ECONNABORTED => Some(CloseReason::ConnError),
            libc::ENETUNREACH | libc::EHOSTUNREACH => Some(CloseReason::ConnError),
            libc::EPROTO | libc::ENOTCONN | libc::ESHUTDOWN | libc::ENETDOWN => {
                Some(CloseReason::ConnError)
            }
            libc::ETIMEDOUT => Some(CloseReason::IdleTimeout),
            libc::EPIPE => Some(CloseReason::BrokenPipe),
            _ => None,
        }
    }
}

/// Associates an [`EventLoop`](crate::EventLoop)-registered I/O handle with the
/// readiness events reported for it.
///
/// A `Token` is an opaque handle chosen by the caller at registration time; the
/// demultiplexer hands it back unchanged on every readiness event so the
/// caller can map it back to whatever it identifies (usually a raw file
/// descriptor). Two reserved tokens, [`WAKER_TOKEN`] and [`TIMER_TOKEN`], are
/// carved out of the top of the `usize` range for the event loop's own
/// internal channels, mirroring the `NOTIFY`/`TIMER` reserved tokens of
/// historical single-threaded reactors.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Token(pub usize);

/// Reserved token for the cross-thread waker's channel.
pub const WAKER_TOKEN: Token = Token(usize::MAX);
/// Reserved token for the timer wheel's `timerfd` channel.
pub const TIMER_TOKEN: Token = Token(usize::MAX - 1);
/// Reserved token for the acceptor's listening socket. A server owns at
/// most one acceptor per base loop, so a single fixed token suffices.
pub const ACCEPTOR_TOKEN: Token = Token(usize::MAX - 2);

impl From<usize> for Token {
    fn from(val: usize) -> Token {
        Token(val)
    }
}

impl From<Token> for usize {
    fn from(val: Token) -> usize {
        val.0
    }
}

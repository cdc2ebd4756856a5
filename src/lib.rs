//! A single-threaded-per-core reactor kernel for building non-blocking TCP
//! servers: `epoll`-based readiness multiplexing, a `timerfd`-backed timer
//! wheel, an in-process periodic-deadline list, and an `eventfd` waker for
//! posting work across threads.
//!
//! The crate is organized the way `mio` organizes its own `Poll`/`Registry`
//! split: a small set of public types at the root, with every OS-specific
//! primitive living under [`sys`] behind a Unix-only backend. Only Linux is
//! supported — `epoll`, `timerfd`, and `eventfd` are assumed throughout.
//!
//! ```text
//! Server  -- owns --> Acceptor + LoopPool
//! LoopPool -- owns --> N worker threads, each running one EventLoop
//! EventLoop -- owns --> Demultiplexer + TimerWheel + PeriodicList + Connections
//! ```
//!
//! A [`Server`] accepts on its base loop and hands each connection to one
//! worker loop for its entire lifetime; cross-thread operations
//! ([`Server::write`], [`Server::shutdown_connection`]) route to that
//! loop via a [`LoopHandle`].

mod acceptor;
mod byte_stream;
mod channel;
mod clock;
mod connection;
mod demux;
mod error;
mod event_loop;
mod interest;
mod periodic;
mod pool;
mod scratch;
mod server;
mod sockopt;
mod sys;
mod timer;
mod token;

pub use acceptor::Acceptor;
pub use byte_stream::ByteStream;
pub use channel::{Channel, ChannelMark, ReadyOps};
pub use clock::current_time_in_millis;
pub use connection::{Callbacks, ConnId, ConnState, Connection, Handlers};
pub use demux::Demultiplexer;
pub use error::CloseReason;
pub use event_loop::{EventLoop, LoopHandle, Task};
pub use interest::Interest;
pub use periodic::{PeriodicId, PeriodicList};
pub use pool::{LoopPool, LoopPoolHandle, LoopThread};
pub use scratch::ScratchBuffer;
pub use server::{Server, ServerConfig};
pub use timer::TimerWheel;
pub use token::{Token, ACCEPTOR_TOKEN, TIMER_TOKEN, WAKER_TOKEN};

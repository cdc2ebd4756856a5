use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use crate::acceptor::Acceptor;
use crate::connection::{Callbacks, ConnId, ConnState, Connection, Handlers};
use crate::event_loop::{EventLoop, LoopHandle};
use crate::pool::LoopPool;

const DEFAULT_BUF_SIZE: i32 = 64 * 1024;
const DEFAULT_BACKLOG: i32 = 1024;
const DEFAULT_IDLE_TIMEOUT_SECS: i64 = 15;

/// Builder for a [`Server`]'s listening socket and worker pool, mirroring
/// `TcpServer`'s constructor parameters as chained setters instead of a
/// positional argument list.
pub struct ServerConfig {
    listen_port: u16,
    name: String,
    server_id: u32,
    snd_buf: i32,
    rcv_buf: i32,
    keep_alive: i32,
    backlog: i32,
    with_linger: bool,
    pool_size: usize,
    idle_timeout_secs: i64,
}

impl ServerConfig {
    pub fn new(listen_port: u16) -> ServerConfig {
        let pool_size = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        ServerConfig {
            listen_port,
            name: "reactor-server".to_string(),
            server_id: 0,
            snd_buf: DEFAULT_BUF_SIZE,
            rcv_buf: DEFAULT_BUF_SIZE,
            keep_alive: 1,
            backlog: DEFAULT_BACKLOG,
            with_linger: false,
            pool_size,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_server_id(mut self, server_id: u32) -> Self {
        self.server_id = server_id;
        self
    }

    pub fn with_buffers(mut self, snd_buf: i32, rcv_buf: i32) -> Self {
        self.snd_buf = snd_buf;
        self.rcv_buf = rcv_buf;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive as i32;
        self
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Opts every accepted socket into `SO_LINGER{on=1, linger=0}` —
    /// closing a connection then sends an immediate RST. Off by default.
    pub fn with_linger(mut self, with_linger: bool) -> Self {
        self.with_linger = with_linger;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_idle_timeout_secs(mut self, idle_timeout_secs: i64) -> Self {
        self.idle_timeout_secs = idle_timeout_secs;
        self
    }
}

type OwnerMap = Arc<Mutex<HashMap<ConnId, LoopHandle>>>;

/// The acceptor, loop pool, and connection-to-worker routing table that
/// together make up a running TCP server.
///
/// Grounded on `TcpServer`: accepts run on the base loop (the thread that
/// calls [`Server::run`]), each accepted connection is hard-assigned to one
/// worker loop for its whole lifetime, and external operations
/// ([`Server::write`], [`Server::shutdown_connection`],
/// [`Server::brute_close`]) route to that connection's owning loop by
/// posting a task rather than touching it directly.
pub struct Server {
    name: String,
    server_id: u32,
    idle_timeout_secs: i64,
    base_loop: EventLoop,
    pool: LoopPool,
    handlers: Arc<Handlers>,
    next_conn_id: Arc<AtomicU64>,
    connection_owner: OwnerMap,
    acceptor_config: (u16, i32, i32, i32, i32, bool),
    bound_port: u16,
    started: bool,
}

impl Server {
    pub fn new(config: ServerConfig, handlers: Handlers) -> io::Result<Server> {
        let base_loop = EventLoop::new()?;
        let mut pool = LoopPool::new(base_loop.handle());
        pool.start(config.pool_size)?;
        Ok(Server {
            name: config.name,
            server_id: config.server_id,
            idle_timeout_secs: config.idle_timeout_secs,
            base_loop,
            pool,
            handlers: Arc::new(handlers),
            next_conn_id: Arc::new(AtomicU64::new(1)),
            connection_owner: Arc::new(Mutex::new(HashMap::new())),
            acceptor_config: (
                config.listen_port,
                config.snd_buf,
                config.rcv_buf,
                config.keep_alive,
                config.backlog,
                config.with_linger,
            ),
            bound_port: 0,
            started: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    pub fn pool_size(&self) -> usize {
        self.pool.pool_size()
    }

    /// The port actually bound after [`Server::start`], useful when the
    /// configured port was `0` ("any free port"). `0` before `start`.
    pub fn listen_port(&self) -> u16 {
        self.bound_port
    }

    /// A handle to the base loop, usable from any thread to post work or
    /// request shutdown via [`EventLoop::quit`].
    pub fn handle(&self) -> LoopHandle {
        self.base_loop.handle()
    }

    /// Binds and starts listening. Idempotent, matching `TcpServer::start`.
    pub fn start(&mut self) -> io::Result<()> {
        if self.started {
            return Ok(());
        }

        let (listen_port, snd_buf, rcv_buf, keep_alive, backlog, with_linger) =
            self.acceptor_config;
        let acceptor = Acceptor::new(listen_port, snd_buf, rcv_buf, keep_alive, backlog, with_linger)?;
        self.bound_port = acceptor.local_port()?;

        let pool_handle = self.pool.handle();
        let handlers = Arc::clone(&self.handlers);
        let owner_map = Arc::clone(&self.connection_owner);
        let next_conn_id = Arc::clone(&self.next_conn_id);
        let idle_timeout_secs = self.idle_timeout_secs;

        self.base_loop
            .set_acceptor(acceptor, move |_loop, fd, ip, port| {
                let id = ConnId(next_conn_id.fetch_add(1, Ordering::Relaxed));
                let worker = pool_handle.get_next_loop();
                owner_map.lock().unwrap().insert(id, worker.clone());

                let conn_callbacks = Arc::new(wrap_callbacks(Arc::clone(&handlers), Arc::clone(&owner_map)));

                worker.post(Box::new(move |loop_: &mut EventLoop| {
                    let mut conn = Connection::new(fd, ip, port, id, conn_callbacks);
                    conn.set_timeout_secs(idle_timeout_secs);
                    loop_.insert_connection(conn);
                    loop_.establish_connection(id);
                }));
            })?;

        self.started = true;
        Ok(())
    }

    /// Blocks the calling thread running the base loop forever, dispatching
    /// accepts and any base-loop-posted work until [`EventLoop::quit`] is
    /// called on it.
    pub fn run(&mut self) -> io::Result<()> {
        self.base_loop.run_forever()
    }

    /// Requests the base loop stop after its current iteration. Worker
    /// loops keep running until the `Server` itself is dropped.
    pub fn stop(&self) {
        self.handle()
            .post(Box::new(|loop_: &mut EventLoop| loop_.quit()));
    }

    fn owner_of(&self, id: ConnId) -> Option<LoopHandle> {
        self.connection_owner.lock().unwrap().get(&id).cloned()
    }

    /// Queues `data` for writing to connection `id`, on whichever loop owns
    /// it. A no-op if the connection is unknown (already closed).
    pub fn write(&self, id: ConnId, data: Vec<u8>) {
        if let Some(owner) = self.owner_of(id) {
            owner.post(Box::new(move |loop_: &mut EventLoop| {
                loop_.write_to_connection(id, &data);
            }));
        }
    }

    /// Requests a graceful half-close of connection `id`.
    pub fn shutdown_connection(&self, id: ConnId) {
        if let Some(owner) = self.owner_of(id) {
            owner.post(Box::new(move |loop_: &mut EventLoop| {
                loop_.shutdown_connection(id);
            }));
        }
    }

    /// Closes connection `id` immediately, bypassing any pending writes.
    pub fn brute_close(&self, id: ConnId) {
        if let Some(owner) = self.owner_of(id) {
            owner.post(Box::new(move |loop_: &mut EventLoop| {
                loop_.brute_close_connection(id);
            }));
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connection_owner.lock().unwrap().len()
    }

    /// Looks up connection `id`'s current state, the base-loop-visible
    /// "connection table" the spec describes. Since each connection
    /// actually lives on the worker loop it was handed to rather than the
    /// base loop, this posts a query to the owning loop and blocks for its
    /// synchronous reply. `None` if `id` is unknown (never existed, or
    /// already destroyed).
    pub fn conn(&self, id: ConnId) -> Option<ConnState> {
        let owner = self.owner_of(id)?;
        let (tx, rx) = mpsc::channel();
        owner.post(Box::new(move |loop_: &mut EventLoop| {
            let _ = tx.send(loop_.connection_state(id));
        }));
        rx.recv().ok().flatten()
    }
}

fn wrap_callbacks(user: Arc<Handlers>, owner_map: OwnerMap) -> Callbacks {
    let state_change_cb = Arc::clone(&user);
    let data_cb = Arc::clone(&user);
    let write_complete_cb = Arc::clone(&user);

    Callbacks {
        on_state_change: Box::new(move |loop_, id, state| {
            (state_change_cb.on_state_change)(loop_, id, state)
        }),
        on_data: Box::new(move |loop_, id, data, t| (data_cb.on_data)(loop_, id, data, t)),
        on_write_complete: Box::new(move |loop_, id| (write_complete_cb.on_write_complete)(loop_, id)),
        on_closed: Box::new(move |loop_: &mut EventLoop, id: ConnId| {
            owner_map.lock().unwrap().remove(&id);
            loop_.queue(Box::new(move |loop_: &mut EventLoop| {
                loop_.destroy_connection(id);
            }));
        }),
    }
}

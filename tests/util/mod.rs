// Not all helpers are used by every test.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Once;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use reactor_kernel::{EventLoop, Handlers, LoopHandle, Server, ServerConfig};

pub fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::try_init();
    });
}

/// A `Server` started on an OS-assigned port, running on a background
/// thread. Dropping it posts a quit request to the base loop and joins.
pub struct TestServer {
    handle: LoopHandle,
    join: Option<JoinHandle<()>>,
    port: u16,
}

impl TestServer {
    pub fn start(config: ServerConfig, handlers: Handlers) -> TestServer {
        let mut server = Server::new(config, handlers).expect("Server::new");
        server.start().expect("Server::start");
        let port = server.listen_port();
        let handle = server.handle();

        let join = thread::spawn(move || {
            server.run().expect("Server::run");
        });

        TestServer {
            handle,
            join: Some(join),
            port,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// A handle to the base loop, usable to post work onto it mid-test
    /// (e.g. driving `EventLoop::shutdown_connection` from outside).
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn connect(&self) -> TcpStream {
        let stream =
            TcpStream::connect(("127.0.0.1", self.port)).expect("connect to test server");
        stream.set_nodelay(true).expect("set_nodelay");
        stream
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle
            .post(Box::new(|loop_: &mut EventLoop| loop_.quit()));
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Reads exactly `buf.len()` bytes, polling with short sleeps until either
/// the buffer fills or `deadline` elapses.
pub fn read_exact_within(stream: &mut TcpStream, buf: &mut [u8], deadline: Duration) -> bool {
    stream
        .set_read_timeout(Some(deadline))
        .expect("set_read_timeout");
    stream.read_exact(buf).is_ok()
}

/// Reads until EOF (`read` returns `0`) or `deadline` elapses, returning
/// every byte seen so far either way.
pub fn read_to_eof_within(stream: &mut TcpStream, deadline: Duration) -> Vec<u8> {
    stream
        .set_read_timeout(Some(Duration::from_millis(100)))
        .expect("set_read_timeout");
    let start = std::time::Instant::now();
    let mut out = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&chunk[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(_) => break,
        }
        if start.elapsed() > deadline {
            break;
        }
    }
    out
}

/// `true` if the peer's write half closed (`read` returned `0`) before
/// `deadline` elapses.
pub fn wait_for_eof_within(stream: &mut TcpStream, deadline: Duration) -> bool {
    stream
        .set_read_timeout(Some(Duration::from_millis(100)))
        .expect("set_read_timeout");
    let start = std::time::Instant::now();
    let mut chunk = [0u8; 64];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return true,
            Ok(_) => {}
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(_) => return false,
        }
        if start.elapsed() > deadline {
            return false;
        }
    }
}

pub fn write_all(stream: &mut TcpStream, data: &[u8]) {
    stream.write_all(data).expect("write_all");
}

use std::io;
use std::os::fd::RawFd;

use crate::channel::Channel;
use crate::sockopt;
use crate::sys::unix::syscall;
use crate::token::ACCEPTOR_TOKEN;

/// The listening socket, set up and torn down exactly like `Acceptor`'s
/// constructor: `AF_INET`/`SOCK_STREAM`, `SO_REUSEADDR`, bound to
/// `INADDR_ANY:listen_port`, non-blocking, `TCP_NODELAY`, and explicit
/// send/receive buffer sizes.
pub struct Acceptor {
    channel: Channel,
    listening: bool,
    listen_port: u16,
    keep_alive: i32,
    backlog: i32,
    with_linger: bool,
}

impl Acceptor {
    pub fn new(
        listen_port: u16,
        snd_buf: i32,
        rcv_buf: i32,
        keep_alive: i32,
        backlog: i32,
        with_linger: bool,
    ) -> io::Result<Acceptor> {
        let fd = syscall!(socket(libc::AF_INET, libc::SOCK_STREAM, libc::IPPROTO_TCP))?;
        if let Err(e) = Self::configure_listener(fd, listen_port, snd_buf, rcv_buf) {
            unsafe { libc::close(fd) };
            return Err(e);
        }

        // `enable_reading` happens in `start_listening`, once the caller is
        // ready for connections, mirroring `Acceptor::listen`.
        let channel = Channel::new(fd, ACCEPTOR_TOKEN, false);

        Ok(Acceptor {
            channel,
            listening: false,
            listen_port,
            keep_alive,
            backlog,
            with_linger,
        })
    }

    fn configure_listener(fd: RawFd, listen_port: u16, snd_buf: i32, rcv_buf: i32) -> io::Result<()> {
        sockopt::set_reuseaddr(fd)?;

        let addr = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: listen_port.to_be(),
            sin_addr: libc::in_addr {
                s_addr: libc::INADDR_ANY,
            },
            sin_zero: [0; 8],
        };
        syscall!(bind(
            fd,
            (&addr as *const libc::sockaddr_in).cast(),
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        ))?;

        sockopt::set_nonblocking(fd)?;
        sockopt::set_tcp_nodelay(fd)?;
        sockopt::set_sndbuf(fd, snd_buf)?;
        sockopt::set_rcvbuf(fd, rcv_buf)?;
        Ok(())
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    pub fn fd(&self) -> RawFd {
        self.channel.fd()
    }

    pub fn listening(&self) -> bool {
        self.listening
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    /// The port actually bound, read back from the kernel — useful when
    /// `listen_port` was `0` ("any free port").
    pub fn local_port(&self) -> io::Result<u16> {
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        syscall!(getsockname(
            self.fd(),
            (&mut addr as *mut libc::sockaddr_in).cast(),
            &mut len,
        ))?;
        Ok(u16::from_be(addr.sin_port))
    }

    /// Starts accepting connections. Idempotent — a second call is a no-op,
    /// matching `TcpServer::start`'s `if (!m_acceptor->listening())` guard.
    pub fn start_listening(&mut self) -> io::Result<()> {
        if self.listening {
            return Ok(());
        }
        self.channel.enable_reading();
        let backlog = self.backlog.min(libc::SOMAXCONN);
        syscall!(listen(self.fd(), backlog))?;
        self.listening = true;
        Ok(())
    }

    /// Drains every pending connection with `accept`, handing each to
    /// `sink` as `(fd, peer_ip, peer_port)`. A single `EWOULDBLOCK` ends the
    /// loop; any other `accept` error is logged and skipped, matching
    /// `Acceptor::handleRead`'s `continue`-on-error behavior.
    pub fn accept_ready(&self, mut sink: impl FnMut(RawFd, String, u16)) {
        loop {
            let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
            let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            let fd = unsafe {
                libc::accept(
                    self.fd(),
                    (&mut addr as *mut libc::sockaddr_in).cast(),
                    &mut len,
                )
            };
            if fd == -1 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    break;
                }
                log::warn!("accept failed: {}", err);
                continue;
            }

            if let Err(e) = self.configure_client(fd) {
                log::warn!("failed to configure accepted socket: {}", e);
            }

            let ip = render_ipv4(addr.sin_addr);
            let port = u16::from_be(addr.sin_port);
            sink(fd, ip, port);
        }
    }

    fn configure_client(&self, fd: RawFd) -> io::Result<()> {
        sockopt::set_nonblocking(fd)?;
        sockopt::set_tcp_nodelay(fd)?;
        sockopt::set_keepalive(fd, self.keep_alive)?;
        if self.with_linger {
            sockopt::set_linger_reset(fd)?;
        }
        Ok(())
    }
}

fn render_ipv4(addr: libc::in_addr) -> String {
    let octets = addr.s_addr.to_ne_bytes();
    format!(
        "{}.{}.{}.{}",
        octets[0], octets[1], octets[2], octets[3]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    #[test]
    fn listen_then_accept_ready_yields_connecting_client() {
        let mut acceptor = Acceptor::new(0, 64 * 1024, 64 * 1024, 1, 16, false)
            .expect("failed to create acceptor");
        // port 0 means "any free port"; read back the one the kernel chose.
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        unsafe {
            libc::getsockname(
                acceptor.fd(),
                (&mut addr as *mut libc::sockaddr_in).cast(),
                &mut len,
            )
        };
        let port = u16::from_be(addr.sin_port);

        acceptor.start_listening().expect("listen");
        assert!(acceptor.listening());

        let _client = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        std::thread::sleep(std::time::Duration::from_millis(50));

        let mut accepted = Vec::new();
        acceptor.accept_ready(|fd, ip, _port| {
            accepted.push((fd, ip));
        });
        assert_eq!(accepted.len(), 1);
        unsafe { libc::close(accepted[0].0) };
    }
}

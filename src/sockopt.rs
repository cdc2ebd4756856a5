//! Socket option helpers shared by the acceptor's listening socket and every
//! accepted client socket.
//!
//! Grounded directly on the setup sequence in `Acceptor`'s constructor and
//! `handleRead`: non-blocking mode, `TCP_NODELAY`, buffer sizing, and an
//! opt-in `SO_LINGER{on=1, linger=0}` for callers that want a hard RST close
//! instead of the kernel's graceful four-way teardown.

use std::io;
use std::os::fd::RawFd;

use crate::sys::unix::syscall;

pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = syscall!(fcntl(fd, libc::F_GETFL, 0))?;
    syscall!(fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK)).map(|_| ())
}

pub fn set_reuseaddr(fd: RawFd) -> io::Result<()> {
    setsockopt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, 1)
}

pub fn set_tcp_nodelay(fd: RawFd) -> io::Result<()> {
    setsockopt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, 1)
}

pub fn set_sndbuf(fd: RawFd, bytes: i32) -> io::Result<()> {
    setsockopt(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, bytes)
}

pub fn set_rcvbuf(fd: RawFd, bytes: i32) -> io::Result<()> {
    setsockopt(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, bytes)
}

pub fn set_keepalive(fd: RawFd, keep_alive: i32) -> io::Result<()> {
    setsockopt(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, keep_alive)
}

/// `SO_LINGER{on=1, linger=0}`: closing the socket sends an immediate RST
/// instead of a graceful shutdown. Used for connections the embedder closes
/// forcefully (a misbehaving or abusive peer), never by default.
pub fn set_linger_reset(fd: RawFd) -> io::Result<()> {
    let opt = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            (&opt as *const libc::linger).cast(),
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Reads back a pending `SO_ERROR` on `fd`, the way `handle_error`'s
/// `check_socket_error` does before deciding how to close a connection.
pub fn take_socket_error(fd: RawFd) -> Option<i32> {
    let mut code: i32 = 0;
    let mut len = std::mem::size_of::<i32>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            (&mut code as *mut i32).cast(),
            &mut len,
        )
    };
    if ret == 0 && code != 0 {
        Some(code)
    } else {
        None
    }
}

fn setsockopt(fd: RawFd, level: i32, name: i32, value: i32) -> io::Result<()> {
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            (&value as *const i32).cast(),
            std::mem::size_of::<i32>() as libc::socklen_t,
        )
    };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

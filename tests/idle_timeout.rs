mod util;

use std::time::Duration;

use reactor_kernel::{Handlers, ServerConfig};
use util::TestServer;

/// Scenario 2: a connection idle past its configured timeout is
/// half-closed by the server (write side shut down), even though nothing
/// was ever sent to it.
#[test]
fn idle_connection_is_half_closed_after_its_timeout() {
    util::init();

    let handlers = Handlers {
        on_state_change: Box::new(|_loop, _id, _state| {}),
        on_data: Box::new(|_loop, _id, _data, _recv_time_ms| {}),
        on_write_complete: Box::new(|_loop, _id| {}),
    };

    let config = ServerConfig::new(0).with_pool_size(1).with_idle_timeout_secs(1);
    let server = TestServer::start(config, handlers);
    let mut client = server.connect();

    assert!(
        util::wait_for_eof_within(&mut client, Duration::from_secs(5)),
        "server never half-closed an idle connection"
    );
}

/// A connection that keeps sending data before its timeout elapses is
/// never half-closed.
#[test]
fn active_connection_survives_past_its_timeout_window() {
    util::init();

    let handlers = Handlers {
        on_state_change: Box::new(|_loop, _id, _state| {}),
        on_data: Box::new(|loop_, id, data, _recv_time_ms| {
            loop_.write_to_connection(id, data);
        }),
        on_write_complete: Box::new(|_loop, _id| {}),
    };

    let config = ServerConfig::new(0).with_pool_size(1).with_idle_timeout_secs(1);
    let server = TestServer::start(config, handlers);
    let mut client = server.connect();

    for _ in 0..4 {
        std::thread::sleep(Duration::from_millis(400));
        util::write_all(&mut client, b"ping");
        let mut echoed = [0u8; 4];
        assert!(util::read_exact_within(
            &mut client,
            &mut echoed,
            Duration::from_secs(2)
        ));
        assert_eq!(&echoed, b"ping");
    }
}

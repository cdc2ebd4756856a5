mod util;

use std::time::Duration;

use reactor_kernel::{Handlers, ServerConfig};
use util::TestServer;

/// Scenario 1: a connection that echoes every chunk it receives round-trips
/// 10 KiB of data intact.
#[test]
fn echoes_ten_kib_back_to_the_client() {
    util::init();

    let handlers = Handlers {
        on_state_change: Box::new(|_loop, _id, _state| {}),
        on_data: Box::new(|loop_, id, data, _recv_time_ms| {
            loop_.write_to_connection(id, data);
        }),
        on_write_complete: Box::new(|_loop, _id| {}),
    };

    let server = TestServer::start(ServerConfig::new(0).with_pool_size(1), handlers);
    let mut client = server.connect();

    let payload: Vec<u8> = (0..10 * 1024).map(|i| (i % 256) as u8).collect();
    util::write_all(&mut client, &payload);

    let mut echoed = vec![0u8; payload.len()];
    assert!(
        util::read_exact_within(&mut client, &mut echoed, Duration::from_secs(5)),
        "echo did not arrive within the deadline"
    );
    assert_eq!(echoed, payload);
}

/// The same connection echoes several separate writes, not just one.
#[test]
fn echoes_multiple_writes_in_order() {
    util::init();

    let handlers = Handlers {
        on_state_change: Box::new(|_loop, _id, _state| {}),
        on_data: Box::new(|loop_, id, data, _recv_time_ms| {
            loop_.write_to_connection(id, data);
        }),
        on_write_complete: Box::new(|_loop, _id| {}),
    };

    let server = TestServer::start(ServerConfig::new(0).with_pool_size(1), handlers);
    let mut client = server.connect();

    for chunk in [&b"first "[..], &b"second "[..], &b"third"[..]] {
        util::write_all(&mut client, chunk);
        let mut echoed = vec![0u8; chunk.len()];
        assert!(util::read_exact_within(
            &mut client,
            &mut echoed,
            Duration::from_secs(5)
        ));
        assert_eq!(echoed, chunk);
    }
}

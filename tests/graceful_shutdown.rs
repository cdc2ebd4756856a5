mod util;

use std::sync::mpsc;
use std::time::Duration;

use reactor_kernel::{ConnId, ConnState, Handlers, ServerConfig};
use util::TestServer;

/// Scenario 4: requesting a graceful shutdown on a connection half-closes
/// it from the server side, and the connection fully tears down (reaching
/// `Disconnected`) once the peer finishes closing too.
#[test]
fn shutdown_connection_half_closes_then_fully_tears_down() {
    util::init();

    let (state_tx, state_rx) = mpsc::channel::<(ConnId, ConnState)>();

    let handlers = Handlers {
        on_state_change: Box::new(move |_loop, id, state| {
            let _ = state_tx.send((id, state));
        }),
        on_data: Box::new(|_loop, _id, _data, _recv_time_ms| {}),
        on_write_complete: Box::new(|_loop, _id| {}),
    };

    let server = TestServer::start(ServerConfig::new(0).with_pool_size(1), handlers);
    let mut client = server.connect();

    let (id, state) = state_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("no Connected notification");
    assert_eq!(state, ConnState::Connected);

    server
        .handle()
        .post(Box::new(move |loop_| loop_.shutdown_connection(id)));

    assert!(
        util::wait_for_eof_within(&mut client, Duration::from_secs(5)),
        "server never half-closed the connection"
    );

    // The peer finishes the close; the server should observe it and tear
    // the connection down fully.
    drop(client);

    let (closed_id, state) = state_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("no Disconnected notification");
    assert_eq!(closed_id, id);
    assert_eq!(state, ConnState::Disconnected);
}

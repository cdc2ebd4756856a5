mod util;

use std::io::Read;
use std::time::Duration;

use reactor_kernel::{Handlers, ServerConfig};
use util::TestServer;

/// Scenario 3: a slow reader on the client side exerts write back-pressure
/// on the server (`outgoing` buffers rather than drops), and every byte
/// still arrives intact once the client catches up.
#[test]
fn slow_reader_receives_every_byte_with_no_loss() {
    util::init();

    const TOTAL: usize = 512 * 1024;

    let handlers = Handlers {
        on_state_change: Box::new(|_loop, _id, _state| {}),
        on_data: Box::new(|loop_, id, _data, _recv_time_ms| {
            let payload: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();
            loop_.write_to_connection(id, &payload);
        }),
        on_write_complete: Box::new(|_loop, _id| {}),
    };

    let server = TestServer::start(ServerConfig::new(0).with_pool_size(1), handlers);
    let mut client = server.connect();

    util::write_all(&mut client, b"go");

    client
        .set_read_timeout(Some(Duration::from_millis(200)))
        .expect("set_read_timeout");

    let mut received = Vec::with_capacity(TOTAL);
    let mut chunk = [0u8; 256];
    let deadline = std::time::Instant::now() + Duration::from_secs(15);
    while received.len() < TOTAL && std::time::Instant::now() < deadline {
        // Deliberately tiny reads with a pause between them, to force the
        // server to see repeated partial-send/`WouldBlock` conditions.
        match client.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&chunk[..n]),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => panic!("unexpected read error: {}", e),
        }
        std::thread::sleep(Duration::from_millis(2));
    }

    assert_eq!(received.len(), TOTAL, "lost bytes under back-pressure");
    let expected: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();
    assert_eq!(received, expected);
}

mod util;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reactor_kernel::EventLoop;

/// Scenario 6: 1,000 one-shot timers scheduled in quick succession all
/// fire, in the exact order they were scheduled, within the time the
/// timer wheel's 1,000ms minimum arming floor allows for.
#[test]
fn a_thousand_one_shot_timers_fire_in_scheduled_order() {
    util::init();

    const COUNT: i64 = 1000;

    let mut loop_ = EventLoop::new().expect("EventLoop::new");
    let handle = loop_.handle();

    let fired = Arc::new(Mutex::new(Vec::with_capacity(COUNT as usize)));

    // Stagger expirations across half a second so they don't all share one
    // `expiration` key, exercising the `(expiration, seq)` ordering rather
    // than only the insertion-order tiebreak.
    for i in 0..COUNT {
        let fired = Arc::clone(&fired);
        let delay_ms = i / 2;
        loop_.run_after(delay_ms, move |_loop_: &mut EventLoop| {
            fired.lock().unwrap().push(i);
        });
    }

    let fired_for_quit = Arc::clone(&fired);
    let quit_handle = handle.clone();
    std::thread::spawn(move || loop {
        std::thread::sleep(Duration::from_millis(50));
        if fired_for_quit.lock().unwrap().len() as i64 == COUNT {
            quit_handle.post(Box::new(|loop_: &mut EventLoop| loop_.quit()));
            break;
        }
    });

    let start = Instant::now();
    loop_.run_forever().expect("run_forever");
    let elapsed = start.elapsed();

    let fired = fired.lock().unwrap();
    assert_eq!(fired.len(), COUNT as usize, "not every timer fired");
    assert!(
        fired.windows(2).all(|w| w[0] <= w[1]),
        "timers fired out of scheduled order"
    );

    // The floor forces at least one ~1000ms wait; allow generous slack for
    // the watchdog thread's polling interval and scheduling jitter.
    assert!(
        elapsed < Duration::from_secs(5),
        "took {:?}, expected well under the watchdog's bound",
        elapsed
    );

    let _ = handle;
}

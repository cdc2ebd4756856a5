mod util;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reactor_kernel::EventLoop;

/// Scenario 5: posting a task from a foreign thread wakes a loop that is
/// otherwise idle, well under the periodic list's 1000ms idle-poll
/// interval — proving the waker actually interrupts `epoll_wait` rather
/// than the task only running on the next unrelated wakeup.
#[test]
fn queue_wakes_an_idle_loop_promptly() {
    util::init();

    let mut loop_ = EventLoop::new().expect("EventLoop::new");
    let handle = loop_.handle();

    let ran = Arc::new(AtomicBool::new(false));
    let ran_for_thread = Arc::clone(&ran);

    let join = std::thread::spawn(move || loop_.run_forever());

    let start = Instant::now();
    std::thread::sleep(Duration::from_millis(50));
    handle.post(Box::new(move |loop_: &mut EventLoop| {
        ran_for_thread.store(true, Ordering::SeqCst);
        loop_.quit();
    }));

    join.join().expect("loop thread panicked").expect("run_forever");
    let elapsed = start.elapsed();

    assert!(ran.load(Ordering::SeqCst), "posted task never ran");
    assert!(
        elapsed < Duration::from_millis(500),
        "posting took {:?}, the waker should interrupt epoll_wait almost immediately",
        elapsed
    );
}

/// Several posts queued back to back before the loop next drains all run,
/// in the order they were posted.
#[test]
fn multiple_posts_all_run_in_order() {
    util::init();

    let mut loop_ = EventLoop::new().expect("EventLoop::new");
    let handle = loop_.handle();

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let join = std::thread::spawn(move || loop_.run_forever());

    for i in 0..5 {
        let order = Arc::clone(&order);
        handle.post(Box::new(move |_loop_: &mut EventLoop| {
            order.lock().unwrap().push(i);
        }));
    }
    handle.post(Box::new(|loop_: &mut EventLoop| loop_.quit()));

    join.join().expect("loop thread panicked").expect("run_forever");
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

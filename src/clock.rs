use std::sync::OnceLock;
use std::time::Instant;

/// Returns the current monotonic time in milliseconds, relative to an
/// arbitrary, process-wide epoch fixed the first time this is called.
///
/// This is the kernel's sole clock dependency (§6, "Clock interface"): every
/// timestamp the reactor hands to a callback — timer expirations, the
/// demultiplexer's receive time, idle-timeout bookkeeping — is read through
/// this function so a single implementation change (e.g. injecting a fake
/// clock for tests) reaches the whole crate.
pub fn current_time_in_millis() -> i64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as i64
}

use std::thread;
use std::time::{Duration, Instant};

/// Sleep for `ms` milliseconds. Zero returns at once.
pub fn sleep_ms(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}

/// Sleep until `deadline`, returning immediately if it already passed.
pub fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
}

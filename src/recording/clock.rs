use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

/// Time source for pacing, backoff and file naming.
pub trait Clock: Send + Sync {
    /// Monotonic time used for pacing.
    fn now(&self) -> Instant;
    /// Wall-clock time used for overlays and segment names.
    fn wall_time(&self) -> DateTime<Local>;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

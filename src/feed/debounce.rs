use std::time::Duration;
use tokio::time::Instant;

/// Last-write-wins timer polled from a periodic tick.
///
/// Every `restart` pushes the deadline out again; `fire` reports true once
/// the deadline has passed and then disarms.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay: Duration,
    armed_at: Option<Instant>,
}

impl Debounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            armed_at: None,
        }
    }

    /// (Re)arm the timer from now.
    pub fn restart(&mut self) {
        self.armed_at = Some(Instant::now());
    }

    pub fn cancel(&mut self) {
        self.armed_at = None;
    }

    /// True once the quiet period has elapsed. Disarms the timer.
    pub fn fire(&mut self) -> bool {
        match self.armed_at {
            Some(at) if at.elapsed() >= self.delay => {
                self.armed_at = None;
                true
            }
            _ => false,
        }
    }
}

use chrono::{Duration, Utc};
use std::sync::{Arc, RwLock};
use vigil_core::Timestamp;
use vigil_ports::Clock;

/// Manually driven clock
///
/// Time is frozen at the starting instant and only moves through
/// [`advance`](ManualClock::advance) or [`set_time`](ManualClock::set_time).
pub struct ManualClock {
    current_time: RwLock<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at the current wall time
    pub fn new() -> Arc<Self> {
        Self::starting_at(Utc::now())
    }

    /// Create a clock frozen at `start`
    pub fn starting_at(start: Timestamp) -> Arc<Self> {
        Arc::new(Self {
            current_time: RwLock::new(start),
        })
    }

    /// Move time forward
    pub fn advance(&self, duration: Duration) {
        let mut current = self
            .current_time
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current += duration;
    }

    /// Explicitly set the time
    pub fn set_time(&self, time: Timestamp) {
        let mut current = self
            .current_time
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self
            .current_time
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}

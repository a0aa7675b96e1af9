use std::time::{Duration, Instant};

use crate::category::CategoryId;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A due refresh for the category that was running when the timer was armed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefreshTick {
    pub category: CategoryId,
    pub generation: u64,
}

/// Periodic refresh bound to one running category.
///
/// A timer is never re-pointed at another category: the owner drops it and
/// arms a new one with the next generation, so ticks from an old timer can
/// be recognized and ignored.
#[derive(Clone, Debug)]
pub struct RefreshTimer {
    category: CategoryId,
    generation: u64,
    interval: Duration,
    next_due: Instant,
}

impl RefreshTimer {
    pub fn arm(category: CategoryId, generation: u64, interval: Duration, now: Instant) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        Self {
            category,
            generation,
            interval,
            next_due: now + interval,
        }
    }

    pub fn category(&self) -> CategoryId {
        self.category
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns a tick when the timer is due. Missed periods collapse into a
    /// single tick.
    pub fn poll(&mut self, now: Instant) -> Option<RefreshTick> {
        if now < self.next_due {
            return None;
        }

        while self.next_due <= now {
            self.next_due += self.interval;
        }
        Some(RefreshTick {
            category: self.category,
            generation: self.generation,
        })
    }
}

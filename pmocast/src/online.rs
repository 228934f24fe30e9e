use std::time::{Duration, Instant};

/// Default lifetime of a discovery announcement when the backend has no
/// better figure.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(120);

#[derive(Clone, Debug)]
pub struct DevicePresence {
    last_seen: Instant,
    max_age: Duration,
}

impl DevicePresence {
    pub fn seen_at(now: Instant, max_age: Duration) -> Self {
        Self {
            last_seen: now,
            max_age,
        }
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn has_been_seen(&mut self, now: Instant, max_age: Duration) {
        self.last_seen = now;
        self.max_age = max_age;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > self.max_age
    }
}

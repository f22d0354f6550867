use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the oldest logged request leaves the window and frees a slot.
    pub reset_after: Duration,
}

impl Admission {
    /// `reset_after` in whole seconds, rounded up and never zero.
    pub fn reset_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs() + u64::from(self.reset_after.subsec_nanos() > 0);
        secs.max(1)
    }
}

/// Sliding-window request log keyed by caller identity.
///
/// Check-and-record for one key runs under that key's shard lock, so
/// concurrent requests from the same caller cannot both take the last slot.
#[derive(Debug, Clone)]
pub struct ContactRateLimiter {
    window: Duration,
    max_requests: u32,
    trust_forwarded_for: bool,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
}

impl ContactRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            trust_forwarded_for: false,
            buckets: Arc::new(DashMap::new()),
        }
    }

    pub fn trusting_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn trusts_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }

    pub fn allow(&self, key: &str) -> Admission {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> Admission {
        let window = self.window;

        let mut entry = self.buckets.entry(key.to_string()).or_default();
        entry.retain(|instant| now.duration_since(*instant) < window);

        let remaining = self.max_requests.saturating_sub(entry.len() as u32);
        let allowed = remaining > 0;
        if allowed {
            entry.push(now);
        }

        let reset_after = entry
            .first()
            .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or(window);

        Admission {
            allowed,
            remaining: remaining.saturating_sub(1),
            reset_after,
        }
    }

    /// Drop callers whose log has fully aged out of the window.
    pub fn prune(&self) {
        let now = Instant::now();
        let window = self.window;
        self.buckets.retain(|_, log| {
            log.retain(|instant| now.duration_since(*instant) < window);
            !log.is_empty()
        });
    }

    pub fn tracked_callers(&self) -> usize {
        self.buckets.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }
}

//! Per-site token bucket gating intake by `TRANSLATE_MAX_PAGES_PER_MINUTE`.
//!
//! Reduced from the teacher's full distributed/multi-algorithm rate limiter
//! suite to the single local policy this system needs: one bucket per site,
//! refilled continuously, consulted once per intake call before any
//! segmentation work begins.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<Uuid, Bucket>>,
}

pub enum Decision {
    Allowed,
    Denied { retry_after: Duration },
}

impl RateLimiter {
    /// `max_per_minute` becomes both the bucket capacity and the refill rate,
    /// so a site that has been idle can burst up to a full minute's quota.
    pub fn new(max_per_minute: u32) -> Self {
        let capacity = max_per_minute.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, site_id: Uuid) -> Decision {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();
        let bucket = buckets.entry(site_id).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision::Allowed
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait_secs = deficit / self.refill_per_sec;
            Decision::Denied { retry_after: Duration::from_secs_f64(wait_secs) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_capacity_then_denies() {
        let limiter = RateLimiter::new(2);
        let site = Uuid::new_v4();
        assert!(matches!(limiter.check(site), Decision::Allowed));
        assert!(matches!(limiter.check(site), Decision::Allowed));
        assert!(matches!(limiter.check(site), Decision::Denied { .. }));
    }

    #[test]
    fn buckets_are_independent_per_site() {
        let limiter = RateLimiter::new(1);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(matches!(limiter.check(a), Decision::Allowed));
        assert!(matches!(limiter.check(b), Decision::Allowed));
    }

    #[test]
    fn denied_reports_nonzero_retry_after() {
        let limiter = RateLimiter::new(1);
        let site = Uuid::new_v4();
        let _ = limiter.check(site);
        match limiter.check(site) {
            Decision::Denied { retry_after } => assert!(retry_after.as_secs_f64() > 0.0),
            Decision::Allowed => panic!("expected denial"),
        }
    }
}

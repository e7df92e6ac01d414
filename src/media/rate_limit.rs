//! Sliding-window request limiter

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Allows at most `max_requests` recorded requests within any rolling `window`
///
/// Checking and recording are separate so that only successful upstream calls
/// consume quota.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_requests: usize,
    window: chrono::Duration,
    timestamps: Mutex<VecDeque<DateTime<Utc>>>,
}

impl SlidingWindowLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Returns `Err(reset_at)` if the window is full
    ///
    /// `reset_at` is when the oldest recorded request leaves the window.
    pub fn check(&self) -> Result<(), DateTime<Utc>> {
        let now = Utc::now();
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, now);

        if timestamps.len() < self.max_requests {
            return Ok(());
        }

        let oldest = timestamps.front().copied().unwrap_or(now);
        Err(oldest
            .checked_add_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Records a request made now
    pub fn record(&self) {
        let now = Utc::now();
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, now);
        timestamps.push_back(now);
    }

    /// Requests still available in the current window
    pub fn remaining(&self) -> usize {
        let now = Utc::now();
        let mut timestamps = self.timestamps.lock();
        self.prune(&mut timestamps, now);
        self.max_requests.saturating_sub(timestamps.len())
    }

    fn prune(&self, timestamps: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        while let Some(oldest) = timestamps.front() {
            if now.signed_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_allows_up_to_max_requests() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(3600));
        for _ in 0..3 {
            assert!(limiter.check().is_ok());
            limiter.record();
        }
        assert!(limiter.check().is_err());
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn test_check_does_not_consume_quota() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(3600));
        for _ in 0..5 {
            assert!(limiter.check().is_ok());
        }
        assert_eq!(limiter.remaining(), 1);
    }

    #[test]
    fn test_reset_time_is_oldest_plus_window() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(3600));
        let before = Utc::now();
        limiter.record();
        let after = Utc::now();

        let reset_at = limiter.check().unwrap_err();
        assert!(reset_at >= before + chrono::Duration::hours(1));
        assert!(reset_at <= after + chrono::Duration::hours(1));
    }

    #[test]
    fn test_capacity_frees_one_at_a_time() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_millis(200));
        limiter.record();
        thread::sleep(Duration::from_millis(100));
        limiter.record();
        assert!(limiter.check().is_err());

        // First timestamp has aged out, second is still inside the window
        thread::sleep(Duration::from_millis(130));
        assert_eq!(limiter.remaining(), 1);
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn test_zero_capacity_is_always_limited() {
        let limiter = SlidingWindowLimiter::new(0, Duration::from_secs(60));
        assert!(limiter.check().is_err());
    }
}

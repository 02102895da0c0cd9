//! Per-client sliding window rate limiter
//!
//! Two independent windows, 60 s and 3600 s, over an in-process map of
//! admission instants keyed by client IP. Entries older than the hour
//! window are dropped lazily on access; per-IP serialization comes from
//! the map's entry lock.

use dashmap::DashMap;
use radiocall_core::error::RateWindow;
use radiocall_core::{Error, Result};
use std::time::{Duration, Instant};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Sliding window upload limiter
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    admissions: DashMap<String, Vec<Instant>>,
    per_minute: usize,
    per_hour: usize,
}

impl SlidingWindowLimiter {
    /// Create a limiter with the configured thresholds
    #[must_use]
    pub fn new(per_minute: u32, per_hour: u32) -> Self {
        Self {
            admissions: DashMap::new(),
            per_minute: per_minute as usize,
            per_hour: per_hour as usize,
        }
    }

    /// Admit or reject one request from `client_ip`, recording it on admit
    ///
    /// # Errors
    ///
    /// Returns `RateLimited` naming the window that rejected.
    pub fn check(&self, client_ip: &str) -> Result<()> {
        self.check_at(client_ip, Instant::now())
    }

    fn check_at(&self, client_ip: &str, now: Instant) -> Result<()> {
        let mut entry = self.admissions.entry(client_ip.to_string()).or_default();

        // Hour window bounds retained history
        entry.retain(|t| now.saturating_duration_since(*t) < HOUR);

        if entry.len() >= self.per_hour {
            return Err(Error::RateLimited {
                window: RateWindow::Hour,
                current: entry.len(),
                limit: self.per_hour,
            });
        }

        let recent = entry
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < MINUTE)
            .count();
        if recent >= self.per_minute {
            return Err(Error::RateLimited {
                window: RateWindow::Minute,
                current: recent,
                limit: self.per_minute,
            });
        }

        entry.push(now);
        Ok(())
    }

    /// Number of IPs currently tracked
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.admissions.len()
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_admits_up_to_minute_limit() {
        let limiter = SlidingWindowLimiter::new(3, 100);
        let now = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("10.0.0.1", now).is_ok());
        }

        let err = limiter.check_at("10.0.0.1", now).unwrap_err();
        match err {
            Error::RateLimited {
                window,
                current,
                limit,
            } => {
                assert_eq!(window, RateWindow::Minute);
                assert_eq!(current, 3);
                assert_eq!(limit, 3);
            }
            other => panic!("expected RateLimited, got {other}"),
        }
    }

    #[test]
    fn test_other_ips_have_their_own_window() {
        let limiter = SlidingWindowLimiter::new(1, 100);
        let now = Instant::now();

        assert!(limiter.check_at("10.0.0.1", now).is_ok());
        assert!(limiter.check_at("10.0.0.1", now).is_err());
        // A different client is admitted subject to its own window
        assert!(limiter.check_at("10.0.0.2", now).is_ok());
    }

    #[test]
    fn test_minute_window_slides() {
        let limiter = SlidingWindowLimiter::new(2, 100);
        let start = Instant::now();

        assert!(limiter.check_at("10.0.0.1", start).is_ok());
        assert!(limiter.check_at("10.0.0.1", start).is_ok());
        assert!(limiter.check_at("10.0.0.1", start).is_err());

        // 61 seconds later the minute window has passed
        let later = start + Duration::from_secs(61);
        assert!(limiter.check_at("10.0.0.1", later).is_ok());
    }

    #[test]
    fn test_hour_limit_rejects_before_minute_check() {
        let limiter = SlidingWindowLimiter::new(10, 3);
        let start = Instant::now();

        // Spread admissions so the minute window never trips
        for i in 0..3u64 {
            let at = start + Duration::from_secs(i * 120);
            assert!(limiter.check_at("10.0.0.1", at).is_ok());
        }

        let at = start + Duration::from_secs(3 * 120);
        let err = limiter.check_at("10.0.0.1", at).unwrap_err();
        match err {
            Error::RateLimited { window, .. } => assert_eq!(window, RateWindow::Hour),
            other => panic!("expected RateLimited, got {other}"),
        }
    }

    #[test]
    fn test_hour_window_evicts_old_entries() {
        let limiter = SlidingWindowLimiter::new(10, 2);
        let start = Instant::now();

        assert!(limiter.check_at("10.0.0.1", start).is_ok());
        assert!(limiter.check_at("10.0.0.1", start).is_ok());
        assert!(limiter.check_at("10.0.0.1", start).is_err());

        // An hour later history has aged out
        let later = start + Duration::from_secs(3601);
        assert!(limiter.check_at("10.0.0.1", later).is_ok());
    }

    #[test]
    fn test_error_message_names_the_window() {
        let limiter = SlidingWindowLimiter::new(1, 100);
        let now = Instant::now();

        limiter.check_at("10.0.0.1", now).unwrap();
        let err = limiter.check_at("10.0.0.1", now).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Rate limit exceeded: maximum 1 uploads per minute"
        );
    }

    #[test]
    fn test_tracked_clients() {
        let limiter = SlidingWindowLimiter::new(10, 100);
        assert_eq!(limiter.tracked_clients(), 0);

        let now = Instant::now();
        limiter.check_at("10.0.0.1", now).unwrap();
        limiter.check_at("10.0.0.2", now).unwrap();
        assert_eq!(limiter.tracked_clients(), 2);
    }
}

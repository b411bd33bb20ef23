// Per-identity request throttling
//
// Sliding-window log: each identity keeps the instants of its accepted
// requests inside the current window.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of a rate-limit check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub blocked: bool,
    pub remaining: usize,
    /// When the oldest counted request leaves the window
    pub reset_time: DateTime<Utc>,
    /// Seconds until a blocked caller may retry (0 when allowed)
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record a request for `identity`
    pub fn check(&self, identity: &str) -> RateLimitDecision {
        self.check_at(identity, Instant::now())
    }

    /// Same as `check` with an explicit clock reading
    pub fn check_at(&self, identity: &str, now: Instant) -> RateLimitDecision {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let hits = windows.entry(identity.to_string()).or_default();

        while let Some(&oldest) = hits.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                hits.pop_front();
            } else {
                break;
            }
        }

        let blocked = hits.len() >= self.max_requests;
        if !blocked {
            hits.push_back(now);
        }

        let until_reset = hits
            .front()
            .map(|&oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(self.window);
        let reset_time = Utc::now()
            + chrono::Duration::from_std(until_reset).unwrap_or_else(|_| chrono::Duration::zero());

        let decision = RateLimitDecision {
            blocked,
            remaining: self.max_requests.saturating_sub(hits.len()),
            reset_time,
            retry_after_secs: if blocked {
                until_reset.as_secs_f64().ceil() as u64
            } else {
                0
            },
        };

        if blocked {
            tracing::warn!(
                "Rate limit exceeded for identity {} (retry after {}s)",
                identity,
                decision.retry_after_secs
            );
        }

        decision
    }

    /// Drop identities with no requests inside the window ending at `now`
    pub fn cleanup(&self, now: Instant) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.retain(|_, hits| {
            hits.back()
                .map(|&last| now.saturating_duration_since(last) < self.window)
                .unwrap_or(false)
        });
    }

    pub fn tracked_identities(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_threshold() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        let first = limiter.check_at("alice", now);
        assert!(!first.blocked);
        assert_eq!(first.remaining, 2);

        assert!(!limiter.check_at("alice", now).blocked);
        let third = limiter.check_at("alice", now);
        assert!(!third.blocked);
        assert_eq!(third.remaining, 0);
    }

    #[test]
    fn test_eleventh_request_blocked_then_allowed_after_window() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..10 {
            let decision = limiter.check_at("bob", start + Duration::from_secs(i));
            assert!(!decision.blocked, "request {} should pass", i + 1);
        }

        let blocked = limiter.check_at("bob", start + Duration::from_secs(30));
        assert!(blocked.blocked);
        assert_eq!(blocked.remaining, 0);
        assert!(blocked.reset_time > Utc::now());
        assert_eq!(blocked.retry_after_secs, 30);

        let later = limiter.check_at("bob", start + Duration::from_secs(61));
        assert!(!later.blocked);
    }

    #[test]
    fn test_identities_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(!limiter.check_at("alice", now).blocked);
        assert!(limiter.check_at("alice", now).blocked);
        assert!(!limiter.check_at("carol", now).blocked);
    }

    #[test]
    fn test_blocked_requests_do_not_extend_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert!(!limiter.check_at("dave", start).blocked);
        assert!(limiter.check_at("dave", start + Duration::from_secs(9)).blocked);
        assert!(!limiter.check_at("dave", start + Duration::from_secs(10)).blocked);
    }

    #[test]
    fn test_cleanup_drops_idle_identities() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();
        limiter.check_at("eve", start);
        limiter.check_at("frank", start + Duration::from_secs(50));
        assert_eq!(limiter.tracked_identities(), 2);

        limiter.cleanup(start + Duration::from_secs(30));
        assert_eq!(limiter.tracked_identities(), 2);

        limiter.cleanup(start + Duration::from_secs(70));
        assert_eq!(limiter.tracked_identities(), 1);
    }
}

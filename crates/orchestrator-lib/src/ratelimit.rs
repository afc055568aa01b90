//! Per-client sliding-window admission control
//!
//! Each client identity keeps the timestamps of its admitted requests inside
//! the trailing window. A request is admitted while fewer than `limit`
//! timestamps remain after pruning; rejected attempts are not recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Reference policy: 5 requests per client per minute
pub const DEFAULT_RATE_LIMIT: usize = 5;
pub const DEFAULT_RATE_PERIOD: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter keyed by client identity
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT, DEFAULT_RATE_PERIOD)
    }
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or reject a request from `client_id` at the current instant
    pub fn admit(&self, client_id: &str) -> bool {
        self.admit_at(client_id, Instant::now())
    }

    /// Admit or reject a request observed at `now`
    pub fn admit_at(&self, client_id: &str, now: Instant) -> bool {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let timestamps = clients.entry(client_id.to_string()).or_default();
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.limit {
            return false;
        }

        timestamps.push_back(now);
        true
    }

    /// Drop clients whose windows have fully elapsed
    pub fn prune_idle(&self) {
        let now = Instant::now();
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        clients.retain(|_, timestamps| {
            timestamps
                .back()
                .map(|last| now.saturating_duration_since(*last) < self.window)
                .unwrap_or(false)
        });
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nth_admitted_and_next_rejected() {
        let limiter = SlidingWindowLimiter::new(5, Duration::from_secs(60));
        let start = Instant::now();

        for i in 0..5 {
            assert!(
                limiter.admit_at("10.0.0.1", start + Duration::from_secs(i)),
                "request {} should be admitted",
                i + 1
            );
        }
        assert!(!limiter.admit_at("10.0.0.1", start + Duration::from_secs(10)));
    }

    #[test]
    fn test_admission_resumes_after_window() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.admit_at("client", start));
        assert!(limiter.admit_at("client", start + Duration::from_secs(1)));
        assert!(!limiter.admit_at("client", start + Duration::from_secs(30)));

        // First timestamp has aged out, one slot frees up
        assert!(limiter.admit_at("client", start + Duration::from_secs(60)));
        assert!(!limiter.admit_at("client", start + Duration::from_secs(60)));

        // Both earlier timestamps gone
        assert!(limiter.admit_at("client", start + Duration::from_secs(125)));
    }

    #[test]
    fn test_rejection_does_not_consume_budget() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.admit_at("client", start));
        // Hammer while blocked; none of these may extend the window
        for s in 1..10 {
            assert!(!limiter.admit_at("client", start + Duration::from_secs(s)));
        }
        assert!(limiter.admit_at("client", start + Duration::from_secs(10)));
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.admit_at("a", now));
        assert!(!limiter.admit_at("a", now));
        assert!(limiter.admit_at("b", now));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_wall_clock_window() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_millis(50));

        assert!(limiter.admit("client"));
        assert!(!limiter.admit("client"));

        std::thread::sleep(Duration::from_millis(80));
        assert!(limiter.admit("client"));
    }

    #[test]
    fn test_prune_idle_clients() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_millis(20));
        assert!(limiter.admit("a"));
        assert!(limiter.admit("b"));

        std::thread::sleep(Duration::from_millis(40));
        limiter.prune_idle();
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_concurrent_admission_never_exceeds_limit() {
        use std::sync::Arc;

        let limiter = Arc::new(SlidingWindowLimiter::new(5, Duration::from_secs(60)));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || limiter.admit("shared"))
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 5);
    }
}

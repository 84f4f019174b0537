//! Fixed-window request ceiling per verified identity.
//!
//! Tracks one `(window_start, count)` bucket per identity in a `DashMap`.
//! The ceiling is enforced before any business logic runs; requests beyond
//! it fail fast instead of queuing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Shared rate limiter state (clone-friendly via `Arc`).
#[derive(Clone)]
pub struct RateLimiter {
    /// Map from identity → (window_start, request_count).
    buckets: Arc<DashMap<String, (Instant, u32)>>,
    /// Maximum requests allowed within the window.
    max_requests: u32,
    /// Time window duration.
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_requests` per `window` per identity.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            max_requests,
            window,
        }
    }

    /// Records a request for `identity` and reports whether it is within
    /// the ceiling. Returns `true` if the request is allowed.
    pub fn check(&self, identity: &str) -> bool {
        let mut entry = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| (Instant::now(), 0));
        let (window_start, count) = entry.value_mut();

        if window_start.elapsed() >= self.window {
            // Reset window
            *window_start = Instant::now();
            *count = 1;
            return true;
        }

        if *count >= self.max_requests {
            return false; // Rate limited
        }

        *count += 1;
        true
    }
}

//! Per-client fixed-window rate limiting.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitSettings;

/// Fixed-window request counter keyed by client address
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    trust_proxy: bool,
    buckets: Arc<DashMap<String, RateBucket>>,
}

#[derive(Debug, Clone)]
struct RateBucket {
    count: u32,
    window_start: Instant,
}

/// Result of a rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed { remaining: u32, limit: u32 },
    Exceeded { retry_after: Duration, limit: u32 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }

    pub fn limit(&self) -> u32 {
        match self {
            RateLimitResult::Allowed { limit, .. } | RateLimitResult::Exceeded { limit, .. } => *limit,
        }
    }

    pub fn remaining(&self) -> u32 {
        match self {
            RateLimitResult::Allowed { remaining, .. } => *remaining,
            RateLimitResult::Exceeded { .. } => 0,
        }
    }

    /// Whole seconds until the window resets, at least 1 when exceeded
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            RateLimitResult::Allowed { .. } => 0,
            RateLimitResult::Exceeded { retry_after, .. } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                secs.max(1)
            }
        }
    }
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            max_requests: settings.max_requests,
            window: settings.window,
            trust_proxy: settings.trust_proxy,
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// Count one request from `client` and report whether it may proceed.
    pub fn check(&self, client: &str) -> RateLimitResult {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> RateLimitResult {
        let mut bucket = self.buckets.entry(client.to_string()).or_insert_with(|| RateBucket {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        bucket.count = bucket.count.saturating_add(1);

        if bucket.count > self.max_requests {
            RateLimitResult::Exceeded {
                retry_after: self.window.saturating_sub(now.duration_since(bucket.window_start)),
                limit: self.max_requests,
            }
        } else {
            RateLimitResult::Allowed {
                remaining: self.max_requests - bucket.count,
                limit: self.max_requests,
            }
        }
    }

    /// Drop buckets whose window has long expired.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.window_start) < window * 2);
    }

    /// Whether the client key may come from `X-Forwarded-For`
    pub fn trusts_proxy(&self) -> bool {
        self.trust_proxy
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// Run [`RateLimiter::cleanup`] once per window until the task is aborted.
    pub fn spawn_cleanup(&self) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.window);
            loop {
                interval.tick().await;
                limiter.cleanup();
            }
        })
    }
}

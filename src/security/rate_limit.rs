//! Sliding-window rate limiting with a bounded store.
//!
//! Each identity key owns one counter with a rolling reset time. The store is
//! capped: expired entries are swept first, then the oldest-inserted entries
//! are evicted FIFO until the store is back under capacity. This keeps memory
//! bounded even when an attacker rotates through spoofed identity keys.

use dashmap::DashMap;
use ipnetwork::IpNetwork;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-call-site limit: at most `max_requests` per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub window: Duration,
    pub max_requests: u32,
}

/// Outcome of [`SlidingWindowLimiter::check_and_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Denied; the client may retry after this many whole seconds (>= 1).
    Limited { retry_after_secs: u64 },
}

#[derive(Debug, Clone)]
pub struct SlidingWindowConfig {
    /// Enable rate limiting.
    pub enabled: bool,
    /// Maximum number of tracked identity keys before eviction kicks in.
    pub max_tracked_keys: usize,
    /// Networks that bypass rate limiting entirely.
    pub whitelisted_ips: Vec<IpNetwork>,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_tracked_keys: 10_000,
            whitelisted_ips: vec![],
        }
    }
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    window_resets_at: Instant,
    /// Insertion order, used for FIFO eviction when the store overflows.
    seq: u64,
}

/// Sliding-window rate limiter keyed by client identity.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    config: Arc<SlidingWindowConfig>,
    entries: Arc<DashMap<String, WindowEntry>>,
    next_seq: Arc<AtomicU64>,
}

impl SlidingWindowLimiter {
    pub fn new(config: SlidingWindowConfig) -> Self {
        Self {
            config: Arc::new(config),
            entries: Arc::new(DashMap::new()),
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Count one request for `key` against `policy`.
    ///
    /// The first request from an unseen key (or from a key whose window has
    /// elapsed) opens a fresh window with count 1. Within a live window the
    /// (max+1)-th request is the first one denied.
    pub fn check_and_consume(&self, key: &str, policy: &RateLimitPolicy) -> RateDecision {
        if !self.config.enabled {
            return RateDecision::Allowed;
        }
        if self.is_whitelisted(key) {
            tracing::trace!(key = %key, "Request bypassing rate limit: whitelisted network");
            return RateDecision::Allowed;
        }

        let now = Instant::now();
        let mut decision = RateDecision::Allowed;
        self.entries
            .entry(key.to_string())
            .and_modify(|entry| {
                if now >= entry.window_resets_at {
                    // Window elapsed; start a new one.
                    entry.count = 1;
                    entry.window_resets_at = now + policy.window;
                } else {
                    entry.count += 1;
                    if entry.count > policy.max_requests {
                        let remaining = entry.window_resets_at.saturating_duration_since(now);
                        decision = RateDecision::Limited {
                            retry_after_secs: retry_after_secs(remaining),
                        };
                    }
                }
            })
            .or_insert_with(|| WindowEntry {
                count: 1,
                window_resets_at: now + policy.window,
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            });

        // Opportunistic eviction when a high-cardinality attacker inflates
        // the store between periodic sweeps.
        if self.entries.len() > self.config.max_tracked_keys {
            self.sweep();
        }

        decision
    }

    /// Drop expired windows, then evict oldest-inserted entries until the
    /// store is back under capacity. Called periodically and opportunistically.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.window_resets_at);

        let excess = self.entries.len().saturating_sub(self.config.max_tracked_keys);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.value().seq, entry.key().clone()))
            .collect();
        by_age.sort_unstable_by_key(|(seq, _)| *seq);

        for (_, key) in by_age.into_iter().take(excess) {
            self.entries.remove(&key);
        }
        tracing::debug!(evicted = excess, "Rate-limit store over capacity, evicted oldest keys");
    }

    /// Number of identity keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Drop all counters. Used on graceful shutdown.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn is_whitelisted(&self, key: &str) -> bool {
        if self.config.whitelisted_ips.is_empty() {
            return false;
        }
        let Ok(ip) = key.parse::<IpAddr>() else {
            return false;
        };
        self.config
            .whitelisted_ips
            .iter()
            .any(|network| network.contains(ip))
    }
}

/// Whole seconds until the window resets, always at least 1 when any of the
/// window remains.
fn retry_after_secs(remaining: Duration) -> u64 {
    (remaining.as_millis().div_ceil(1000).max(1)) as u64
}

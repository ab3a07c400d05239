//! Fixed-window rate limiting per client address.

// ============================================================================
// Imports
// ============================================================================

use std::net::IpAddr;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Table size past which expired entries are pruned on insert.
const PRUNE_THRESHOLD: usize = 1024;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_reset_at: Instant,
}

// ============================================================================
// RateLimiter
// ============================================================================

/// Counts requests per IP within a fixed window.
///
/// Windows expire lazily on the next request from the same address.
#[derive(Debug)]
pub struct RateLimiter {
    entries: Mutex<FxHashMap<IpAddr, RateLimitEntry>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_requests` per `window`.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            max_requests,
            window,
        }
    }

    /// Counts one request from `ip`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimited`] with the time left in the window once
    /// the address has used its quota.
    pub fn check(&self, ip: IpAddr) -> Result<()> {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> Result<()> {
        let mut entries = self.entries.lock();

        if entries.len() >= PRUNE_THRESHOLD && !entries.contains_key(&ip) {
            let before = entries.len();
            entries.retain(|_, entry| entry.window_reset_at > now);
            debug!(removed = before - entries.len(), "Pruned rate limit table");
        }

        let entry = entries.entry(ip).or_insert(RateLimitEntry {
            count: 0,
            window_reset_at: now + self.window,
        });

        if now >= entry.window_reset_at {
            entry.count = 0;
            entry.window_reset_at = now + self.window;
        }

        if entry.count >= self.max_requests {
            let remaining = entry.window_reset_at.saturating_duration_since(now);
            warn!(%ip, count = entry.count, "Rate limit exceeded");
            return Err(Error::rate_limited(remaining));
        }

        entry.count += 1;
        Ok(())
    }

    /// Number of tracked addresses.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.entries.lock().len()
    }
}

// ============================================================================
// Tests
// ============================================================================

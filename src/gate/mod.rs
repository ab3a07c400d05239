//! Security gate shared by the HTTP adapter and the agent upgrade.
//!
//! | Check | Applies to | Failure |
//! |-------|------------|---------|
//! | Token | every request except `GET /status`, agent upgrade | 401 |
//! | Rate limit | HTTP requests, by client IP | 429 |
//! | Origin | agent upgrade, CORS | 403 |
//! | Body size | HTTP request bodies | 413 |

// ============================================================================
// Submodules
// ============================================================================

/// Shared-secret token.
pub mod auth;

/// Size-limited body reading.
pub mod body;

/// Origin validation.
pub mod origin;

/// Per-IP rate limiting.
pub mod ratelimit;

// ============================================================================
// Re-exports
// ============================================================================

pub use auth::AuthToken;
pub use body::{check_content_length, read_limited};
pub use origin::{origin_allowed, validate_origin};
pub use ratelimit::RateLimiter;

// ============================================================================
// Imports
// ============================================================================

use std::net::IpAddr;

use crate::config::RelayConfig;
use crate::error::{Error, Result};

// ============================================================================
// Gate
// ============================================================================

/// Token, rate limiter and origin policy for one relay.
#[derive(Debug)]
pub struct Gate {
    token: AuthToken,
    limiter: RateLimiter,
    extension_scheme: String,
    max_body_bytes: usize,
}

impl Gate {
    /// Creates a gate from configuration and the shared secret.
    #[must_use]
    pub fn new(config: &RelayConfig, token: AuthToken) -> Self {
        Self {
            token,
            limiter: RateLimiter::new(config.rate_limit, config.rate_window),
            extension_scheme: config.extension_scheme.clone(),
            max_body_bytes: config.max_body_bytes,
        }
    }

    /// Returns the shared secret.
    #[inline]
    #[must_use]
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    /// Returns the allowed origin scheme.
    #[inline]
    #[must_use]
    pub fn extension_scheme(&self) -> &str {
        &self.extension_scheme
    }

    /// Returns the body cap in bytes.
    #[inline]
    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Checks request credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthenticated`] if no valid token is presented.
    pub fn authenticate(&self, authorization: Option<&str>, query: Option<&str>) -> Result<()> {
        if self.token.verify(authorization, query) {
            Ok(())
        } else {
            Err(Error::Unauthenticated)
        }
    }

    /// Counts one request from `ip`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimited`] if the address is over quota.
    pub fn throttle(&self, ip: IpAddr) -> Result<()> {
        self.limiter.check(ip)
    }

    /// Validates the agent's `Origin` header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Forbidden`] for a non-extension origin.
    pub fn check_origin(&self, origin: Option<&str>) -> Result<()> {
        validate_origin(origin, &self.extension_scheme)
    }
}

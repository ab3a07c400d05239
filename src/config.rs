//! Relay configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use bridgemcp::RelayConfig;
//!
//! let config = RelayConfig::new()
//!     .with_port(9000)
//!     .with_call_timeout(Duration::from_secs(10));
//!
//! assert_eq!(config.bind.port(), 9000);
//! assert!(config.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default port for HTTP and the agent WebSocket.
pub const DEFAULT_PORT: u16 = 8620;

/// Default bind address (localhost only).
pub const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum outstanding calls.
pub const DEFAULT_MAX_PENDING: usize = 100;

/// Requests allowed per client per window.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Rate limit window length.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// HTTP body cap (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Longest delay accepted by the wait tool and route.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

/// Largest agent frame accepted (screenshots are big).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Origin scheme of the browser extension.
pub const DEFAULT_EXTENSION_SCHEME: &str = "chrome-extension";

// ============================================================================
// RelayConfig
// ============================================================================

/// Runtime configuration for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind: SocketAddr,

    /// Deadline for each call to the agent.
    pub call_timeout: Duration,

    /// Capacity of the pending-call table.
    pub max_pending: usize,

    /// Requests allowed per client address per window.
    pub rate_limit: u32,

    /// Rate limit window length.
    pub rate_window: Duration,

    /// HTTP body cap in bytes.
    pub max_body_bytes: usize,

    /// Clamp for the local delay.
    pub max_wait: Duration,

    /// Largest agent WebSocket message in bytes.
    pub max_frame_bytes: usize,

    /// Allowed `Origin` scheme for the agent and CORS.
    pub extension_scheme: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RelayConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind: SocketAddr::new(DEFAULT_BIND_IP, DEFAULT_PORT),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: DEFAULT_RATE_WINDOW,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_wait: DEFAULT_MAX_WAIT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            extension_scheme: DEFAULT_EXTENSION_SCHEME.to_string(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RelayConfig {
    /// Sets the full bind address.
    #[inline]
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Sets the bind IP, keeping the port.
    #[inline]
    #[must_use]
    pub fn with_host(mut self, ip: IpAddr) -> Self {
        self.bind.set_ip(ip);
        self
    }

    /// Sets the bind port. Use 0 for a random port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind.set_port(port);
        self
    }

    /// Sets the per-call deadline.
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the pending-call capacity.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the rate limit and its window.
    #[inline]
    #[must_use]
    pub fn with_rate_limit(mut self, requests: u32, window: Duration) -> Self {
        self.rate_limit = requests;
        self.rate_window = window;
        self
    }

    /// Sets the HTTP body cap.
    #[inline]
    #[must_use]
    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Sets the clamp for the local delay.
    #[inline]
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Sets the allowed extension origin scheme (without `://`).
    #[inline]
    #[must_use]
    pub fn with_extension_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.extension_scheme = scheme.into();
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RelayConfig {
    /// Checks that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.call_timeout.is_zero() {
            return Err(Error::config("call_timeout must be greater than 0"));
        }
        if self.max_pending == 0 {
            return Err(Error::config("max_pending must be greater than 0"));
        }
        if self.rate_limit == 0 {
            return Err(Error::config("rate_limit must be greater than 0"));
        }
        if self.rate_window.is_zero() {
            return Err(Error::config("rate_window must be greater than 0"));
        }
        if self.max_body_bytes == 0 {
            return Err(Error::config("max_body_bytes must be greater than 0"));
        }
        if self.max_frame_bytes == 0 {
            return Err(Error::config("max_frame_bytes must be greater than 0"));
        }
        if self.extension_scheme.is_empty() || self.extension_scheme.contains(':') {
            return Err(Error::config(
                "extension_scheme must be a bare scheme such as \"chrome-extension\"",
            ));
        }
        Ok(())
    }

    /// Returns the HTTP base URL for the bind address.
    #[must_use]
    pub fn http_url(&self) -> String {
        format!("http://{}", self.bind)
    }

    /// Returns the agent WebSocket URL for the bind address.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.bind)
    }
}

// ============================================================================
// Tests
// ============================================================================

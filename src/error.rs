//! Error types for BridgeMCP.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use bridgemcp::{Error, Result};
//!
//! async fn navigate(relay: &Relay) -> Result<()> {
//!     let params = serde_json::json!({ "url": "https://example.com" });
//!     relay.registry().submit(Action::Navigate, params).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Relay | [`Error::PeerUnavailable`], [`Error::Overloaded`], [`Error::Timeout`], [`Error::PeerDisconnected`], [`Error::PeerConflict`], [`Error::ActionFailed`] |
//! | Gate | [`Error::Unauthenticated`], [`Error::Forbidden`], [`Error::RateLimited`], [`Error::BadRequest`], [`Error::PayloadTooLarge`] |
//! | Configuration | [`Error::Config`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CallId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Relay errors are produced by the connection registry and surfaced to the
/// adapters as values. Gate errors are produced and resolved entirely inside
/// the adapters.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Relay Errors
    // ========================================================================
    /// No browser agent is connected.
    #[error("Browser agent not connected. Install and enable the BridgeMCP extension.")]
    PeerUnavailable,

    /// The pending-call table is full.
    #[error("Too many pending calls: {pending}/{capacity}")]
    Overloaded {
        /// Calls outstanding when the submit was refused.
        pending: usize,
        /// Configured table capacity.
        capacity: usize,
    },

    /// No reply arrived before the call deadline.
    #[error("Call {call_id} timed out after {timeout_ms}ms")]
    Timeout {
        /// The call that expired.
        call_id: CallId,
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    /// The agent transport dropped while the call was outstanding.
    #[error("Browser agent disconnected")]
    PeerDisconnected,

    /// Another agent already holds the peer slot.
    #[error("Another browser agent is already connected")]
    PeerConflict,

    /// The agent executed the action and reported a failure.
    #[error("Action failed: {message}")]
    ActionFailed {
        /// Failure message reported by the agent.
        message: String,
    },

    // ========================================================================
    // Gate Errors
    // ========================================================================
    /// Missing or wrong credential.
    #[error("Unauthorized: invalid or missing token")]
    Unauthenticated,

    /// The upgrade request carried a foreign `Origin`.
    #[error("Origin not allowed: {origin}")]
    Forbidden {
        /// The rejected origin.
        origin: String,
    },

    /// Client exceeded its request budget for the current window.
    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the window resets.
        retry_after_secs: u64,
    },

    /// Malformed body, parameters or JSON.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Description of what was wrong.
        message: String,
    },

    /// Body exceeded the configured cap.
    #[error("Payload too large (limit {limit} bytes)")]
    PayloadTooLarge {
        /// The cap in bytes.
        limit: usize,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an overloaded error.
    #[inline]
    pub fn overloaded(pending: usize, capacity: usize) -> Self {
        Self::Overloaded { pending, capacity }
    }

    /// Creates a call timeout error.
    #[inline]
    pub fn timeout(call_id: CallId, timeout: Duration) -> Self {
        Self::Timeout {
            call_id,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Creates an action failed error.
    #[inline]
    pub fn action_failed(message: impl Into<String>) -> Self {
        Self::ActionFailed {
            message: message.into(),
        }
    }

    /// Creates a forbidden origin error.
    #[inline]
    pub fn forbidden(origin: impl Into<String>) -> Self {
        Self::Forbidden {
            origin: origin.into(),
        }
    }

    /// Creates a rate limited error, rounding the wait up to whole seconds.
    #[inline]
    pub fn rate_limited(retry_after: Duration) -> Self {
        let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
        Self::RateLimited {
            retry_after_secs: secs,
        }
    }

    /// Creates a bad request error.
    #[inline]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a payload too large error.
    #[inline]
    pub fn payload_too_large(limit: usize) -> Self {
        Self::PayloadTooLarge { limit }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Classification
// ============================================================================

impl Error {
    /// Returns the stable machine-readable kind of this error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PeerUnavailable => "peer_unavailable",
            Self::Overloaded { .. } => "overloaded",
            Self::Timeout { .. } => "timeout",
            Self::PeerDisconnected => "peer_disconnected",
            Self::PeerConflict => "peer_conflict",
            Self::ActionFailed { .. } => "action_failed",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden { .. } => "forbidden",
            Self::RateLimited { .. } => "rate_limited",
            Self::BadRequest { .. } => "bad_request",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::Config { .. } => "config",
            Self::Io(_) | Self::Json(_) | Self::WebSocket(_) => "internal",
        }
    }

    /// Returns a fixed message that is safe to show to remote clients.
    ///
    /// Never includes wrapped error text.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::PeerUnavailable => "Browser agent not connected",
            Self::Overloaded { .. } => "Too many pending calls",
            Self::Timeout { .. } => "Request timeout",
            Self::PeerDisconnected => "Browser agent disconnected",
            Self::PeerConflict => "Browser agent already connected",
            Self::ActionFailed { .. } => "Action failed",
            Self::Unauthenticated => "Unauthorized",
            Self::Forbidden { .. } => "Forbidden",
            Self::RateLimited { .. } => "Too many requests",
            Self::BadRequest { .. } => "Bad request",
            Self::PayloadTooLarge { .. } => "Payload too large",
            Self::Config { .. } | Self::Io(_) | Self::Json(_) | Self::WebSocket(_) => {
                "Internal server error"
            }
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the error concerns the agent connection itself.
    #[inline]
    #[must_use]
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Self::PeerUnavailable | Self::PeerDisconnected | Self::PeerConflict | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the error was raised by the security gate.
    #[inline]
    #[must_use]
    pub fn is_gate_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated
                | Self::Forbidden { .. }
                | Self::RateLimited { .. }
                | Self::BadRequest { .. }
                | Self::PayloadTooLarge { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

//! JSON-RPC 2.0 envelope used by the stdio (MCP) adapter.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// Protocol version string in every reply.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Server-defined error for failed tool calls.
pub const SERVER_ERROR: i64 = -32000;

// ============================================================================
// RpcRequest
// ============================================================================

/// An incoming request or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    /// Envelope version, not enforced.
    #[serde(default)]
    pub jsonrpc: Option<String>,

    /// Procedure name.
    pub method: String,

    /// Procedure parameters.
    #[serde(default)]
    pub params: Value,

    /// Request id, absent for notifications.
    #[serde(default)]
    pub id: Value,
}

// ============================================================================
// RpcResponse
// ============================================================================

/// An outgoing reply.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,

    /// Echo of the request id.
    pub id: Value,

    /// Result payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error payload on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Creates a success reply.
    #[inline]
    #[must_use]
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error reply.
    #[inline]
    #[must_use]
    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Error object inside an [`RpcResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RpcError {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

// ============================================================================
// Tests
// ============================================================================

//! Frames exchanged with the browser agent.
//!
//! # Format
//!
//! Relay → agent call:
//! ```json
//! { "id": "uuid", "action": "navigate", "params": { "url": "https://example.com" } }
//! ```
//!
//! Agent → relay, tagged by `type`:
//! ```json
//! { "type": "connect", "agent": "bridgemcp-extension", "version": "1.0.0" }
//! { "type": "response", "id": "uuid", "success": true, "data": { ... } }
//! { "type": "response", "id": "uuid", "success": false, "error": "message" }
//! { "type": "ping" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::CallId;

use super::Action;

// ============================================================================
// Call
// ============================================================================

/// A call frame from relay to agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Correlation id echoed back in the reply.
    pub id: CallId,

    /// Action wire name.
    pub action: String,

    /// Action parameters.
    #[serde(default)]
    pub params: Value,
}

impl Call {
    /// Creates a call with a freshly generated id.
    #[inline]
    #[must_use]
    pub fn new(action: Action, params: Value) -> Self {
        Self {
            id: CallId::generate(),
            action: action.as_str().to_string(),
            params,
        }
    }
}

// ============================================================================
// PeerFrame
// ============================================================================

/// A frame sent by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PeerFrame {
    /// Identity handshake, first frame after connecting.
    Connect(AgentInfo),
    /// Reply to a call.
    Response(Reply),
    /// Keepalive, no reply expected.
    Ping,
}

/// Agent identity from the `connect` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    /// Agent name.
    #[serde(default)]
    pub agent: String,
    /// Agent version.
    #[serde(default)]
    pub version: String,
}

// ============================================================================
// Reply
// ============================================================================

/// The agent's reply to one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// Matches the call `id`.
    pub id: CallId,

    /// Whether the action succeeded.
    pub success: bool,

    /// Result data (if success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Failure message (if not success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    /// Creates a success reply.
    #[inline]
    #[must_use]
    pub fn success(id: CallId, data: Value) -> Self {
        Self {
            id,
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Creates a failure reply.
    #[inline]
    #[must_use]
    pub fn failure(id: CallId, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Extracts the result value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] if the agent reported a failure.
    pub fn into_result(self) -> Result<Value> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            let message = self.error.unwrap_or_else(|| "unknown error".to_string());
            Err(Error::action_failed(message))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_serialization() {
        let call = Call::new(Action::Navigate, json!({ "url": "https://example.com" }));
        let value = serde_json::to_value(&call).expect("serialize");

        assert_eq!(value["action"], "navigate");
        assert_eq!(value["params"]["url"], "https://example.com");
        assert_eq!(value["id"], call.id.to_string());
    }

    #[test]
    fn test_connect_frame() {
        let frame: PeerFrame = serde_json::from_str(
            r#"{"type":"connect","agent":"bridgemcp-extension","version":"1.0.0"}"#,
        )
        .expect("parse");

        match frame {
            PeerFrame::Connect(info) => {
                assert_eq!(info.agent, "bridgemcp-extension");
                assert_eq!(info.version, "1.0.0");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn test_ping_frame() {
        let frame: PeerFrame = serde_json::from_str(r#"{"type":"ping"}"#).expect("parse");
        assert!(matches!(frame, PeerFrame::Ping));
    }

    #[test]
    fn test_success_response() {
        let json_str = r#"{
            "type": "response",
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "success": true,
            "data": {"navigated": true}
        }"#;

        let PeerFrame::Response(reply) = serde_json::from_str(json_str).expect("parse") else {
            panic!("expected response");
        };
        let data = reply.into_result().expect("success");
        assert_eq!(data["navigated"], true);
    }

    #[test]
    fn test_failure_response() {
        let json_str = r#"{
            "type": "response",
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "success": false,
            "error": "Element not found: #submit"
        }"#;

        let PeerFrame::Response(reply) = serde_json::from_str(json_str).expect("parse") else {
            panic!("expected response");
        };
        let err = reply.into_result().unwrap_err();
        assert!(matches!(err, Error::ActionFailed { ref message } if message == "Element not found: #submit"));
    }

    #[test]
    fn test_success_without_data_is_null() {
        let reply = Reply {
            id: CallId::generate(),
            success: true,
            data: None,
            error: None,
        };
        assert_eq!(reply.into_result().expect("success"), Value::Null);
    }

    #[test]
    fn test_reply_serializes_tagged() {
        let id = CallId::generate();
        let frame = PeerFrame::Response(Reply::failure(id, "nope"));
        let value = serde_json::to_value(&frame).expect("serialize");

        assert_eq!(value["type"], "response");
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "nope");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_str::<PeerFrame>(r#"{"type":"bogus"}"#).is_err());
        assert!(serde_json::from_str::<PeerFrame>("not json").is_err());
    }
}

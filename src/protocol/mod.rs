//! Wire message types.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`Call`] | Relay → Agent | Execute an action |
//! | [`PeerFrame::Connect`] | Agent → Relay | Identity handshake |
//! | [`PeerFrame::Response`] | Agent → Relay | Tagged [`Reply`] to a call |
//! | [`PeerFrame::Ping`] | Agent → Relay | Keepalive |
//! | [`RpcRequest`] / [`RpcResponse`] | Client ↔ Relay (stdio) | JSON-RPC 2.0 |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `action` | Fixed action table |
//! | `frame` | Agent frames |
//! | `rpc` | JSON-RPC envelope |
//! | `tools` | MCP tool catalog |

// ============================================================================
// Submodules
// ============================================================================

/// Fixed action table.
pub mod action;

/// Frames exchanged with the agent.
pub mod frame;

/// JSON-RPC 2.0 envelope.
pub mod rpc;

/// MCP tool catalog.
pub mod tools;

// ============================================================================
// Re-exports
// ============================================================================

pub use action::Action;
pub use frame::{AgentInfo, Call, PeerFrame, Reply};
pub use rpc::{RpcError, RpcRequest, RpcResponse};
pub use tools::{ToolSpec, ToolTarget, find_tool, tool_catalog};

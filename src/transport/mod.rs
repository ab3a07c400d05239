//! Agent transport layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   submit    ┌──────────┐   frames   ┌──────────────┐
//! │  Adapters    │────────────►│ Registry │───────────►│ Peer driver  │
//! │ (stdio/http) │◄────────────│          │◄───────────│ (WebSocket)  │
//! └──────────────┘   reply     └──────────┘   replies  └──────┬───────┘
//!                                                             │
//!                                                  ws://localhost:PORT
//!                                                             │
//!                                                     ┌───────▼───────┐
//!                                                     │ Browser agent │
//!                                                     └───────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | Agent slot and pending-call table |
//! | `peer` | Upgrade admission and socket driver |
//! | `server` | Listener for HTTP and WebSocket |

// ============================================================================
// Submodules
// ============================================================================

/// Agent slot and pending-call table.
pub mod registry;

/// Agent upgrade admission and socket driver.
pub mod peer;

/// Listener shared by HTTP and the agent WebSocket.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use peer::{CLOSE_PEER_CONFLICT, UpgradeRequest, admit};
pub use registry::{PeerLease, PeerStatus, Registry};
pub use server::RelayServer;

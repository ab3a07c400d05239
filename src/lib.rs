//! BridgeMCP - relay between automation clients and a browser agent.
//!
//! The relay exposes browser actions to two kinds of clients, MCP over stdio
//! and a local REST API, and forwards each request to a single browser
//! extension connected over WebSocket.
//!
//! # Architecture
//!
//! ```text
//!  MCP client ──stdio──┐
//!                      ├──► Registry ──WebSocket──► Browser agent
//!  HTTP client ──REST──┘        ▲
//!                               └── Security gate (token, origin, rate limit)
//! ```
//!
//! Key design principles:
//!
//! - At most one agent is connected; a second one is refused with close code 4409
//! - Every call has a deadline; replies are matched by id, not order
//! - Adapters only ever call [`Registry::submit`]
//! - Process-wide state lives in an explicit [`Relay`] context
//!
//! # Quick Start
//!
//! ```no_run
//! use bridgemcp::{AuthToken, Relay, RelayConfig, RelayServer, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let token = AuthToken::generate();
//!     let relay = Relay::new(RelayConfig::new(), token)?;
//!
//!     let server = RelayServer::bind(relay).await?;
//!     println!("Connect the extension to {}", server.ws_url());
//!     server.serve().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapter`] | Stdio (MCP) and HTTP adapters |
//! | [`agent`] | Reconnecting agent client |
//! | [`config`] | Relay configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`gate`] | Token, origin, rate limit and body checks |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types |
//! | [`relay`] | Shared relay context |
//! | [`transport`] | Registry, agent driver and listener |

// ============================================================================
// Modules
// ============================================================================

/// Client-facing protocol adapters.
pub mod adapter;

/// Reconnecting agent client, the browser side of the protocol.
pub mod agent;

/// Relay configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Security gate.
pub mod gate;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire message types.
pub mod protocol;

/// Shared relay context.
pub mod relay;

/// Agent transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Adapter types
pub use adapter::StdioAdapter;

// Agent types
pub use agent::{ActionExecutor, AgentConfig, AgentState, PeerAgent};

// Configuration
pub use config::RelayConfig;

// Error types
pub use error::{Error, Result};

// Gate types
pub use gate::{AuthToken, Gate};

// Identifier types
pub use identifiers::{CallId, PeerId};

// Protocol types
pub use protocol::{Action, AgentInfo, Call, PeerFrame, Reply};

// Relay context
pub use relay::Relay;

// Transport types
pub use transport::{PeerStatus, Registry, RelayServer};

//! Agent WebSocket admission and driver.
//!
//! The driver task is the only writer to the agent socket. It forwards
//! frames queued by the registry and hands every inbound text frame back to
//! it.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::relay::Relay;

use super::registry::PeerLease;

// ============================================================================
// Constants
// ============================================================================

/// Close code sent to a second agent.
pub const CLOSE_PEER_CONFLICT: u16 = 4409;

/// Close reason sent to a second agent.
const CONFLICT_REASON: &str = "Another browser agent is already connected";

// ============================================================================
// Admission
// ============================================================================

/// Credentials presented on the upgrade request.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpgradeRequest<'a> {
    /// `Origin` header.
    pub origin: Option<&'a str>,
    /// `Authorization` header.
    pub authorization: Option<&'a str>,
    /// Raw query string.
    pub query: Option<&'a str>,
}

/// Validates an agent upgrade and, on success, completes it.
///
/// Slot admission happens after the handshake so that a second agent can be
/// told why it was refused.
///
/// # Errors
///
/// - [`Error::Forbidden`] for a non-extension origin
/// - [`Error::Unauthenticated`] if no valid token is presented
pub fn admit(relay: Arc<Relay>, ws: WebSocketUpgrade, request: UpgradeRequest<'_>) -> Result<Response> {
    let gate = relay.gate();
    gate.check_origin(request.origin)?;
    gate.authenticate(request.authorization, request.query)?;

    let max_frame_bytes = relay.config().max_frame_bytes;
    Ok(ws
        .max_message_size(max_frame_bytes)
        .on_upgrade(move |socket| on_socket(relay, socket)))
}

async fn on_socket(relay: Arc<Relay>, mut socket: WebSocket) {
    match relay.registry().attach() {
        Ok(lease) => drive(relay, socket, lease).await,
        Err(Error::PeerConflict) => {
            let close = Message::Close(Some(CloseFrame {
                code: CLOSE_PEER_CONFLICT,
                reason: Utf8Bytes::from_static(CONFLICT_REASON),
            }));
            if let Err(e) = socket.send(close).await {
                debug!(error = %e, "Failed to close rejected agent");
            }
        }
        Err(e) => error!(error = %e, "Agent admission failed"),
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Pumps frames between the socket and the registry until either side closes.
async fn drive(relay: Arc<Relay>, socket: WebSocket, lease: PeerLease) {
    let PeerLease { id, mut outbound } = lease;
    let registry = relay.registry();
    let (mut ws_write, mut ws_read) = socket.split();

    loop {
        tokio::select! {
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => registry.handle_frame(id, text.as_str()),

                    Some(Ok(Message::Close(frame))) => {
                        debug!(peer = %id, ?frame, "Agent closed connection");
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(peer = %id, error = %e, "Agent socket error");
                        break;
                    }

                    None => {
                        debug!(peer = %id, "Agent stream ended");
                        break;
                    }

                    // Binary, Ping, Pong
                    Some(Ok(_)) => {}
                }
            }

            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    debug!(peer = %id, "Outbound queue closed");
                    let _ = ws_write.close().await;
                    break;
                };
                if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                    warn!(peer = %id, error = %e, "Failed to send call frame");
                    break;
                }
            }
        }
    }

    registry.detach(id);
    info!(peer = %id, "Agent driver stopped");
}

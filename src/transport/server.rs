//! Listener shared by the HTTP adapter and the agent WebSocket.
//!
//! # Connection Flow
//!
//! 1. [`RelayServer::bind`] binds the configured address (port 0 for random)
//! 2. The browser extension connects to [`RelayServer::ws_url`] with `?token=`
//! 3. HTTP clients call [`RelayServer::http_url`]
//! 4. [`RelayServer::serve`] runs until the listener fails or shutdown fires

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::adapter::http;
use crate::error::Result;
use crate::relay::Relay;

// ============================================================================
// RelayServer
// ============================================================================

/// A bound relay listener.
///
/// # Example
///
/// ```no_run
/// use bridgemcp::{AuthToken, Relay, RelayConfig, RelayServer};
///
/// # async fn example() -> bridgemcp::Result<()> {
/// let relay = Relay::new(RelayConfig::new().with_port(0), AuthToken::generate())?;
/// let server = RelayServer::bind(relay).await?;
/// println!("agent url: {}", server.ws_url());
/// server.serve().await?;
/// # Ok(())
/// # }
/// ```
pub struct RelayServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    relay: Arc<Relay>,
}

impl RelayServer {
    /// Binds the address from the relay's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if binding fails.
    pub async fn bind(relay: Arc<Relay>) -> Result<Self> {
        let addr = relay.config().bind;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Relay listener bound");
        Ok(Self {
            listener,
            local_addr,
            relay,
        })
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the HTTP base URL.
    #[must_use]
    pub fn http_url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// Returns the agent WebSocket URL.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Returns the shared relay context.
    #[inline]
    #[must_use]
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    fn app(&self) -> Router {
        http::router(Arc::clone(&self.relay))
    }

    /// Serves requests until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] on listener failure.
    pub async fn serve(self) -> Result<()> {
        let app = self.app();
        info!(addr = %self.local_addr, "Relay listening");

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }

    /// Serves requests until `signal` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] on listener failure.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.app();
        info!(addr = %self.local_addr, "Relay listening");

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await?;

        info!("Relay stopped");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Process-wide relay context.
//!
//! Ties together the configuration, the connection registry and the
//! security gate. Adapters and the peer driver receive an `Arc<Relay>`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::RelayConfig;
use crate::error::Result;
use crate::gate::{AuthToken, Gate};
use crate::transport::{PeerStatus, Registry};

// ============================================================================
// Relay
// ============================================================================

/// Shared state for one relay instance.
#[derive(Debug)]
pub struct Relay {
    config: RelayConfig,
    registry: Registry,
    gate: Gate,
}

impl Relay {
    /// Creates a relay after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the configuration is invalid.
    pub fn new(config: RelayConfig, token: AuthToken) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            registry: Registry::from_config(&config),
            gate: Gate::new(&config, token),
            config,
        }))
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Returns the connection registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Returns the security gate.
    #[inline]
    #[must_use]
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Renders the public status document.
    #[must_use]
    pub fn status(&self) -> Value {
        let PeerStatus {
            connected,
            agent,
            pending,
        } = self.registry.status();

        json!({
            "connected": connected,
            "version": env!("CARGO_PKG_VERSION"),
            "agent": agent,
            "pending": pending,
        })
    }
}

//! Reconnecting agent client.
//!
//! The agent side of the relay protocol: it keeps one WebSocket open to the
//! relay, executes every incoming call through an [`ActionExecutor`] and
//! answers with a `response` frame.
//!
//! # State Machine
//!
//! ```text
//!  Idle ──(token set)──► Connecting ──► Open
//!   ▲                        │           │
//!   │                        ▼           ▼
//!   └──────(no token)───── Backoff ◄── closed / error
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::Value;
//! use bridgemcp::agent::{ActionExecutor, AgentConfig, PeerAgent};
//! use bridgemcp::protocol::Action;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ActionExecutor for Echo {
//!     async fn execute(&self, _action: Action, params: Value) -> Result<Value, String> {
//!         Ok(params)
//!     }
//! }
//!
//! # async fn example() -> bridgemcp::Result<()> {
//! let agent = PeerAgent::new(AgentConfig::new(), Arc::new(Echo))?;
//! agent.set_token(Some("secret".to_string()));
//! agent.run(tokio::signal::ctrl_c()).await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Pre-execution checks and local actions.
pub mod guard;

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::{Value, from_str, to_string};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, interval_at, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Action, AgentInfo, Call, PeerFrame, Reply};

// ============================================================================
// Constants
// ============================================================================

/// Default relay URL.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:8620";

/// Delay between reconnection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Keepalive period.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Agent name sent in the `connect` frame.
pub const DEFAULT_AGENT_NAME: &str = "bridgemcp-extension";

// ============================================================================
// ActionExecutor
// ============================================================================

/// Performs actions on behalf of the agent.
///
/// Failures are plain messages; they are sent back to the relay verbatim.
#[async_trait]
pub trait ActionExecutor: Send + Sync + 'static {
    /// Executes one action.
    async fn execute(&self, action: Action, params: Value) -> std::result::Result<Value, String>;
}

// ============================================================================
// AgentConfig
// ============================================================================

/// Agent connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Relay WebSocket URL without the token.
    pub url: String,
    /// Delay before reconnecting.
    pub retry_delay: Duration,
    /// Keepalive period.
    pub ping_interval: Duration,
    /// Name reported in the `connect` frame.
    pub agent: String,
    /// Version reported in the `connect` frame.
    pub version: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: DEFAULT_RELAY_URL.to_string(),
            retry_delay: DEFAULT_RETRY_DELAY,
            ping_interval: DEFAULT_PING_INTERVAL,
            agent: DEFAULT_AGENT_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Sets the relay URL.
    #[inline]
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Sets the reconnection delay.
    #[inline]
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the keepalive period.
    #[inline]
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Sets the reported identity.
    #[inline]
    #[must_use]
    pub fn with_identity(mut self, agent: impl Into<String>, version: impl Into<String>) -> Self {
        self.agent = agent.into();
        self.version = version.into();
        self
    }

    /// Checks that all values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a non-WebSocket URL or a zero period.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url).map_err(|e| Error::config(format!("invalid agent url: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config("agent url must use ws:// or wss://"));
        }
        if self.retry_delay.is_zero() {
            return Err(Error::config("retry_delay must be greater than 0"));
        }
        if self.ping_interval.is_zero() {
            return Err(Error::config("ping_interval must be greater than 0"));
        }
        Ok(())
    }
}

// ============================================================================
// AgentState
// ============================================================================

/// Connection state of a [`PeerAgent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// No token configured.
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Connected and serving calls.
    Open,
    /// Waiting before the next attempt.
    Backoff,
}

// ============================================================================
// PeerAgent
// ============================================================================

/// A reconnecting relay client.
pub struct PeerAgent {
    config: AgentConfig,
    executor: Arc<dyn ActionExecutor>,
    token: RwLock<Option<String>>,
    state: watch::Sender<AgentState>,
}

impl PeerAgent {
    /// Creates an idle agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn new(config: AgentConfig, executor: Arc<dyn ActionExecutor>) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(AgentState::Idle);
        Ok(Self {
            config,
            executor,
            token: RwLock::new(None),
            state,
        })
    }

    /// Replaces the token used for the next connection attempt.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token.filter(|t| !t.is_empty());
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> AgentState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: AgentState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }
}

// ============================================================================
// PeerAgent - Connection Loop
// ============================================================================

impl PeerAgent {
    /// Connects and reconnects until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                () = self.attempt() => {}
            }
        }

        self.set_state(AgentState::Idle);
        info!("Agent stopped");
    }

    /// One connection attempt followed by the retry delay.
    async fn attempt(&self) {
        let token = self.token.read().clone();
        let Some(token) = token else {
            self.set_state(AgentState::Idle);
            trace!("No token configured");
            sleep(self.config.retry_delay).await;
            return;
        };

        self.set_state(AgentState::Connecting);
        match self.session(&token).await {
            Ok(()) => info!("Relay connection closed"),
            Err(e) => warn!(error = %e, "Relay connection failed"),
        }

        self.set_state(AgentState::Backoff);
        debug!(delay_ms = self.config.retry_delay.as_millis() as u64, "Reconnecting after delay");
        sleep(self.config.retry_delay).await;
    }

    fn connect_url(&self, token: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| Error::config(format!("invalid agent url: {e}")))?;
        url.set_query(Some(&format!("token={}", urlencoding::encode(token))));
        Ok(url)
    }

    /// Runs one connection until it closes.
    async fn session(&self, token: &str) -> Result<()> {
        let url = self.connect_url(token)?;
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut ws_write, mut ws_read) = ws_stream.split();

        let hello = PeerFrame::Connect(AgentInfo {
            agent: self.config.agent.clone(),
            version: self.config.version.clone(),
        });
        ws_write.send(Message::Text(to_string(&hello)?.into())).await?;
        self.set_state(AgentState::Open);
        info!(url = %self.config.url, "Connected to relay");

        let ping_frame = to_string(&PeerFrame::Ping)?;
        let period = self.config.ping_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);

        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Reply>();
        let mut calls = JoinSet::new();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            self.dispatch(text.as_str(), &reply_tx, &mut calls);
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Relay closed connection");
                            break;
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => break,
                        Some(Ok(_)) => {}
                    }
                }

                Some(reply) = reply_rx.recv() => {
                    let frame = to_string(&PeerFrame::Response(reply))?;
                    ws_write.send(Message::Text(frame.into())).await?;
                }

                _ = keepalive.tick() => {
                    trace!("Sending keepalive");
                    ws_write.send(Message::Text(ping_frame.clone().into())).await?;
                }

                Some(joined) = calls.join_next(), if !calls.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "Call task failed");
                    }
                }
            }
        }

        Ok(())
    }

    /// Starts executing one call frame.
    fn dispatch(&self, text: &str, reply_tx: &mpsc::UnboundedSender<Reply>, calls: &mut JoinSet<()>) {
        let call = match from_str::<Call>(text) {
            Ok(call) => call,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed call frame");
                return;
            }
        };

        let executor = Arc::clone(&self.executor);
        let reply_tx = reply_tx.clone();
        calls.spawn(async move {
            let reply = execute_call(executor.as_ref(), call).await;
            let _ = reply_tx.send(reply);
        });
    }
}

/// Runs one call through the guards and the executor.
pub async fn execute_call(executor: &dyn ActionExecutor, call: Call) -> Reply {
    let Call { id, action, params } = call;

    let Ok(action) = action.parse::<Action>() else {
        debug!(%id, %action, "Unknown action");
        return Reply::failure(id, format!("Unknown action: {action}"));
    };

    if action == Action::Ping {
        return Reply::success(id, guard::pong());
    }

    if let Some(scheme) = guard::blocked_scheme(action, &params) {
        warn!(%id, %action, %scheme, "Refusing blocked URL scheme");
        return Reply::failure(id, guard::blocked_message(&scheme));
    }

    match executor.execute(action, params).await {
        Ok(data) => Reply::success(id, data),
        Err(message) => Reply::failure(id, message),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::CallId;

    struct Echo;

    #[async_trait]
    impl ActionExecutor for Echo {
        async fn execute(&self, action: Action, params: Value) -> std::result::Result<Value, String> {
            if action == Action::Click {
                return Err("Element not found".to_string());
            }
            Ok(json!({ "action": action.as_str(), "params": params }))
        }
    }

    fn call(action: &str, params: Value) -> Call {
        Call {
            id: CallId::generate(),
            action: action.to_string(),
            params,
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.url, "ws://localhost:8620");
        assert_eq!(config.retry_delay, Duration::from_secs(3));
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.agent, "bridgemcp-extension");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_http_url() {
        let config = AgentConfig::new().with_url("http://localhost:8620");
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_connect_url_encodes_token() {
        let agent = PeerAgent::new(AgentConfig::new(), Arc::new(Echo)).expect("agent");
        let url = agent.connect_url("a+b/c").expect("url");
        assert_eq!(url.as_str(), "ws://localhost:8620/?token=a%2Bb%2Fc");
    }

    #[test]
    fn test_set_token_ignores_empty() {
        let agent = PeerAgent::new(AgentConfig::new(), Arc::new(Echo)).expect("agent");
        agent.set_token(Some(String::new()));
        assert!(agent.token.read().is_none());
        agent.set_token(Some("t".to_string()));
        assert_eq!(agent.token.read().as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn test_execute_success_and_failure() {
        let reply = execute_call(&Echo, call("navigate", json!({ "url": "https://a.example" }))).await;
        assert!(reply.success);
        assert_eq!(reply.data.expect("data")["action"], "navigate");

        let reply = execute_call(&Echo, call("click", json!({}))).await;
        assert!(!reply.success);
        assert_eq!(reply.error.as_deref(), Some("Element not found"));
    }

    #[tokio::test]
    async fn test_unknown_action_fails() {
        let reply = execute_call(&Echo, call("teleport", json!({}))).await;
        assert_eq!(reply.error.as_deref(), Some("Unknown action: teleport"));
    }

    #[tokio::test]
    async fn test_ping_answered_locally() {
        let reply = execute_call(&Echo, call("ping", json!({}))).await;
        assert_eq!(reply.data.expect("data")["pong"], true);
    }

    #[tokio::test]
    async fn test_blocked_scheme_never_executes() {
        let reply = execute_call(&Echo, call("navigate", json!({ "url": "javascript:alert(1)" }))).await;
        assert!(!reply.success);
        assert_eq!(
            reply.error.as_deref(),
            Some("Blocked URL scheme: javascript. Only http/https URLs are allowed.")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_without_token() {
        let agent = PeerAgent::new(AgentConfig::new(), Arc::new(Echo)).expect("agent");
        let mut states = agent.subscribe();

        agent.run(sleep(Duration::from_secs(10))).await;

        assert_eq!(agent.state(), AgentState::Idle);
        assert!(!states.has_changed().expect("sender alive"));
    }
}

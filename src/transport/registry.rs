//! Connection registry: the single agent slot and the pending-call table.
//!
//! # Call Lifecycle
//!
//! ```text
//! submit ──► [slot empty?] ──► PeerUnavailable
//!    │
//!    ├──► [table full?] ──► Overloaded
//!    │
//!    ├──► insert PendingCall + send frame  (one lock)
//!    │
//!    └──► await ─┬─ reply        ─► Ok / ActionFailed
//!                ├─ deadline     ─► Timeout
//!                ├─ detach       ─► PeerDisconnected
//!                └─ caller drop  ─► entry removed
//! ```
//!
//! Whichever event removes the entry from the table is the only one that
//! resolves it, so a call completes at most once.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, from_str, to_string};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, trace, warn};

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::identifiers::{CallId, PeerId};
use crate::protocol::{Action, AgentInfo, Call, PeerFrame, Reply};

// ============================================================================
// Types
// ============================================================================

/// One-shot completion handle for a pending call.
type ReplySender = oneshot::Sender<Result<Value>>;

/// An outstanding call.
struct PendingCall {
    action: Action,
    created_at: Instant,
    deadline: Instant,
    reply_tx: ReplySender,
}

/// The registered agent connection.
struct PeerSlot {
    id: PeerId,
    outbound: mpsc::UnboundedSender<String>,
    info: Option<AgentInfo>,
}

/// State guarded by a single lock so admission, submission and the
/// disconnect sweep are serialized.
#[derive(Default)]
struct RegistryState {
    peer: Option<PeerSlot>,
    pending: FxHashMap<CallId, PendingCall>,
}

// ============================================================================
// PeerLease
// ============================================================================

/// Handed to the transport driver of an admitted agent.
///
/// `outbound` yields serialized call frames until the peer is detached.
#[derive(Debug)]
pub struct PeerLease {
    /// Identity of the admitted connection.
    pub id: PeerId,
    /// Frames to write to the agent socket.
    pub outbound: mpsc::UnboundedReceiver<String>,
}

// ============================================================================
// PeerStatus
// ============================================================================

/// Snapshot of the registry for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerStatus {
    /// Whether an agent is connected.
    pub connected: bool,
    /// Identity reported in the `connect` frame.
    pub agent: Option<AgentInfo>,
    /// Number of outstanding calls.
    pub pending: usize,
}

// ============================================================================
// Registry
// ============================================================================

/// Owns the at-most-one agent connection and correlates calls with replies.
///
/// # Thread Safety
///
/// `Registry` is `Send + Sync`; share it behind an `Arc`.
pub struct Registry {
    state: Mutex<RegistryState>,
    call_timeout: Duration,
    max_pending: usize,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(call_timeout: Duration, max_pending: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            call_timeout,
            max_pending,
        }
    }

    /// Creates a registry from relay configuration.
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.call_timeout, config.max_pending)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Registry")
            .field("peer", &state.peer.as_ref().map(|peer| peer.id))
            .field("pending", &state.pending.len())
            .field("call_timeout", &self.call_timeout)
            .field("max_pending", &self.max_pending)
            .finish()
    }
}

// ============================================================================
// Registry - Calls
// ============================================================================

impl Registry {
    /// Sends an action to the agent and waits for its reply.
    ///
    /// # Errors
    ///
    /// - [`Error::PeerUnavailable`] if no agent is connected
    /// - [`Error::Overloaded`] if the pending table is full
    /// - [`Error::Timeout`] if no reply arrives before the deadline
    /// - [`Error::PeerDisconnected`] if the agent drops mid-call
    /// - [`Error::ActionFailed`] if the agent reports a failure
    pub async fn submit(&self, action: Action, params: Value) -> Result<Value> {
        let (call_id, deadline, reply_rx) = self.register(action, params)?;
        let _guard = PendingGuard {
            registry: self,
            call_id,
        };

        match timeout_at(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::PeerDisconnected),
            Err(_) => {
                warn!(%call_id, %action, "Call timed out");
                Err(Error::timeout(call_id, self.call_timeout))
            }
        }
    }

    /// Allocates a call, records it and transmits the frame.
    fn register(
        &self,
        action: Action,
        params: Value,
    ) -> Result<(CallId, Instant, oneshot::Receiver<Result<Value>>)> {
        let mut state = self.state.lock();
        let RegistryState { peer, pending } = &mut *state;

        let Some(peer) = peer.as_ref() else {
            debug!(%action, "Submit with no agent connected");
            return Err(Error::PeerUnavailable);
        };

        if pending.len() >= self.max_pending {
            warn!(
                pending = pending.len(),
                max = self.max_pending,
                "Too many pending calls"
            );
            return Err(Error::overloaded(pending.len(), self.max_pending));
        }

        let call = Call::new(action, params);
        let call_id = call.id;
        let frame = to_string(&call)?;

        peer.outbound
            .send(frame)
            .map_err(|_| Error::PeerDisconnected)?;

        let created_at = Instant::now();
        let deadline = created_at + self.call_timeout;
        let (reply_tx, reply_rx) = oneshot::channel();
        pending.insert(
            call_id,
            PendingCall {
                action,
                created_at,
                deadline,
                reply_tx,
            },
        );

        trace!(%call_id, %action, peer = %peer.id, "Call sent");
        Ok((call_id, deadline, reply_rx))
    }

    /// Resolves the pending call matching a reply, if any.
    fn resolve(&self, reply: Reply) {
        let Some(call) = self.state.lock().pending.remove(&reply.id) else {
            debug!(call_id = %reply.id, "Reply for unknown call");
            return;
        };

        debug!(
            call_id = %reply.id,
            action = %call.action,
            success = reply.success,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            "Call resolved"
        );
        let _ = call.reply_tx.send(reply.into_result());
    }

    /// Drops a pending entry without resolving it.
    fn forget(&self, call_id: CallId) {
        if let Some(call) = self.state.lock().pending.remove(&call_id) {
            trace!(
                %call_id,
                overdue = Instant::now() >= call.deadline,
                "Pending call removed"
            );
        }
    }
}

/// Removes a call from the table when its submitter stops waiting.
struct PendingGuard<'a> {
    registry: &'a Registry,
    call_id: CallId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.forget(self.call_id);
    }
}

// ============================================================================
// Registry - Peer Lifecycle
// ============================================================================

impl Registry {
    /// Admits a new agent if the slot is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeerConflict`] if an agent is already connected.
    /// The existing agent is left untouched.
    pub fn attach(&self) -> Result<PeerLease> {
        let mut state = self.state.lock();

        if let Some(existing) = state.peer.as_ref() {
            warn!(existing = %existing.id, "Rejecting second agent connection");
            return Err(Error::PeerConflict);
        }

        let id = PeerId::next();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        state.peer = Some(PeerSlot {
            id,
            outbound: outbound_tx,
            info: None,
        });

        info!(peer = %id, "Agent connected");
        Ok(PeerLease {
            id,
            outbound: outbound_rx,
        })
    }

    /// Releases the slot if `peer_id` still holds it.
    ///
    /// Every outstanding call is rejected with [`Error::PeerDisconnected`].
    /// Returns `false` for a stale id.
    pub fn detach(&self, peer_id: PeerId) -> bool {
        let drained: Vec<_> = {
            let mut state = self.state.lock();
            match state.peer.as_ref() {
                Some(peer) if peer.id == peer_id => {}
                _ => {
                    debug!(peer = %peer_id, "Ignoring close of stale agent connection");
                    return false;
                }
            }
            state.peer = None;
            state.pending.drain().collect()
        };

        let count = drained.len();
        for (_, call) in drained {
            let _ = call.reply_tx.send(Err(Error::PeerDisconnected));
        }

        info!(peer = %peer_id, failed = count, "Agent disconnected");
        true
    }

    /// Handles one text frame from the agent.
    ///
    /// Malformed frames and frames from a stale connection are logged and
    /// dropped.
    pub fn handle_frame(&self, peer_id: PeerId, text: &str) {
        let frame = match from_str::<PeerFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "Failed to parse agent frame");
                return;
            }
        };

        if !self.is_current(peer_id) {
            debug!(peer = %peer_id, "Frame from stale agent connection");
            return;
        }

        match frame {
            PeerFrame::Connect(info) => {
                info!(agent = %info.agent, version = %info.version, "Agent identified");
                if let Some(peer) = self.state.lock().peer.as_mut()
                    && peer.id == peer_id
                {
                    peer.info = Some(info);
                }
            }
            PeerFrame::Response(reply) => self.resolve(reply),
            PeerFrame::Ping => trace!(peer = %peer_id, "Agent ping"),
        }
    }
}

// ============================================================================
// Registry - Introspection
// ============================================================================

impl Registry {
    /// Returns `true` if an agent is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().peer.is_some()
    }

    /// Returns the number of outstanding calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns a status snapshot.
    #[must_use]
    pub fn status(&self) -> PeerStatus {
        let state = self.state.lock();
        PeerStatus {
            connected: state.peer.is_some(),
            agent: state.peer.as_ref().and_then(|peer| peer.info.clone()),
            pending: state.pending.len(),
        }
    }

    /// Returns `true` if `peer_id` holds the slot.
    fn is_current(&self, peer_id: PeerId) -> bool {
        self.state
            .lock()
            .peer
            .as_ref()
            .is_some_and(|peer| peer.id == peer_id)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use serde_json::json;

    fn registry() -> Arc<Registry> {
        Arc::new(Registry::new(Duration::from_secs(30), 100))
    }

    fn reply_frame(call: &Call, data: Value) -> String {
        to_string(&PeerFrame::Response(Reply::success(call.id, data))).expect("serialize")
    }

    async fn next_call(lease: &mut PeerLease) -> Call {
        let frame = lease.outbound.recv().await.expect("call frame");
        from_str(&frame).expect("parse call")
    }

    #[tokio::test]
    async fn test_submit_without_peer() {
        let registry = registry();
        let err = registry.submit(Action::GetTabs, json!({})).await.unwrap_err();

        assert!(matches!(err, Error::PeerUnavailable));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_and_reply() {
        let registry = registry();
        let mut lease = registry.attach().expect("attach");

        let submitter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .submit(Action::Navigate, json!({ "url": "https://example.com" }))
                    .await
            })
        };

        let call = next_call(&mut lease).await;
        assert_eq!(call.action, "navigate");
        assert_eq!(call.params["url"], "https://example.com");
        assert_eq!(registry.pending_count(), 1);

        registry.handle_frame(lease.id, &reply_frame(&call, json!({ "navigated": true })));

        let data = submitter.await.expect("join").expect("success");
        assert_eq!(data, json!({ "navigated": true }));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_reply_maps_to_action_failed() {
        let registry = registry();
        let mut lease = registry.attach().expect("attach");

        let submitter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.submit(Action::Click, json!({})).await })
        };

        let call = next_call(&mut lease).await;
        let frame = to_string(&PeerFrame::Response(Reply::failure(call.id, "no element")))
            .expect("serialize");
        registry.handle_frame(lease.id, &frame);

        let err = submitter.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::ActionFailed { ref message } if message == "no element"));
    }

    #[tokio::test]
    async fn test_replies_matched_by_id_out_of_order() {
        let registry = registry();
        let mut lease = registry.attach().expect("attach");

        let first = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.submit(Action::GetTabs, json!({ "n": 1 })).await })
        };
        let call_a = next_call(&mut lease).await;

        let second = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.submit(Action::GetTabs, json!({ "n": 2 })).await })
        };
        let call_b = next_call(&mut lease).await;

        registry.handle_frame(lease.id, &reply_frame(&call_b, json!("b")));
        registry.handle_frame(lease.id, &reply_frame(&call_a, json!("a")));

        assert_eq!(first.await.expect("join").expect("ok"), json!("a"));
        assert_eq!(second.await.expect("join").expect("ok"), json!("b"));
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let registry = Arc::new(Registry::new(Duration::from_secs(30), 100));
        let mut lease = registry.attach().expect("attach");

        let mut submitters = Vec::new();
        for _ in 0..100 {
            let registry = Arc::clone(&registry);
            submitters.push(tokio::spawn(async move {
                registry.submit(Action::Snapshot, json!({})).await
            }));
        }

        let mut calls = Vec::new();
        for _ in 0..100 {
            calls.push(next_call(&mut lease).await);
        }
        assert_eq!(registry.pending_count(), 100);

        let err = registry.submit(Action::Snapshot, json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Overloaded { pending: 100, capacity: 100 }));
        assert_eq!(registry.pending_count(), 100);
        assert!(lease.outbound.try_recv().is_err(), "no frame for refused call");

        for call in &calls {
            registry.handle_frame(lease.id, &reply_frame(call, json!(null)));
        }
        for submitter in submitters {
            assert!(submitter.await.expect("join").is_ok());
        }
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_reply_id_is_ignored() {
        let registry = registry();
        let mut lease = registry.attach().expect("attach");

        let submitter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.submit(Action::GetTabs, json!({})).await })
        };
        let call = next_call(&mut lease).await;

        let stray = Call::new(Action::GetTabs, json!({}));
        registry.handle_frame(lease.id, &reply_frame(&stray, json!("stray")));
        assert_eq!(registry.pending_count(), 1);

        registry.handle_frame(lease.id, &reply_frame(&call, json!("real")));
        registry.handle_frame(lease.id, &reply_frame(&call, json!("duplicate")));

        assert_eq!(submitter.await.expect("join").expect("ok"), json!("real"));
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_frames_are_not_fatal() {
        let registry = registry();
        let lease = registry.attach().expect("attach");

        registry.handle_frame(lease.id, "{not json");
        registry.handle_frame(lease.id, r#"{"type":"mystery"}"#);
        registry.handle_frame(lease.id, r#"{"type":"ping"}"#);

        assert!(registry.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_rejects_all_pending() {
        let registry = registry();
        let mut lease = registry.attach().expect("attach");

        let mut submitters = Vec::new();
        for _ in 0..5 {
            let registry = Arc::clone(&registry);
            submitters.push(tokio::spawn(async move {
                registry.submit(Action::Screenshot, json!({})).await
            }));
        }
        for _ in 0..5 {
            next_call(&mut lease).await;
        }

        assert!(registry.detach(lease.id));
        assert_eq!(registry.pending_count(), 0);
        assert!(!registry.is_connected());

        for submitter in submitters {
            let err = submitter.await.expect("join").unwrap_err();
            assert!(matches!(err, Error::PeerDisconnected));
        }
        assert!(lease.outbound.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry_and_late_reply_is_dropped() {
        let registry = registry();
        let mut lease = registry.attach().expect("attach");

        let submitter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.submit(Action::ReadPage, json!({})).await })
        };
        let call = next_call(&mut lease).await;

        tokio::time::advance(Duration::from_secs(31)).await;
        let err = submitter.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::Timeout { call_id, timeout_ms: 30_000 } if call_id == call.id));
        assert_eq!(registry.pending_count(), 0);

        registry.handle_frame(lease.id, &reply_frame(&call, json!("late")));
        assert_eq!(registry.pending_count(), 0);
        assert!(registry.is_connected());
    }

    #[tokio::test]
    async fn test_dropped_submitter_frees_slot() {
        let registry = registry();
        let mut lease = registry.attach().expect("attach");

        let submitter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.submit(Action::GetTabs, json!({})).await })
        };
        next_call(&mut lease).await;
        assert_eq!(registry.pending_count(), 1);

        submitter.abort();
        let _ = submitter.await;
        assert_eq!(registry.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_second_peer_rejected() {
        let registry = registry();
        let mut first = registry.attach().expect("attach");

        let submitter = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.submit(Action::GetTabs, json!({})).await })
        };
        let call = next_call(&mut first).await;

        assert!(matches!(registry.attach(), Err(Error::PeerConflict)));
        assert_eq!(registry.pending_count(), 1);

        registry.handle_frame(first.id, &reply_frame(&call, json!("still here")));
        assert_eq!(submitter.await.expect("join").expect("ok"), json!("still here"));
    }

    #[tokio::test]
    async fn test_stale_detach_is_ignored() {
        let registry = registry();
        let first = registry.attach().expect("attach");
        assert!(registry.detach(first.id));

        let second = registry.attach().expect("reattach");
        assert!(!registry.detach(first.id));
        assert!(registry.is_connected());

        registry.handle_frame(
            first.id,
            r#"{"type":"connect","agent":"ghost","version":"0"}"#,
        );
        assert_eq!(registry.status().agent, None);

        assert!(registry.detach(second.id));
    }

    #[tokio::test]
    async fn test_connect_frame_recorded_in_status() {
        let registry = registry();
        let lease = registry.attach().expect("attach");

        registry.handle_frame(
            lease.id,
            r#"{"type":"connect","agent":"bridgemcp-extension","version":"1.0.0"}"#,
        );

        let status = registry.status();
        assert!(status.connected);
        assert_eq!(status.pending, 0);
        assert_eq!(
            status.agent,
            Some(AgentInfo {
                agent: "bridgemcp-extension".to_string(),
                version: "1.0.0".to_string(),
            })
        );
    }
}

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::Identity;
use crate::db::{DocumentId, DocumentStore};
use crate::models::{decode_inbound, InboundMessage};
use crate::ws::error::SessionError;
use crate::ws::gate::PermissionGate;
use crate::ws::persistence::PersistenceAdapter;
use crate::ws::registry::{EventReceiver, GroupRegistry, MemberHandle, Membership, SessionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authorizing,
    /// Gate passed, transport not yet accepted
    Authorized,
    Rejected,
    Joined,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Close frame from the client, with its close code if any
    ClientClosed(Option<u16>),
    /// Underlying transport failed or ended without a close frame
    Transport(String),
    /// Outbound delivery to the client failed
    SendFailed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientClosed(Some(code)) => write!(f, "client closed ({})", code),
            DisconnectReason::ClientClosed(None) => write!(f, "client closed"),
            DisconnectReason::Transport(e) => write!(f, "transport error: {}", e),
            DisconnectReason::SendFailed => write!(f, "send to client failed"),
        }
    }
}

/// One live connection to one document.
///
/// Drives the connection through authorization, group membership, inbound
/// dispatch and the disconnect sequence. Transport agnostic: the websocket
/// handler feeds it text frames and forwards the group events it receives.
pub struct ConnectionActor {
    document_id: DocumentId,
    identity: Identity,
    state: ConnectionState,
    gate: PermissionGate,
    persistence: PersistenceAdapter,
    registry: Arc<GroupRegistry>,
    membership: Option<Membership>,
}

impl ConnectionActor {
    pub fn new(
        document_id: DocumentId,
        identity: Identity,
        store: Arc<dyn DocumentStore>,
        registry: Arc<GroupRegistry>,
    ) -> Self {
        Self {
            document_id,
            identity,
            state: ConnectionState::Connecting,
            gate: PermissionGate::new(store.clone()),
            persistence: PersistenceAdapter::new(store),
            registry,
            membership: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn expect_state(&self, expected: ConnectionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState(self.state))
        }
    }

    /// Run the permission gate. A denial is terminal.
    pub async fn authorize(&mut self) -> Result<(), SessionError> {
        self.expect_state(ConnectionState::Connecting)?;
        self.state = ConnectionState::Authorizing;
        info!(
            "User attempting to connect: {} (document {})",
            self.identity.display_name(),
            self.document_id
        );

        if self.gate.authorize(self.document_id, &self.identity).await {
            self.state = ConnectionState::Authorized;
            Ok(())
        } else {
            self.state = ConnectionState::Rejected;
            warn!(
                "Rejected {} on document {}",
                self.identity.display_name(),
                self.document_id
            );
            Err(SessionError::AuthorizationDenied(self.document_id))
        }
    }

    /// Join the session group of the document; the rest of the group sees `user_connected`.
    /// Returns the stream of events addressed to this connection.
    pub fn join(&mut self) -> Result<EventReceiver, SessionError> {
        self.expect_state(ConnectionState::Authorized)?;
        let (handle, events) = MemberHandle::new(self.identity.display_name());
        self.membership = Some(self.registry.join(self.document_id, handle));
        self.state = ConnectionState::Joined;
        Ok(events)
    }

    /// Start processing inbound messages
    pub fn activate(&mut self) -> Result<(), SessionError> {
        self.expect_state(ConnectionState::Joined)?;
        self.state = ConnectionState::Active;
        Ok(())
    }

    /// Authorize, join and activate in one step
    pub async fn connect(&mut self) -> Result<EventReceiver, SessionError> {
        self.authorize().await?;
        let events = self.join()?;
        self.activate()?;
        Ok(events)
    }

    /// Dispatch one inbound text frame to the rest of the group.
    ///
    /// Malformed or unknown messages come back as recoverable errors for the
    /// caller to report to this connection only; the connection stays Active.
    pub fn receive(&mut self, payload: &str) -> Result<(), SessionError> {
        self.expect_state(ConnectionState::Active)?;
        let Some(membership) = self.membership.as_ref() else {
            return Err(SessionError::InvalidState(self.state));
        };

        let user = self.identity.display_name().to_string();
        let event = match decode_inbound(payload)? {
            InboundMessage::Edit { content, cursor_position } => SessionEvent::DocumentUpdate {
                content,
                cursor_position,
                user,
            },
            InboundMessage::Typing => SessionEvent::TypingIndicator { user },
            // decode_inbound never yields this variant
            InboundMessage::Unrecognized => return Err(SessionError::UnknownAction(String::new())),
        };

        let delivered = membership.broadcast(event);
        debug!(
            "Relayed message from {} on document {} to {} member(s)",
            self.identity.display_name(),
            self.document_id,
            delivered
        );
        Ok(())
    }

    /// Re-save the document, then leave the group (announcing `user_disconnected`).
    ///
    /// Persistence failures are logged and never stop the leave sequence.
    /// A connection that never joined has nothing to tear down.
    pub async fn disconnect(&mut self, reason: DisconnectReason) {
        let Some(membership) = self.membership.take() else {
            if !matches!(self.state, ConnectionState::Rejected | ConnectionState::Closed) {
                self.state = ConnectionState::Closed;
            }
            return;
        };

        self.state = ConnectionState::Closing;
        info!(
            "{} disconnecting from document {}: {}",
            self.identity.display_name(),
            self.document_id,
            reason
        );

        if let Err(e) = self.resave().await {
            warn!("Save on disconnect skipped: {}", e);
        }

        membership.leave();
        self.state = ConnectionState::Closed;
    }

    /// Writes the stored content back unchanged; stores that version every
    /// write record one version per disconnect.
    async fn resave(&self) -> Result<(), SessionError> {
        let content = self
            .persistence
            .read_content(self.document_id)
            .await
            .ok_or(SessionError::PersistenceUnavailable(self.document_id))?;

        if self.persistence.write_content(self.document_id, &content).await {
            Ok(())
        } else {
            Err(SessionError::PersistenceUnavailable(self.document_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDocumentStore;
    use crate::models::CursorPosition;

    struct Fixture {
        store: Arc<MemoryDocumentStore>,
        registry: Arc<GroupRegistry>,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(MemoryDocumentStore::new());
            store.insert(42, "shared doc", "stored", 1).await;
            store.share(42, 2).await;
            store.share(42, 3).await;
            Self { store, registry: Arc::new(GroupRegistry::new()) }
        }

        fn actor(&self, id: i64, name: &str) -> ConnectionActor {
            ConnectionActor::new(42, Identity::user(id, name), self.store.clone(), self.registry.clone())
        }
    }

    fn drain(rx: &mut EventReceiver) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((*event).clone());
        }
        events
    }

    #[tokio::test]
    async fn rejected_connection_never_joins() {
        let fx = Fixture::new().await;
        let (probe, mut probe_rx) = MemberHandle::new("probe");
        let _probe = fx.registry.join(42, probe);

        let mut stranger = fx.actor(9, "Z");
        assert!(matches!(stranger.connect().await, Err(SessionError::AuthorizationDenied(42))));
        assert_eq!(stranger.state(), ConnectionState::Rejected);
        assert!(matches!(stranger.receive(r#"{"action":"typing"}"#), Err(SessionError::InvalidState(_))));

        stranger.disconnect(DisconnectReason::ClientClosed(None)).await;
        assert_eq!(stranger.state(), ConnectionState::Rejected);
        assert!(drain(&mut probe_rx).is_empty());
        assert_eq!(fx.store.get(42).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn anonymous_connection_is_rejected() {
        let fx = Fixture::new().await;
        let mut anon = ConnectionActor::new(42, Identity::Anonymous, fx.store.clone(), fx.registry.clone());
        assert!(anon.connect().await.is_err());
        assert_eq!(fx.registry.group_count(), 0);
    }

    #[tokio::test]
    async fn edit_reaches_others_but_not_sender() {
        let fx = Fixture::new().await;
        let mut a = fx.actor(1, "A");
        let mut b = fx.actor(2, "B");
        let mut c = fx.actor(3, "C");
        let mut rx_a = a.connect().await.unwrap();
        let mut rx_b = b.connect().await.unwrap();
        let mut rx_c = c.connect().await.unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        a.receive(r#"{"action":"edit","content":"hello","cursor_position":5}"#).unwrap();
        let expected = SessionEvent::DocumentUpdate {
            content: "hello".to_string(),
            cursor_position: Some(CursorPosition::Offset(5u64.into())),
            user: "A".to_string(),
        };
        assert_eq!(drain(&mut rx_b), vec![expected.clone()]);
        assert_eq!(drain(&mut rx_c), vec![expected]);
        assert!(drain(&mut rx_a).is_empty());

        b.receive(r#"{"action":"typing"}"#).unwrap();
        assert_eq!(drain(&mut rx_a), vec![SessionEvent::TypingIndicator { user: "B".to_string() }]);
    }

    #[tokio::test]
    async fn negative_and_fractional_cursors_are_relayed() {
        let fx = Fixture::new().await;
        let mut a = fx.actor(1, "A");
        let mut b = fx.actor(2, "B");
        let _rx_a = a.connect().await.unwrap();
        let mut rx_b = b.connect().await.unwrap();

        a.receive(r#"{"action":"edit","content":"x","cursor_position":-1}"#).unwrap();
        a.receive(r#"{"action":"edit","content":"y","cursor_position":2.5}"#).unwrap();
        let cursors: Vec<serde_json::Value> = drain(&mut rx_b)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::DocumentUpdate { cursor_position, .. } => {
                    Some(serde_json::to_value(cursor_position).unwrap())
                }
                _ => None,
            })
            .collect();
        assert_eq!(cursors, vec![serde_json::json!(-1), serde_json::json!(2.5)]);
    }

    #[tokio::test]
    async fn bad_payload_is_recoverable() {
        let fx = Fixture::new().await;
        let mut a = fx.actor(1, "A");
        let mut b = fx.actor(2, "B");
        let _rx_a = a.connect().await.unwrap();
        let mut rx_b = b.connect().await.unwrap();

        let err = a.receive("this is not json").unwrap_err();
        assert!(err.is_recoverable());
        let err = a.receive(r#"{"action":"save"}"#).unwrap_err();
        assert!(matches!(err, SessionError::UnknownAction(_)));
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(a.state(), ConnectionState::Active);

        a.receive(r#"{"action":"typing"}"#).unwrap();
        assert_eq!(drain(&mut rx_b), vec![SessionEvent::TypingIndicator { user: "A".to_string() }]);
    }

    #[tokio::test]
    async fn disconnect_resaves_and_announces() {
        let fx = Fixture::new().await;
        let mut a = fx.actor(1, "A");
        let mut b = fx.actor(2, "B");
        let mut rx_a = a.connect().await.unwrap();
        let _rx_b = b.connect().await.unwrap();
        drain(&mut rx_a);

        b.disconnect(DisconnectReason::ClientClosed(Some(1000))).await;
        assert_eq!(b.state(), ConnectionState::Closed);
        assert_eq!(drain(&mut rx_a), vec![SessionEvent::UserDisconnected { user: "B".to_string() }]);

        let doc = fx.store.get(42).await.unwrap();
        assert_eq!(doc.content, "stored");
        assert_eq!(doc.version, 1);
        assert_eq!(fx.registry.member_count(42), 1);
    }

    #[tokio::test]
    async fn disconnect_completes_when_document_vanished() {
        let fx = Fixture::new().await;
        let mut a = fx.actor(1, "A");
        let mut b = fx.actor(2, "B");
        let mut rx_a = a.connect().await.unwrap();
        let _rx_b = b.connect().await.unwrap();
        drain(&mut rx_a);

        fx.store.remove(42).await;
        b.disconnect(DisconnectReason::Transport("reset".to_string())).await;
        assert_eq!(drain(&mut rx_a), vec![SessionEvent::UserDisconnected { user: "B".to_string() }]);

        a.disconnect(DisconnectReason::SendFailed).await;
        assert_eq!(fx.registry.group_count(), 0);
    }

    #[tokio::test]
    async fn revoked_share_does_not_evict_joined_member() {
        let fx = Fixture::new().await;
        let mut a = fx.actor(1, "A");
        let mut b = fx.actor(2, "B");
        let mut rx_a = a.connect().await.unwrap();
        let _rx_b = b.connect().await.unwrap();
        drain(&mut rx_a);

        fx.store.unshare(42, 2).await;
        b.receive(r#"{"action":"typing"}"#).unwrap();
        assert_eq!(drain(&mut rx_a), vec![SessionEvent::TypingIndicator { user: "B".to_string() }]);

        let mut b_again = fx.actor(2, "B");
        assert!(b_again.connect().await.is_err());
    }

    #[tokio::test]
    async fn lifecycle_steps_enforce_order() {
        let fx = Fixture::new().await;
        let mut a = fx.actor(1, "A");
        assert!(matches!(a.join(), Err(SessionError::InvalidState(ConnectionState::Connecting))));
        a.authorize().await.unwrap();
        assert_eq!(a.state(), ConnectionState::Authorized);
        assert!(a.authorize().await.is_err());
        let _rx = a.join().unwrap();
        assert_eq!(a.state(), ConnectionState::Joined);
        assert!(a.receive(r#"{"action":"typing"}"#).is_err());
        a.activate().unwrap();
        assert_eq!(a.state(), ConnectionState::Active);
    }
}

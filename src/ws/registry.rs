use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::DocumentId;
use crate::models::CursorPosition;

pub type ConnectionId = Uuid;
pub type EventSender = mpsc::UnboundedSender<Arc<SessionEvent>>;
pub type EventReceiver = mpsc::UnboundedReceiver<Arc<SessionEvent>>;

/// Events fanned out to the members of a session group
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DocumentUpdate {
        content: String,
        cursor_position: Option<CursorPosition>,
        user: String,
    },
    TypingIndicator {
        user: String,
    },
    UserConnected {
        user: String,
    },
    UserDisconnected {
        user: String,
    },
}

/// Delivery endpoint of one live connection inside a group
#[derive(Debug, Clone)]
pub struct MemberHandle {
    pub id: ConnectionId,
    pub user: String,
    pub joined_at: DateTime<Utc>,
    sender: EventSender,
}

impl MemberHandle {
    pub fn new(user: impl Into<String>) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            id: Uuid::new_v4(),
            user: user.into(),
            joined_at: Utc::now(),
            sender,
        };
        (handle, receiver)
    }

    fn deliver(&self, event: &Arc<SessionEvent>) -> bool {
        self.sender.send(event.clone()).is_ok()
    }
}

#[derive(Debug, Default)]
struct SessionGroup {
    /// In join order
    members: Vec<MemberHandle>,
}

impl SessionGroup {
    /// Deliver to every member but `excluded`, dropping members whose connection is gone.
    /// Returns the number of successful deliveries.
    fn fan_out(&mut self, event: &Arc<SessionEvent>, excluded: Option<ConnectionId>) -> usize {
        let mut delivered = 0;
        self.members.retain(|member| {
            if Some(member.id) == excluded {
                return true;
            }
            if member.deliver(event) {
                delivered += 1;
                true
            } else {
                debug!("Dropping unreachable member {} ({})", member.id, member.user);
                false
            }
        });
        delivered
    }

    fn remove(&mut self, member_id: ConnectionId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member.id != member_id);
        self.members.len() != before
    }
}

/// Live session groups keyed by document id.
///
/// Locking is per shard of the map, so unrelated documents do not contend.
/// Every operation is in-memory and never waits on I/O.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: DashMap<DocumentId, SessionGroup>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member to the group of `document_id`, creating the group if needed.
    /// Existing members are told about the newcomer; the newcomer is not.
    pub fn join(self: &Arc<Self>, document_id: DocumentId, handle: MemberHandle) -> Membership {
        let membership = Membership {
            registry: Arc::clone(self),
            document_id,
            member_id: handle.id,
            user: handle.user.clone(),
        };

        let mut group = self.groups.entry(document_id).or_default();
        let announcement = Arc::new(SessionEvent::UserConnected { user: handle.user.clone() });
        group.fan_out(&announcement, None);
        group.members.push(handle);
        info!(
            "{} joined document {} ({} member(s))",
            membership.user,
            document_id,
            group.members.len()
        );

        membership
    }

    /// Remove a member and tell the remaining ones. Empty groups are dropped at once.
    ///
    /// The departure is announced even when the member was already pruned by a
    /// failed delivery, so every joined user is seen leaving exactly once.
    pub fn leave(&self, document_id: DocumentId, member_id: ConnectionId, user: &str) -> bool {
        let mut removed = false;
        if let Some(mut group) = self.groups.get_mut(&document_id) {
            removed = group.remove(member_id);
            let announcement = Arc::new(SessionEvent::UserDisconnected { user: user.to_string() });
            group.fan_out(&announcement, None);
        }
        self.drop_if_empty(document_id);
        info!("{} left document {}", user, document_id);
        removed
    }

    /// Deliver `event` to every member of the group except `excluded`.
    /// Returns how many members received it.
    pub fn broadcast(
        &self,
        document_id: DocumentId,
        event: SessionEvent,
        excluded: Option<ConnectionId>,
    ) -> usize {
        let event = Arc::new(event);
        let delivered = match self.groups.get_mut(&document_id) {
            Some(mut group) => group.fan_out(&event, excluded),
            None => 0,
        };
        self.drop_if_empty(document_id);
        delivered
    }

    fn drop_if_empty(&self, document_id: DocumentId) {
        if self
            .groups
            .remove_if(&document_id, |_, group| group.members.is_empty())
            .is_some()
        {
            debug!("Session group for document {} reclaimed", document_id);
        }
    }

    pub fn member_count(&self, document_id: DocumentId) -> usize {
        self.groups
            .get(&document_id)
            .map_or(0, |group| group.members.len())
    }

    /// Display names of the members of a group, in join order
    pub fn members(&self, document_id: DocumentId) -> Vec<String> {
        self.groups
            .get(&document_id)
            .map(|group| group.members.iter().map(|m| m.user.clone()).collect())
            .unwrap_or_default()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn connection_count(&self) -> usize {
        self.groups.iter().map(|group| group.members.len()).sum()
    }
}

/// A connection's membership in one session group.
///
/// Dropping it leaves the group, so a connection cannot linger after its task ends.
#[derive(Debug)]
pub struct Membership {
    registry: Arc<GroupRegistry>,
    document_id: DocumentId,
    member_id: ConnectionId,
    user: String,
}

impl Membership {
    /// Fan an event out to every other member of the group
    pub fn broadcast(&self, event: SessionEvent) -> usize {
        self.registry.broadcast(self.document_id, event, Some(self.member_id))
    }

    pub fn leave(self) {
        drop(self)
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.registry.leave(self.document_id, self.member_id, &self.user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str) -> (MemberHandle, EventReceiver) {
        MemberHandle::new(name)
    }

    fn drain(rx: &mut EventReceiver) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((*event).clone());
        }
        events
    }

    fn typing(user: &str) -> SessionEvent {
        SessionEvent::TypingIndicator { user: user.to_string() }
    }

    #[tokio::test]
    async fn join_announces_to_existing_members_only() {
        let registry = Arc::new(GroupRegistry::new());
        let (a, mut rx_a) = member("A");
        let (b, mut rx_b) = member("B");

        let _ma = registry.join(42, a);
        assert!(drain(&mut rx_a).is_empty());

        let _mb = registry.join(42, b);
        assert_eq!(drain(&mut rx_a), vec![SessionEvent::UserConnected { user: "B".to_string() }]);
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(registry.members(42), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let registry = Arc::new(GroupRegistry::new());
        let mut receivers = Vec::new();
        let mut memberships = Vec::new();
        for name in ["A", "B", "C", "D"] {
            let (handle, rx) = member(name);
            memberships.push(registry.join(1, handle));
            receivers.push(rx);
        }
        for rx in receivers.iter_mut() {
            drain(rx);
        }

        assert_eq!(memberships[0].broadcast(typing("A")), 3);
        assert!(drain(&mut receivers[0]).is_empty());
        for rx in receivers.iter_mut().skip(1) {
            assert_eq!(drain(rx), vec![typing("A")]);
        }
    }

    #[tokio::test]
    async fn groups_are_isolated_by_document() {
        let registry = Arc::new(GroupRegistry::new());
        let (a, _rx_a) = member("A");
        let (b, mut rx_b) = member("B");
        let ma = registry.join(1, a);
        let _mb = registry.join(2, b);

        assert_eq!(ma.broadcast(typing("A")), 0);
        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(registry.group_count(), 2);
        assert_eq!(registry.connection_count(), 2);
    }

    #[tokio::test]
    async fn leave_announces_and_reclaims_empty_group() {
        let registry = Arc::new(GroupRegistry::new());
        let (a, mut rx_a) = member("A");
        let (b, _rx_b) = member("B");
        let ma = registry.join(42, a);
        let mb = registry.join(42, b);
        drain(&mut rx_a);

        mb.leave();
        assert_eq!(drain(&mut rx_a), vec![SessionEvent::UserDisconnected { user: "B".to_string() }]);
        assert_eq!(registry.member_count(42), 1);

        drop(ma);
        assert_eq!(registry.group_count(), 0);

        // A fresh group has no memory of earlier members
        let (c, mut rx_c) = member("C");
        let _mc = registry.join(42, c);
        assert_eq!(registry.members(42), vec!["C".to_string()]);
        assert!(drain(&mut rx_c).is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_prunes_member_without_failing_broadcast() {
        let registry = Arc::new(GroupRegistry::new());
        let (a, _rx_a) = member("A");
        let (b, rx_b) = member("B");
        let (c, mut rx_c) = member("C");
        let ma = registry.join(5, a);
        let mb = registry.join(5, b);
        let _mc = registry.join(5, c);
        drain(&mut rx_c);

        drop(rx_b);
        assert_eq!(ma.broadcast(typing("A")), 1);
        assert_eq!(drain(&mut rx_c), vec![typing("A")]);
        assert_eq!(registry.member_count(5), 2);

        // The owner leaving later still announces the departure once
        mb.leave();
        assert_eq!(drain(&mut rx_c), vec![SessionEvent::UserDisconnected { user: "B".to_string() }]);
    }

    #[tokio::test]
    async fn events_from_one_sender_arrive_in_order() {
        let registry = Arc::new(GroupRegistry::new());
        let (a, _rx_a) = member("A");
        let (b, mut rx_b) = member("B");
        let ma = registry.join(9, a);
        let _mb = registry.join(9, b);

        for i in 0..50 {
            ma.broadcast(SessionEvent::DocumentUpdate {
                content: i.to_string(),
                cursor_position: None,
                user: "A".to_string(),
            });
        }
        let contents: Vec<String> = drain(&mut rx_b)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::DocumentUpdate { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(contents, (0..50).map(|i| i.to_string()).collect::<Vec<_>>());
    }
}

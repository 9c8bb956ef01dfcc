//! A registered client connection as seen by the router.

use std::collections::HashSet;
use std::sync::Arc;

use taskhub_core::events::Scope;
use taskhub_core::{ConnectionId, GroupId, ServerMessage, UserId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Outcome of a non-blocking enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The message is buffered for the writer.
    Queued,
    /// The queue is at capacity; the consumer is too slow.
    Full,
    /// The writer has gone away.
    Closed,
}

/// One authenticated client.
///
/// Owned by the router while registered. The session keeps a clone of the
/// outbound sender (for `pong` replies) and of the close token.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    groups: HashSet<GroupId>,
    outbound: mpsc::Sender<Arc<ServerMessage>>,
    closed: CancellationToken,
}

impl Connection {
    /// Create a connection with a fresh id and a bounded outbound queue.
    ///
    /// Returns the receiving half for the writer pump.
    pub fn new(
        user_id: UserId,
        groups: impl IntoIterator<Item = GroupId>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<ServerMessage>>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            id: ConnectionId::generate(),
            user_id,
            groups: groups.into_iter().filter(|g| !g.is_empty()).collect(),
            outbound,
            closed: CancellationToken::new(),
        };
        (conn, rx)
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Owning user.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Current group memberships, sorted.
    pub fn groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<_> = self.groups.iter().cloned().collect();
        groups.sort();
        groups
    }

    /// Whether the connection currently belongs to `group`.
    pub fn is_member(&self, group: &GroupId) -> bool {
        self.groups.contains(group)
    }

    /// Add a membership. Returns `false` if already present.
    pub fn subscribe(&mut self, group: GroupId) -> bool {
        self.groups.insert(group)
    }

    /// Drop a membership. Returns `false` if it was absent.
    pub fn unsubscribe(&mut self, group: &GroupId) -> bool {
        self.groups.remove(group)
    }

    /// Whether an event with this scope is addressed to the connection.
    pub fn accepts(&self, scope: Scope<'_>) -> bool {
        match scope {
            Scope::User(user) => &self.user_id == user,
            Scope::Group(group) => self.groups.contains(group),
            Scope::Global => true,
        }
    }

    /// Enqueue without waiting.
    pub fn try_deliver(&self, message: Arc<ServerMessage>) -> Delivery {
        if self.closed.is_cancelled() {
            return Delivery::Closed;
        }
        match self.outbound.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Sender half of the outbound queue.
    pub fn sender(&self) -> mpsc::Sender<Arc<ServerMessage>> {
        self.outbound.clone()
    }

    /// Token cancelled when the connection is closed.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Tell the writer to flush and close the transport. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

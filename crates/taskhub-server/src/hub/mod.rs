//! The real-time hub.
//!
//! A single router task owns the [`Registry`](registry::Registry). Every
//! registration, membership change, and broadcast is a [`HubCommand`] on one
//! FIFO mailbox, so operations are applied in the order they were issued and
//! dispatch never races with registry mutation.

pub mod connection;
pub mod producers;
pub mod registry;
mod router;

pub use connection::{Connection, Delivery};
pub use producers::Notifier;

use std::sync::Arc;

use serde::Serialize;
use taskhub_core::{ConnectionId, Event, GroupId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Router mailbox entries.
#[derive(Debug)]
pub enum HubCommand {
    /// Make a connection eligible for subsequent events.
    Register(Connection),
    /// Remove and close a connection. Unknown ids are ignored.
    Unregister(ConnectionId),
    /// Add a group membership.
    Subscribe {
        /// Target connection.
        id: ConnectionId,
        /// Group to join.
        group: GroupId,
    },
    /// Remove a group membership.
    Unsubscribe {
        /// Target connection.
        id: ConnectionId,
        /// Group to leave.
        group: GroupId,
    },
    /// Fan an event out to its recipients.
    Broadcast(Arc<Event>),
    /// Report counters.
    Stats(oneshot::Sender<HubStats>),
}

/// Point-in-time hub counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Registered connections.
    pub connections: usize,
    /// Distinct users among registered connections.
    pub users: usize,
    /// Events dispatched since start.
    pub events_dispatched: u64,
}

/// Cloneable handle to the router task.
#[derive(Clone, Debug)]
pub struct Hub {
    tx: mpsc::UnboundedSender<HubCommand>,
    shutdown: CancellationToken,
}

impl Hub {
    /// Start the router task.
    ///
    /// The router stops when `shutdown` is cancelled or when every handle has
    /// been dropped; either way it closes all remaining connections.
    pub fn spawn(shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(router::Router::new(rx, shutdown.clone()).run());
        (Self { tx, shutdown }, task)
    }

    /// Register a connection.
    pub fn register(&self, connection: Connection) {
        self.send(HubCommand::Register(connection));
    }

    /// Unregister and close a connection.
    pub fn unregister(&self, id: &ConnectionId) {
        self.send(HubCommand::Unregister(id.clone()));
    }

    /// Join a connection to a group.
    pub fn subscribe(&self, id: &ConnectionId, group: GroupId) {
        self.send(HubCommand::Subscribe {
            id: id.clone(),
            group,
        });
    }

    /// Remove a connection from a group.
    pub fn unsubscribe(&self, id: &ConnectionId, group: GroupId) {
        self.send(HubCommand::Unsubscribe {
            id: id.clone(),
            group,
        });
    }

    /// Hand an event to the router. Returns immediately.
    pub fn broadcast(&self, event: Event) {
        self.send(HubCommand::Broadcast(Arc::new(event)));
    }

    /// Current counters, answered in mailbox order.
    ///
    /// Returns zeroed stats once the router has stopped.
    pub async fn stats(&self) -> HubStats {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Stats(tx));
        rx.await.unwrap_or_default()
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.stats().await.connections
    }

    /// Whether the hub is shutting down.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The token that stops the router.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn send(&self, command: HubCommand) {
        if let Err(mpsc::error::SendError(command)) = self.tx.send(command) {
            debug!("hub router stopped, dropping command");
            if let HubCommand::Register(connection) = command {
                connection.close();
            }
        }
    }
}

//! Connection bookkeeping owned by the router task.

use std::collections::{HashMap, HashSet};

use taskhub_core::{ConnectionId, UserId};

use super::connection::Connection;

/// Live connections keyed by id.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection, returning any previous entry with the same id.
    pub fn insert(&mut self, connection: Connection) -> Option<Connection> {
        self.connections.insert(connection.id().clone(), connection)
    }

    /// Remove a connection.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.connections.remove(id)
    }

    /// Mutable access for membership changes.
    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether there are no live connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of distinct users with a live connection.
    pub fn user_count(&self) -> usize {
        self.connections
            .values()
            .map(Connection::user_id)
            .collect::<HashSet<&UserId>>()
            .len()
    }

    /// Iterate over live connections.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Remove every connection.
    pub fn drain(&mut self) -> impl Iterator<Item = Connection> + '_ {
        self.connections.drain().map(|(_, conn)| conn)
    }
}

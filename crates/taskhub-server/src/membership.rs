//! Initial group memberships for a connecting user.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use taskhub_core::{GroupId, UserId};
use thiserror::Error;

/// Membership lookup failures.
#[derive(Debug, Error)]
pub enum MembershipError {
    /// The user is unknown to the membership store.
    #[error("user not found")]
    NotFound,
    /// The store could not be queried.
    #[error("membership backend error: {0}")]
    Backend(String),
}

/// Source of the groups a user belongs to.
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    /// Groups `user` is a member of.
    async fn groups_for(&self, user: &UserId) -> Result<Vec<GroupId>, MembershipError>;
}

/// Memberships held in memory.
#[derive(Debug, Default)]
pub struct InMemoryMemberships {
    groups: RwLock<HashMap<UserId, Vec<GroupId>>>,
}

impl InMemoryMemberships {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a user's groups.
    pub fn set(&self, user: impl Into<UserId>, groups: impl IntoIterator<Item = GroupId>) {
        let _ = self
            .groups
            .write()
            .insert(user.into(), groups.into_iter().collect());
    }

    /// Add one group to a user, creating the user if needed.
    pub fn add(&self, user: impl Into<UserId>, group: impl Into<GroupId>) {
        let group = group.into();
        let mut map = self.groups.write();
        let entry = map.entry(user.into()).or_default();
        if !entry.contains(&group) {
            entry.push(group);
        }
    }

    /// Remove one group from a user.
    pub fn remove(&self, user: &UserId, group: &GroupId) {
        if let Some(groups) = self.groups.write().get_mut(user) {
            groups.retain(|g| g != group);
        }
    }
}

#[async_trait]
impl MembershipProvider for InMemoryMemberships {
    async fn groups_for(&self, user: &UserId) -> Result<Vec<GroupId>, MembershipError> {
        self.groups
            .read()
            .get(user)
            .cloned()
            .ok_or(MembershipError::NotFound)
    }
}

//! Change events fanned out to live connections.
//!
//! An [`Event`] is built once by a producer after a successful mutation and is
//! never modified afterwards. Routing is carried by the explicit
//! `target_user` / `target_group` fields; the payload is opaque to the router.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::ids::{GroupId, UserId};

/// What kind of mutation produced an entity event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// Entity was created.
    Created,
    /// Entity was updated.
    Updated,
    /// Entity was deleted.
    Deleted,
    /// Entity status changed (e.g. a todo was completed).
    StatusChanged,
}

impl ChangeAction {
    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::StatusChanged => "status_changed",
        }
    }
}

/// Typed body of an event.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    /// A todo item changed.
    TodoUpdate {
        /// Mutation performed.
        action: ChangeAction,
        /// Todo identifier.
        todo_id: String,
        /// Owning team, when the todo is shared with one.
        team_id: Option<GroupId>,
        /// Snapshot of the todo after the mutation.
        todo: Value,
    },
    /// A team changed.
    TeamUpdate {
        /// Mutation performed.
        action: ChangeAction,
        /// Team identifier.
        team_id: GroupId,
        /// Snapshot of the team after the mutation.
        team: Value,
    },
    /// A user-facing notification.
    Notification {
        /// Notification category (e.g. `"assignment"`).
        notification_type: String,
        /// Human-readable content.
        content: String,
    },
    /// Any other event; type tag and payload are forwarded untouched.
    Custom {
        /// Wire type tag.
        event_type: String,
        /// Payload, serialized as-is.
        payload: Value,
    },
}

impl EventKind {
    /// Type tag written to the wire `type` field.
    pub fn event_type(&self) -> &str {
        match self {
            Self::TodoUpdate { .. } => "todo_update",
            Self::TeamUpdate { .. } => "team_update",
            Self::Notification { .. } => "notification",
            Self::Custom { event_type, .. } => event_type,
        }
    }

    /// Structured payload written to the wire `payload` field.
    pub fn payload(&self) -> Value {
        match self {
            Self::TodoUpdate {
                action,
                todo_id,
                team_id,
                todo,
            } => {
                let mut map = Map::new();
                let _ = map.insert("action".into(), json!(action));
                let _ = map.insert("todo_id".into(), json!(todo_id));
                let _ = map.insert("todo".into(), todo.clone());
                if let Some(team_id) = team_id {
                    let _ = map.insert("team_id".into(), json!(team_id));
                }
                Value::Object(map)
            }
            Self::TeamUpdate {
                action,
                team_id,
                team,
            } => json!({
                "action": action,
                "team_id": team_id,
                "team": team,
            }),
            Self::Notification {
                notification_type,
                content,
            } => json!({
                "type": notification_type,
                "content": content,
            }),
            Self::Custom { payload, .. } => payload.clone(),
        }
    }
}

/// Which connections an event is routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Only connections owned by this user.
    User(&'a UserId),
    /// Only connections currently subscribed to this group.
    Group(&'a GroupId),
    /// Every live connection.
    Global,
}

/// An immutable change notification.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Typed body.
    pub kind: EventKind,
    /// If set, only this user's connections qualify.
    pub target_user: Option<UserId>,
    /// If set (and no user target), only subscribers of this group qualify.
    pub target_group: Option<GroupId>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create a global event (no targets) stamped with the current time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            target_user: None,
            target_group: None,
            timestamp: Utc::now(),
        }
    }

    /// Restrict delivery to a single user.
    #[must_use]
    pub fn for_user(mut self, user: impl Into<UserId>) -> Self {
        self.target_user = Some(user.into());
        self
    }

    /// Restrict delivery to subscribers of a group.
    #[must_use]
    pub fn for_group(mut self, group: impl Into<GroupId>) -> Self {
        self.target_group = Some(group.into());
        self
    }

    /// Event with an arbitrary type tag and payload.
    pub fn custom(event_type: impl Into<String>, payload: Value) -> Self {
        Self::new(EventKind::Custom {
            event_type: event_type.into(),
            payload,
        })
    }

    /// Todo change. Team todos go to the team, personal todos to their owner.
    pub fn todo_update(
        action: ChangeAction,
        todo_id: impl Into<String>,
        owner: impl Into<UserId>,
        team_id: Option<GroupId>,
        todo: Value,
    ) -> Self {
        let event = Self::new(EventKind::TodoUpdate {
            action,
            todo_id: todo_id.into(),
            team_id: team_id.clone(),
            todo,
        });
        match team_id {
            Some(team) if !team.is_empty() => event.for_group(team),
            _ => event.for_user(owner),
        }
    }

    /// Team change, delivered to the team's subscribers.
    pub fn team_update(action: ChangeAction, team_id: impl Into<GroupId>, team: Value) -> Self {
        let team_id = team_id.into();
        Self::new(EventKind::TeamUpdate {
            action,
            team_id: team_id.clone(),
            team,
        })
        .for_group(team_id)
    }

    /// Notification addressed to one user.
    pub fn notification(
        user: impl Into<UserId>,
        notification_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(EventKind::Notification {
            notification_type: notification_type.into(),
            content: content.into(),
        })
        .for_user(user)
    }

    /// Routing scope. A user target wins over a group target.
    pub fn scope(&self) -> Scope<'_> {
        match (&self.target_user, &self.target_group) {
            (Some(user), _) => Scope::User(user),
            (None, Some(group)) => Scope::Group(group),
            (None, None) => Scope::Global,
        }
    }

    /// Wire type tag.
    pub fn event_type(&self) -> &str {
        self.kind.event_type()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

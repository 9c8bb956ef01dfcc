//! Typed entry points for services that mutate todos and teams.
//!
//! Call these after the mutation has been persisted. Delivery is best-effort
//! and never reported back to the caller.

use serde_json::Value;
use taskhub_core::{ChangeAction, Event, GroupId, UserId};

use super::Hub;

/// Publishes change events onto the hub.
#[derive(Clone, Debug)]
pub struct Notifier {
    hub: Hub,
}

impl Notifier {
    /// Wrap a hub handle.
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }

    /// A todo was created, updated, deleted, or changed status.
    ///
    /// Team todos go to the team's subscribers, personal todos to the owner.
    pub fn todo_changed(
        &self,
        todo_id: &str,
        owner: &UserId,
        team_id: Option<&GroupId>,
        action: ChangeAction,
        todo: Value,
    ) {
        self.hub.broadcast(Event::todo_update(
            action,
            todo_id,
            owner.clone(),
            team_id.cloned(),
            todo,
        ));
    }

    /// A team was created, updated, or deleted.
    pub fn team_changed(&self, team_id: &GroupId, action: ChangeAction, team: Value) {
        self.hub
            .broadcast(Event::team_update(action, team_id.clone(), team));
    }

    /// Send a notification to every connection of one user.
    pub fn notify_user(&self, user_id: &UserId, notification_type: &str, content: &str) {
        self.hub
            .broadcast(Event::notification(user_id.clone(), notification_type, content));
    }

    /// Publish an arbitrary event. A user target takes precedence over a
    /// group target; with neither, every connection receives it.
    pub fn publish(
        &self,
        event_type: &str,
        payload: Value,
        target_user: Option<UserId>,
        target_group: Option<GroupId>,
    ) {
        let mut event = Event::custom(event_type, payload);
        event.target_user = target_user;
        event.target_group = target_group;
        self.hub.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Connection;
    use serde_json::json;
    use std::sync::Arc;
    use taskhub_core::ServerMessage;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn join(hub: &Hub, user: &str, groups: &[&str]) -> mpsc::Receiver<Arc<ServerMessage>> {
        let (conn, rx) = Connection::new(
            UserId::from(user),
            groups.iter().map(|g| GroupId::from(*g)),
            8,
        );
        hub.register(conn);
        rx
    }

    #[tokio::test]
    async fn todo_changed_routes_team_and_personal() {
        let (hub, _task) = Hub::spawn(CancellationToken::new());
        let notifier = Notifier::new(hub.clone());
        let mut owner = join(&hub, "owner", &[]);
        let mut mate = join(&hub, "mate", &["team1"]);

        let owner_id = UserId::from("owner");
        notifier.todo_changed("t1", &owner_id, None, ChangeAction::Created, json!({}));
        notifier.todo_changed(
            "t2",
            &owner_id,
            Some(&GroupId::from("team1")),
            ChangeAction::StatusChanged,
            json!({"status": "done"}),
        );
        let _ = hub.connection_count().await;

        let personal = owner.try_recv().unwrap();
        assert_eq!(personal.payload["todo_id"], "t1");
        assert!(owner.try_recv().is_err());

        let team = mate.try_recv().unwrap();
        assert_eq!(team.payload["todo_id"], "t2");
        assert_eq!(team.payload["action"], "status_changed");
        assert!(mate.try_recv().is_err());
    }

    #[tokio::test]
    async fn team_changed_and_notify_user() {
        let (hub, _task) = Hub::spawn(CancellationToken::new());
        let notifier = Notifier::new(hub.clone());
        let mut alice = join(&hub, "alice", &["team1"]);
        let mut bob = join(&hub, "bob", &[]);

        notifier.team_changed(&GroupId::from("team1"), ChangeAction::Deleted, json!(null));
        notifier.notify_user(&UserId::from("bob"), "invite", "join team1");
        let _ = hub.connection_count().await;

        assert_eq!(alice.try_recv().unwrap().message_type, "team_update");
        assert!(alice.try_recv().is_err());
        let note = bob.try_recv().unwrap();
        assert_eq!(note.message_type, "notification");
        assert_eq!(note.payload["content"], "join team1");
    }

    #[tokio::test]
    async fn publish_honours_targets() {
        let (hub, _task) = Hub::spawn(CancellationToken::new());
        let notifier = Notifier::new(hub.clone());
        let mut alice = join(&hub, "alice", &["g"]);
        let mut bob = join(&hub, "bob", &["g"]);

        notifier.publish("entity_update", json!({"id": 1}), None, None);
        notifier.publish(
            "entity_update",
            json!({"id": 2}),
            Some(UserId::from("alice")),
            Some(GroupId::from("g")),
        );
        notifier.publish("entity_update", json!({"id": 3}), None, Some(GroupId::from("g")));
        let _ = hub.connection_count().await;

        let ids = |rx: &mut mpsc::Receiver<Arc<ServerMessage>>| {
            let mut ids = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                ids.push(msg.payload["id"].as_i64().unwrap());
            }
            ids
        };
        assert_eq!(ids(&mut alice), vec![1, 2, 3]);
        assert_eq!(ids(&mut bob), vec![1, 3]);
    }
}

//! The router task: sole owner of the registry.

use std::sync::Arc;

use metrics::{counter, gauge};
use taskhub_core::{ConnectionId, Event, GroupId, ServerMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{Connection, Delivery};
use super::registry::Registry;
use super::{HubCommand, HubStats};
use crate::metrics::{
    HUB_DELIVERIES_TOTAL, HUB_EVENTS_TOTAL, HUB_OVERFLOW_DISCONNECTS_TOTAL, WS_CONNECTIONS_ACTIVE,
};

pub(super) struct Router {
    registry: Registry,
    mailbox: mpsc::UnboundedReceiver<HubCommand>,
    shutdown: CancellationToken,
    events_dispatched: u64,
}

impl Router {
    pub(super) fn new(
        mailbox: mpsc::UnboundedReceiver<HubCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry: Registry::new(),
            mailbox,
            shutdown,
            events_dispatched: 0,
        }
    }

    pub(super) async fn run(mut self) {
        debug!("hub router started");
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }
        self.close_all();
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(connection) => self.register(connection),
            HubCommand::Unregister(id) => self.unregister(&id),
            HubCommand::Subscribe { id, group } => self.subscribe(&id, group),
            HubCommand::Unsubscribe { id, group } => self.unsubscribe(&id, &group),
            HubCommand::Broadcast(event) => self.dispatch(&event),
            HubCommand::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn register(&mut self, connection: Connection) {
        debug!(
            conn_id = %connection.id(),
            user_id = %connection.user_id(),
            groups = connection.groups().len(),
            "connection registered"
        );
        if let Some(previous) = self.registry.insert(connection) {
            previous.close();
        }
        self.record_active();
    }

    fn unregister(&mut self, id: &ConnectionId) {
        if let Some(connection) = self.registry.remove(id) {
            connection.close();
            debug!(conn_id = %id, "connection unregistered");
            self.record_active();
        }
    }

    fn subscribe(&mut self, id: &ConnectionId, group: GroupId) {
        if let Some(connection) = self.registry.get_mut(id) {
            let added = connection.subscribe(group.clone());
            debug!(conn_id = %id, group = %group, added, "subscribed");
        }
    }

    fn unsubscribe(&mut self, id: &ConnectionId, group: &GroupId) {
        if let Some(connection) = self.registry.get_mut(id) {
            let removed = connection.unsubscribe(group);
            debug!(conn_id = %id, group = %group, removed, "unsubscribed");
        }
    }

    fn dispatch(&mut self, event: &Event) {
        let message = Arc::new(ServerMessage::from_event(event));
        let scope = event.scope();
        let mut delivered = 0_u64;
        let mut evicted = Vec::new();

        for connection in self.registry.iter().filter(|c| c.accepts(scope)) {
            match connection.try_deliver(Arc::clone(&message)) {
                Delivery::Queued => delivered += 1,
                outcome @ (Delivery::Full | Delivery::Closed) => {
                    evicted.push((connection.id().clone(), outcome));
                }
            }
        }

        for (id, outcome) in evicted {
            if let Some(connection) = self.registry.remove(&id) {
                if outcome == Delivery::Full {
                    warn!(
                        conn_id = %id,
                        user_id = %connection.user_id(),
                        "outbound queue full, disconnecting slow client"
                    );
                } else {
                    debug!(conn_id = %id, "outbound queue closed, removing connection");
                }
                counter!(HUB_OVERFLOW_DISCONNECTS_TOTAL).increment(1);
                connection.close();
            }
        }
        self.record_active();

        self.events_dispatched += 1;
        counter!(HUB_EVENTS_TOTAL, "type" => event.event_type().to_owned()).increment(1);
        counter!(HUB_DELIVERIES_TOTAL).increment(delivered);
        debug!(
            event_type = event.event_type(),
            scope = ?scope,
            recipients = delivered,
            "event dispatched"
        );
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.len(),
            users: self.registry.user_count(),
            events_dispatched: self.events_dispatched,
        }
    }

    fn record_active(&self) {
        #[allow(clippy::cast_precision_loss)]
        gauge!(WS_CONNECTIONS_ACTIVE).set(self.registry.len() as f64);
    }

    fn close_all(&mut self) {
        let count = self.registry.len();
        for connection in self.registry.drain() {
            connection.close();
        }
        self.record_active();
        info!(closed = count, "hub router stopped");
    }
}

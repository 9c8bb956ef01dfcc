//! Connection lifecycle from upgrade to teardown.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocket;
use futures::StreamExt;
use metrics::{counter, histogram};
use taskhub_core::{GroupId, ServerMessage, UserId};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::Disconnect;
use super::reader::{self, ReaderContext};
use super::writer::{self, WriterSignals};
use crate::config::SessionConfig;
use crate::hub::{Connection, Delivery, Hub};
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Serve one authenticated client until it disconnects.
///
/// 1. Registers the connection and queues the `connected` greeting
/// 2. Spawns the writer; runs the reader inline
/// 3. Whichever side ends first tears down the other
/// 4. Unregisters and waits (bounded) for the writer to flush and close
pub async fn run_session(
    socket: WebSocket,
    hub: Hub,
    user_id: UserId,
    groups: Vec<GroupId>,
    config: SessionConfig,
) -> Disconnect {
    let (connection, outbound_rx) =
        Connection::new(user_id.clone(), groups, config.outbound_capacity);
    let span = info_span!("ws_session", conn_id = %connection.id(), user_id = %user_id);
    serve(socket, hub, connection, outbound_rx, config)
        .instrument(span)
        .await
}

async fn serve(
    socket: WebSocket,
    hub: Hub,
    connection: Connection,
    outbound_rx: tokio::sync::mpsc::Receiver<Arc<ServerMessage>>,
    config: SessionConfig,
) -> Disconnect {
    let started = Instant::now();
    let id = connection.id().clone();
    let sender = connection.sender();
    let closed = connection.close_token();

    let greeting = ServerMessage::connected(&id, connection.user_id(), &connection.groups());
    if connection.try_deliver(Arc::new(greeting)) != Delivery::Queued {
        warn!("could not queue connected greeting");
    }
    hub.register(connection);
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!("client connected");

    let (sink, stream) = socket.split();
    let signals = WriterSignals {
        closed: closed.clone(),
        going_away: hub.shutdown_token(),
    };
    let writer_config = config.clone();
    let mut writer = tokio::spawn(
        async move { writer::run(sink, outbound_rx, signals, &writer_config).await }
            .in_current_span(),
    );

    let ctx = ReaderContext {
        hub: &hub,
        id: &id,
        outbound: &sender,
        config: &config,
    };
    let (reason, writer_done) = tokio::select! {
        reason = reader::run(stream, ctx) => (reason, false),
        joined = &mut writer => (writer_outcome(joined), true),
    };

    hub.unregister(&id);
    closed.cancel();

    if !writer_done {
        match tokio::time::timeout(config.write_timeout, &mut writer).await {
            Ok(joined) => {
                let writer_reason = writer_outcome(joined);
                debug!(writer = %writer_reason, "writer finished");
            }
            Err(_) => {
                warn!("writer did not finish in time, aborting");
                writer.abort();
            }
        }
    }

    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    info!(reason = %reason, "client disconnected");
    reason
}

fn writer_outcome(joined: Result<Disconnect, tokio::task::JoinError>) -> Disconnect {
    match joined {
        Ok(reason) => reason,
        Err(e) => {
            error!(error = %e, "writer task failed");
            Disconnect::WriterFailed
        }
    }
}

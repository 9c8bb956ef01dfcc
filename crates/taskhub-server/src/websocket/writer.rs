//! Outbound pump: the only task that writes to (and closes) the transport.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, close_code};
use futures::{Sink, SinkExt};
use taskhub_core::ServerMessage;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Disconnect;
use crate::config::SessionConfig;

/// Signals the writer watches.
#[derive(Clone, Debug)]
pub struct WriterSignals {
    /// Cancelled when this connection is closed.
    pub closed: CancellationToken,
    /// Cancelled when the whole server is shutting down.
    pub going_away: CancellationToken,
}

/// Forward queued messages and keepalive pings until the connection closes
/// or the transport fails.
pub async fn run<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Arc<ServerMessage>>,
    signals: WriterSignals,
    config: &SessionConfig,
) -> Disconnect
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ping = tokio::time::interval(config.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            () = signals.closed.cancelled() => {
                return finish(&mut sink, &mut outbound, &signals, config).await;
            }
            message = outbound.recv() => {
                let Some(message) = message else {
                    return finish(&mut sink, &mut outbound, &signals, config).await;
                };
                if let Err(reason) = write_message(&mut sink, &message, config.write_timeout).await {
                    return reason;
                }
            }
            _ = ping.tick() => {
                if let Err(reason) =
                    write_frame(&mut sink, Message::Ping(Bytes::new()), config.write_timeout).await
                {
                    return reason;
                }
            }
        }
    }
}

/// Flush what is already buffered, send a close frame, and close the sink.
async fn finish<S>(
    sink: &mut S,
    outbound: &mut mpsc::Receiver<Arc<ServerMessage>>,
    signals: &WriterSignals,
    config: &SessionConfig,
) -> Disconnect
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    outbound.close();
    while let Ok(message) = outbound.try_recv() {
        if let Err(reason) = write_message(sink, &message, config.write_timeout).await {
            return reason;
        }
    }

    let code = if signals.going_away.is_cancelled() {
        close_code::AWAY
    } else {
        close_code::NORMAL
    };
    let frame = Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(""),
    }));
    if let Err(reason) = write_frame(sink, frame, config.write_timeout).await {
        return reason;
    }
    // The peer may already be gone; the close frame has been attempted.
    let _ = tokio::time::timeout(config.write_timeout, sink.close()).await;
    debug!(code, "writer closed transport");
    Disconnect::Closed
}

async fn write_message<S>(
    sink: &mut S,
    message: &ServerMessage,
    deadline: Duration,
) -> Result<(), Disconnect>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match message.to_json() {
        Ok(json) => write_frame(sink, Message::Text(json.into()), deadline).await,
        Err(e) => {
            warn!(message_type = %message.message_type, error = %e, "failed to serialize message, dropping");
            Ok(())
        }
    }
}

async fn write_frame<S>(sink: &mut S, frame: Message, deadline: Duration) -> Result<(), Disconnect>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    match tokio::time::timeout(deadline, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Disconnect::Transport(e.to_string())),
        Err(_) => Err(Disconnect::Transport(format!(
            "write timed out after {deadline:?}"
        ))),
    }
}

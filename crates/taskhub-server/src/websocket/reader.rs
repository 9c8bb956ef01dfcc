//! Inbound pump: reads client frames and applies control messages.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Stream, StreamExt};
use taskhub_core::{ClientMessage, ConnectionId, ServerMessage};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::Disconnect;
use crate::config::SessionConfig;
use crate::hub::Hub;

/// What the reader needs from its session.
#[derive(Clone, Copy, Debug)]
pub struct ReaderContext<'a> {
    /// Hub for membership changes.
    pub hub: &'a Hub,
    /// This connection.
    pub id: &'a ConnectionId,
    /// This connection's outbound queue, for `pong` replies.
    pub outbound: &'a mpsc::Sender<Arc<ServerMessage>>,
    /// Limits.
    pub config: &'a SessionConfig,
}

/// Read until the client leaves, goes silent, misbehaves, or the transport fails.
pub async fn run<St, E>(mut stream: St, ctx: ReaderContext<'_>) -> Disconnect
where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let frame = match tokio::time::timeout(ctx.config.read_timeout, stream.next()).await {
            Err(_) => return Disconnect::ReadTimeout,
            Ok(None) => return Disconnect::ClientClosed,
            Ok(Some(Err(e))) => return Disconnect::Transport(e.to_string()),
            Ok(Some(Ok(frame))) => frame,
        };

        let outcome = match frame {
            Message::Text(text) => handle_text(text.as_str(), &ctx),
            Message::Binary(data) => {
                if data.len() > ctx.config.max_message_size {
                    Err(Disconnect::Oversized { size: data.len() })
                } else if let Ok(text) = std::str::from_utf8(&data) {
                    handle_text(text, &ctx)
                } else {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    Ok(())
                }
            }
            Message::Close(frame) => {
                debug!(?frame, "client sent close frame");
                return Disconnect::ClientClosed;
            }
            Message::Ping(_) | Message::Pong(_) => Ok(()),
        };
        if let Err(reason) = outcome {
            return reason;
        }
    }
}

fn handle_text(text: &str, ctx: &ReaderContext<'_>) -> Result<(), Disconnect> {
    if text.len() > ctx.config.max_message_size {
        return Err(Disconnect::Oversized { size: text.len() });
    }

    match ClientMessage::parse(text) {
        Ok(message) => {
            debug!(message_type = message.name(), "control message");
            apply(message, ctx)
        }
        Err(e) => {
            warn!(error = %e, "ignoring malformed client message");
            Ok(())
        }
    }
}

fn apply(message: ClientMessage, ctx: &ReaderContext<'_>) -> Result<(), Disconnect> {
    match message {
        ClientMessage::Ping => match ctx.outbound.try_send(Arc::new(ServerMessage::pong())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Disconnect::Overflow),
            Err(TrySendError::Closed(_)) => Err(Disconnect::Closed),
        },
        ClientMessage::Subscribe(group) => {
            ctx.hub.subscribe(ctx.id, group);
            Ok(())
        }
        ClientMessage::Unsubscribe(group) => {
            ctx.hub.unsubscribe(ctx.id, group);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Connection;
    use futures::stream;
    use serde_json::json;
    use std::time::Duration;
    use taskhub_core::{Event, GroupId, UserId};
    use tokio_util::sync::CancellationToken;

    type Frames = Vec<Result<Message, std::io::Error>>;

    fn text(s: &str) -> Result<Message, std::io::Error> {
        Ok(Message::Text(s.to_owned().into()))
    }

    struct Fixture {
        hub: Hub,
        id: ConnectionId,
        sender: mpsc::Sender<Arc<ServerMessage>>,
        rx: mpsc::Receiver<Arc<ServerMessage>>,
        config: SessionConfig,
    }

    impl Fixture {
        fn new(capacity: usize) -> Self {
            let (hub, _task) = Hub::spawn(CancellationToken::new());
            let (conn, rx) = Connection::new(UserId::from("alice"), Vec::new(), capacity);
            let id = conn.id().clone();
            let sender = conn.sender();
            hub.register(conn);
            Self {
                hub,
                id,
                sender,
                rx,
                config: SessionConfig {
                    read_timeout: Duration::from_secs(5),
                    ..SessionConfig::default()
                },
            }
        }

        async fn read(&self, frames: Frames) -> Disconnect {
            let ctx = ReaderContext {
                hub: &self.hub,
                id: &self.id,
                outbound: &self.sender,
                config: &self.config,
            };
            run(stream::iter(frames), ctx).await
        }
    }

    #[tokio::test]
    async fn stream_end_is_client_closed() {
        let fx = Fixture::new(8);
        assert_eq!(fx.read(vec![]).await, Disconnect::ClientClosed);
    }

    #[tokio::test]
    async fn close_frame_is_client_closed() {
        let fx = Fixture::new(8);
        let reason = fx.read(vec![Ok(Message::Close(None)), text(r#"{"type":"ping"}"#)]).await;
        assert_eq!(reason, Disconnect::ClientClosed);
    }

    #[tokio::test]
    async fn ping_enqueues_pong() {
        let mut fx = Fixture::new(8);
        let _ = fx.read(vec![text(r#"{"type":"ping"}"#)]).await;
        assert_eq!(fx.rx.try_recv().unwrap().message_type, "pong");
    }

    #[tokio::test]
    async fn pong_on_full_queue_is_overflow() {
        let fx = Fixture::new(1);
        let reason = fx
            .read(vec![text(r#"{"type":"ping"}"#), text(r#"{"type":"ping"}"#)])
            .await;
        assert_eq!(reason, Disconnect::Overflow);
    }

    #[tokio::test]
    async fn oversized_text_is_fatal() {
        let fx = Fixture::new(8);
        let big = format!(r#"{{"type":"ping","payload":"{}"}}"#, "x".repeat(600));
        let reason = fx.read(vec![text(&big), text(r#"{"type":"ping"}"#)]).await;
        assert_eq!(reason, Disconnect::Oversized { size: big.len() });
    }

    #[tokio::test]
    async fn malformed_messages_are_ignored() {
        let mut fx = Fixture::new(8);
        let reason = fx
            .read(vec![
                text("not json"),
                text(r#"{"type":"dance"}"#),
                text(r#"{"type":"subscribe"}"#),
                text(r#"{"type":"ping"}"#),
            ])
            .await;
        assert_eq!(reason, Disconnect::ClientClosed);
        assert_eq!(fx.rx.try_recv().unwrap().message_type, "pong");
    }

    #[tokio::test]
    async fn binary_utf8_is_treated_as_text() {
        let mut fx = Fixture::new(8);
        let frame = Ok(Message::Binary(br#"{"type":"ping"}"#.to_vec().into()));
        let _ = fx.read(vec![frame]).await;
        assert_eq!(fx.rx.try_recv().unwrap().message_type, "pong");
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe_reach_the_hub() {
        let mut fx = Fixture::new(8);
        let _ = fx
            .read(vec![text(r#"{"type":"subscribe","payload":{"group_id":"team1"}}"#)])
            .await;
        fx.hub.broadcast(Event::custom("first", json!({})).for_group("team1"));

        let _ = fx
            .read(vec![text(r#"{"type":"unsubscribe","payload":{"group_id":"team1"}}"#)])
            .await;
        fx.hub.broadcast(Event::custom("second", json!({})).for_group(GroupId::from("team1")));
        let _ = fx.hub.connection_count().await;

        assert_eq!(fx.rx.try_recv().unwrap().message_type, "first");
        assert!(fx.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn transport_error_ends_reader() {
        let fx = Fixture::new(8);
        let reason = fx
            .read(vec![Err(std::io::Error::other("connection reset"))])
            .await;
        assert_eq!(reason, Disconnect::Transport("connection reset".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn silence_hits_read_timeout() {
        let fx = Fixture::new(8);
        let ctx = ReaderContext {
            hub: &fx.hub,
            id: &fx.id,
            outbound: &fx.sender,
            config: &fx.config,
        };
        let reason = run(stream::pending::<Result<Message, std::io::Error>>(), ctx).await;
        assert_eq!(reason, Disconnect::ReadTimeout);
    }
}

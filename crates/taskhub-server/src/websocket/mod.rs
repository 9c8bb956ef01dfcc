//! Per-connection WebSocket handling.
//!
//! Each client gets a writer task that owns the sink and a reader loop that
//! owns the stream. Either side ending tears down the whole connection.

pub mod reader;
pub mod session;
pub mod writer;

use std::fmt;

/// Why a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disconnect {
    /// The client sent a close frame or the stream ended.
    ClientClosed,
    /// No inbound frame arrived within the read deadline.
    ReadTimeout,
    /// An inbound message exceeded the size limit.
    Oversized {
        /// Size of the offending message in bytes.
        size: usize,
    },
    /// The connection's own outbound queue was full.
    Overflow,
    /// The hub closed the connection (unregistered, slow consumer, or shutdown).
    Closed,
    /// Reading or writing the transport failed.
    Transport(String),
    /// The writer task panicked or was aborted.
    WriterFailed,
}

impl Disconnect {
    /// Short label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::ReadTimeout => "read_timeout",
            Self::Oversized { .. } => "oversized",
            Self::Overflow => "overflow",
            Self::Closed => "closed",
            Self::Transport(_) => "transport",
            Self::WriterFailed => "writer_failed",
        }
    }
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oversized { size } => write!(f, "oversized message ({size} bytes)"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_snake_case() {
        let all = [
            Disconnect::ClientClosed,
            Disconnect::ReadTimeout,
            Disconnect::Oversized { size: 1 },
            Disconnect::Overflow,
            Disconnect::Closed,
            Disconnect::Transport("x".into()),
            Disconnect::WriterFailed,
        ];
        for reason in all {
            assert!(reason.as_str().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }

    #[test]
    fn display_includes_detail() {
        assert_eq!(
            Disconnect::Oversized { size: 900 }.to_string(),
            "oversized message (900 bytes)"
        );
        assert_eq!(
            Disconnect::Transport("reset".into()).to_string(),
            "transport error: reset"
        );
        assert_eq!(Disconnect::ReadTimeout.to_string(), "read_timeout");
    }
}

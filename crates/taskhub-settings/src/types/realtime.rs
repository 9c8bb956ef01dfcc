//! Hub and WebSocket session tuning.

use serde::{Deserialize, Serialize};

/// Liveness and backpressure limits for client connections.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RealtimeSettings {
    /// Interval between server-initiated ping frames.
    pub ping_interval_secs: u64,
    /// A connection with no inbound frame for this long is dropped.
    pub read_timeout_secs: u64,
    /// Deadline for a single outbound frame write.
    pub write_timeout_secs: u64,
    /// Largest accepted inbound text frame, in bytes.
    pub max_message_bytes: usize,
    /// Per-connection outbound queue depth.
    pub outbound_capacity: usize,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            read_timeout_secs: 60,
            write_timeout_secs: 10,
            max_message_bytes: 512,
            outbound_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_override_keeps_defaults() {
        let s: RealtimeSettings = serde_json::from_str(r#"{"outboundCapacity":8}"#).unwrap();
        assert_eq!(s.outbound_capacity, 8);
        assert_eq!(s.ping_interval_secs, 30);
        assert_eq!(s.write_timeout_secs, 10);
    }
}

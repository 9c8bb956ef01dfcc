//! Server configuration.

use std::time::Duration;

use taskhub_settings::TaskhubSettings;

/// Configuration for the taskhub server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Per-connection limits.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &TaskhubSettings) -> Self {
        let rt = &settings.realtime;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            session: SessionConfig {
                ping_interval: Duration::from_secs(rt.ping_interval_secs),
                read_timeout: Duration::from_secs(rt.read_timeout_secs),
                write_timeout: Duration::from_secs(rt.write_timeout_secs),
                max_message_size: rt.max_message_bytes,
                outbound_capacity: rt.outbound_capacity,
            },
        }
    }
}

/// Liveness and backpressure limits applied to every connection.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Interval between server-initiated ping frames.
    pub ping_interval: Duration,
    /// Maximum silence from the client before the connection is dropped.
    pub read_timeout: Duration,
    /// Deadline for writing one outbound frame.
    pub write_timeout: Duration,
    /// Largest accepted inbound message, in bytes.
    pub max_message_size: usize,
    /// Depth of the per-connection outbound queue.
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            max_message_size: 512,
            outbound_capacity: 256,
        }
    }
}

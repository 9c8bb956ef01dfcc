//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may contain any subset of fields; missing ones keep their defaults.

mod realtime;
mod server;

pub use realtime::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "realtime": { "pingIntervalSecs": 15, "readTimeoutSecs": 40 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskhubSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Real-time hub and WebSocket session settings.
    pub realtime: RealtimeSettings,
    /// Token validation settings.
    pub auth: AuthSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for TaskhubSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "taskhub".to_string(),
            server: ServerSettings::default(),
            realtime: RealtimeSettings::default(),
            auth: AuthSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl TaskhubSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let rt = &self.realtime;
        if rt.ping_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "realtime.pingIntervalSecs must be > 0".into(),
            ));
        }
        if rt.read_timeout_secs <= rt.ping_interval_secs {
            return Err(SettingsError::InvalidValue(format!(
                "realtime.readTimeoutSecs ({}) must exceed pingIntervalSecs ({})",
                rt.read_timeout_secs, rt.ping_interval_secs
            )));
        }
        if rt.outbound_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "realtime.outboundCapacity must be > 0".into(),
            ));
        }
        if rt.max_message_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "realtime.maxMessageBytes must be > 0".into(),
            ));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(SettingsError::InvalidValue("auth.jwtSecret is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_timeout_must_exceed_ping_interval() {
        let mut settings = TaskhubSettings::default();
        settings.realtime.read_timeout_secs = settings.realtime.ping_interval_secs;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("readTimeoutSecs"));
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut settings = TaskhubSettings::default();
        settings.realtime.outbound_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_secret_rejected() {
        let mut settings = TaskhubSettings::default();
        settings.auth.jwt_secret.clear();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn camel_case_serialization() {
        let value = serde_json::to_value(TaskhubSettings::default()).unwrap();
        assert!(value["realtime"]["pingIntervalSecs"].is_number());
        assert!(value["auth"]["jwtSecret"].is_string());
    }
}

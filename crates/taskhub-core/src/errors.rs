//! Error types for inbound control messages.
//!
//! Every variant is recoverable: the session logs it and keeps the
//! connection open.

use thiserror::Error;

/// A client control message that could not be interpreted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or lacked a string `type` field.
    #[error("invalid JSON control message: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// The `type` tag is not a known control message.
    #[error("unknown message type: {0}")]
    UnknownType(String),
    /// The `type` tag is known but its payload is missing or malformed.
    #[error("invalid payload for '{message_type}': {reason}")]
    InvalidPayload {
        /// Control message type.
        message_type: String,
        /// What was wrong with the payload.
        reason: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_display() {
        let err = ProtocolError::UnknownType("dance".into());
        assert_eq!(err.to_string(), "unknown message type: dance");
    }

    #[test]
    fn invalid_payload_display() {
        let err = ProtocolError::InvalidPayload {
            message_type: "subscribe".into(),
            reason: "missing group_id".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid payload for 'subscribe': missing group_id"
        );
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }
}

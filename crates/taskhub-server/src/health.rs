//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use crate::hub::HubStats;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered WebSocket connections.
    pub connections: usize,
    /// Distinct users with at least one connection.
    pub users: usize,
}

/// Build a health response from hub counters.
pub fn health_check(start_time: Instant, stats: &HubStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: stats.connections,
        users: stats.users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(connections: usize, users: usize) -> HubStats {
        HubStats {
            connections,
            users,
            events_dispatched: 0,
        }
    }

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), &stats(0, 0));
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, &stats(0, 0));
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), &stats(3, 2));
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 3);
        assert_eq!(parsed["users"], 2);
        assert!(parsed["uptime_secs"].is_number());
    }
}

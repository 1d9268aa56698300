//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

use relay_core::FeatureBits;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Features currently subscribed by at least one connection.
    pub active_features: String,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    active_features: FeatureBits,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        active_features: active_features.describe(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::Feature;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, FeatureBits::NONE);
        assert_eq!(resp.status, "ok");
    }

    #[test]
    fn uptime_starts_at_zero() {
        let resp = health_check(Instant::now(), 0, FeatureBits::NONE);
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn reports_connection_count() {
        let resp = health_check(Instant::now(), 7, FeatureBits::NONE);
        assert_eq!(resp.connections, 7);
    }

    #[test]
    fn reports_active_features() {
        let bits = FeatureBits::NONE.with(Feature::Counter);
        let resp = health_check(Instant::now(), 1, bits);
        assert_eq!(resp.active_features, "COUNTER");
    }
}

//! Fixed waits inserted between network operations.
//!
//! Nodes behind load balancers and block explorers lag behind the node that accepted a
//! transaction. Every wait is named after the operation it follows so a network with
//! faster propagation can tune each one independently.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default wait after a broadcast transaction is included.
pub const DEFAULT_AFTER_BROADCAST_MS: u64 = 5000;

/// Default wait after attaching to an existing contract.
pub const DEFAULT_AFTER_ATTACH_MS: u64 = 100;

/// Default wait after a read call used as an argument.
pub const DEFAULT_AFTER_READ_MS: u64 = 5000;

/// Default wait between two verification requests.
pub const DEFAULT_AFTER_VERIFICATION_MS: u64 = 1000;

/// Pacing delays in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// After a deploy or wiring transaction is included, before the next read or broadcast.
    pub after_broadcast_ms: u64,
    /// After attaching to an already deployed contract.
    pub after_attach_ms: u64,
    /// After a read-only call whose result feeds a later argument.
    pub after_read_ms: u64,
    /// After each verification request, to respect the service's rate limit.
    pub after_verification_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            after_broadcast_ms: DEFAULT_AFTER_BROADCAST_MS,
            after_attach_ms: DEFAULT_AFTER_ATTACH_MS,
            after_read_ms: DEFAULT_AFTER_READ_MS,
            after_verification_ms: DEFAULT_AFTER_VERIFICATION_MS,
        }
    }
}

impl Pacing {
    /// No waits at all. For local development chains and tests.
    pub fn none() -> Self {
        Self {
            after_broadcast_ms: 0,
            after_attach_ms: 0,
            after_read_ms: 0,
            after_verification_ms: 0,
        }
    }

    /// Let a freshly included transaction propagate to other nodes and indexers.
    pub async fn after_broadcast(&self, step: &str) {
        wait("broadcast propagation", self.after_broadcast_ms, step).await
    }

    pub async fn after_attach(&self, step: &str) {
        wait("attach", self.after_attach_ms, step).await
    }

    pub async fn after_read(&self, step: &str) {
        wait("read propagation", self.after_read_ms, step).await
    }

    /// Respect the verification service's rate limit.
    pub async fn after_verification(&self, step: &str) {
        wait("verification rate limit", self.after_verification_ms, step).await
    }
}

async fn wait(reason: &'static str, ms: u64, step: &str) {
    if ms == 0 {
        return;
    }

    tracing::debug!(reason, step, wait_ms = ms, "Pacing");
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let pacing = Pacing::default();
        assert_eq!(pacing.after_broadcast_ms, 5000);
        assert_eq!(pacing.after_attach_ms, 100);
        assert_eq!(pacing.after_read_ms, 5000);
        assert_eq!(pacing.after_verification_ms, 1000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let pacing: Pacing = toml::from_str("after_broadcast_ms = 250").unwrap();
        assert_eq!(pacing.after_broadcast_ms, 250);
        assert_eq!(pacing.after_attach_ms, DEFAULT_AFTER_ATTACH_MS);
        assert_eq!(pacing.after_verification_ms, DEFAULT_AFTER_VERIFICATION_MS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_use_configured_duration() {
        let pacing = Pacing {
            after_broadcast_ms: 5000,
            ..Pacing::none()
        };

        let start = tokio::time::Instant::now();
        pacing.after_broadcast("contract `A`").await;
        assert!(start.elapsed() >= Duration::from_millis(5000));

        let start = tokio::time::Instant::now();
        pacing.after_attach("contract `A`").await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

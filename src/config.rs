//! Gateway runtime configuration: queue depths, timeouts, worker counts,
//! and size caps. Space-policy/capability loading is out of scope (§B) —
//! this only configures the engine around it.
//!
//! Mirrors `message_router::config::RouterConfig` in shape almost exactly:
//! `development()`/`production()`/`testing()` presets, a validating
//! builder, and JSON load/save.

#![allow(clippy::missing_errors_doc, clippy::return_self_not_must_use)]

use crate::domain::{
    EnvelopesPerSecond, HeartbeatIntervalMs, MaxEnvelopeBytes, MaxMissedPongs, PauseQueueDepth,
    ProposalTimeoutMs, QueueDepth, RequestTimeoutMs, StreamIdleTimeoutMs,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Complete gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct GatewayConfig {
    // Connection / transport
    /// The socket address the gateway's WebSocket server binds to.
    pub bind_addr: SocketAddr,
    /// Depth of each per-participant outbound delivery queue (§4.3/§5).
    pub outbound_queue_size: QueueDepth,
    /// Depth of each participant's inbound router queue.
    pub inbound_queue_size: QueueDepth,
    /// Depth of the bounded pause-delivery queue (§4.9, open question 2).
    pub pause_queue_size: PauseQueueDepth,
    /// Interval between heartbeat pings.
    pub heartbeat_interval_ms: HeartbeatIntervalMs,
    /// Consecutive missed pongs before disconnect.
    pub max_missed_pongs: MaxMissedPongs,
    /// Maximum accepted serialized envelope size.
    pub max_envelope_bytes: MaxEnvelopeBytes,
    /// How many recent envelope ids each connection remembers to reject
    /// duplicates within its lifetime (§4.1).
    pub duplicate_id_window_size: usize,

    // Router
    /// Number of router worker tasks draining the inbound queue.
    pub worker_thread_count: usize,

    // Correlation & Proposal Engine
    /// How long a client-side pending request/proposal waits before timing out.
    pub request_timeout_ms: RequestTimeoutMs,
    /// How long a proposal stays open before being auto-rejected.
    pub proposal_timeout_ms: ProposalTimeoutMs,

    // Stream Channel Manager
    /// Idle period after which an inactive stream is force-closed.
    pub stream_idle_timeout_ms: StreamIdleTimeoutMs,

    // Rate limiting (§C.4)
    /// Whether ingress rate limiting is enforced.
    pub enable_rate_limiting: bool,
    /// Per-connection ingress rate limit.
    pub rate_limit_envelopes_per_second: EnvelopesPerSecond,

    // Observability
    /// Whether the `MetricsCollector` records counters.
    pub enable_metrics: bool,
    /// Whether `tracing` emits `debug`-level spans in addition to `info`.
    pub enable_detailed_logs: bool,
}

impl GatewayConfig {
    /// Settings tuned for local development: small queues, verbose logs,
    /// short timeouts for fast feedback.
    ///
    /// # Panics
    /// Panics if any hardcoded value is out of range for its domain type.
    #[must_use]
    pub fn development() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            outbound_queue_size: QueueDepth::try_new(64).unwrap(),
            inbound_queue_size: QueueDepth::try_new(1_000).unwrap(),
            pause_queue_size: PauseQueueDepth::try_new(32).unwrap(),
            heartbeat_interval_ms: HeartbeatIntervalMs::try_new(10_000).unwrap(),
            max_missed_pongs: MaxMissedPongs::try_new(3).unwrap(),
            max_envelope_bytes: MaxEnvelopeBytes::try_new(1_048_576).unwrap(),
            duplicate_id_window_size: 256,
            worker_thread_count: 2,
            request_timeout_ms: RequestTimeoutMs::try_new(10_000).unwrap(),
            proposal_timeout_ms: ProposalTimeoutMs::try_new(60_000).unwrap(),
            stream_idle_timeout_ms: StreamIdleTimeoutMs::try_new(30_000).unwrap(),
            enable_rate_limiting: false,
            rate_limit_envelopes_per_second: EnvelopesPerSecond::try_new(1_000).unwrap(),
            enable_metrics: true,
            enable_detailed_logs: true,
        }
    }

    /// Settings tuned for production: larger queues, sampled logging,
    /// stricter rate limiting.
    ///
    /// # Panics
    /// Panics if any hardcoded value is out of range for its domain type.
    #[must_use]
    pub fn production() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            outbound_queue_size: QueueDepth::try_new(1_024).unwrap(),
            inbound_queue_size: QueueDepth::try_new(100_000).unwrap(),
            pause_queue_size: PauseQueueDepth::try_new(256).unwrap(),
            heartbeat_interval_ms: HeartbeatIntervalMs::try_new(30_000).unwrap(),
            max_missed_pongs: MaxMissedPongs::try_new(3).unwrap(),
            max_envelope_bytes: MaxEnvelopeBytes::try_new(4_194_304).unwrap(),
            duplicate_id_window_size: 4_096,
            worker_thread_count: 8,
            request_timeout_ms: RequestTimeoutMs::try_new(30_000).unwrap(),
            proposal_timeout_ms: ProposalTimeoutMs::try_new(300_000).unwrap(),
            stream_idle_timeout_ms: StreamIdleTimeoutMs::try_new(60_000).unwrap(),
            enable_rate_limiting: true,
            rate_limit_envelopes_per_second: EnvelopesPerSecond::try_new(200).unwrap(),
            enable_metrics: true,
            enable_detailed_logs: false,
        }
    }

    /// Settings tuned for the integration test suite: minimal queues and
    /// timeouts so tests run fast and deterministically.
    ///
    /// # Panics
    /// Panics if any hardcoded value is out of range for its domain type.
    #[must_use]
    pub fn testing() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            outbound_queue_size: QueueDepth::try_new(16).unwrap(),
            inbound_queue_size: QueueDepth::try_new(256).unwrap(),
            pause_queue_size: PauseQueueDepth::try_new(8).unwrap(),
            heartbeat_interval_ms: HeartbeatIntervalMs::try_new(1_000).unwrap(),
            max_missed_pongs: MaxMissedPongs::try_new(2).unwrap(),
            max_envelope_bytes: MaxEnvelopeBytes::try_new(65_536).unwrap(),
            duplicate_id_window_size: 32,
            worker_thread_count: 1,
            request_timeout_ms: RequestTimeoutMs::try_new(500).unwrap(),
            proposal_timeout_ms: ProposalTimeoutMs::try_new(2_000).unwrap(),
            stream_idle_timeout_ms: StreamIdleTimeoutMs::try_new(1_000).unwrap(),
            enable_rate_limiting: false,
            rate_limit_envelopes_per_second: EnvelopesPerSecond::try_new(10_000).unwrap(),
            enable_metrics: false,
            enable_detailed_logs: false,
        }
    }

    /// Starts a builder seeded with development defaults.
    #[must_use]
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::new()
    }

    /// Cross-field consistency checks beyond each field's own `nutype`
    /// validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_thread_count == 0 || self.worker_thread_count > num_cpus::get() * 2 {
            return Err(ConfigError::InvalidField {
                field: "worker_thread_count".to_string(),
                reason: format!(
                    "must be between 1 and 2x CPU cores ({})",
                    num_cpus::get() * 2
                ),
            });
        }

        if self.request_timeout_ms.as_duration() >= self.proposal_timeout_ms.as_duration() {
            return Err(ConfigError::Inconsistent {
                reason: "request_timeout_ms should be shorter than proposal_timeout_ms"
                    .to_string(),
            });
        }

        if self.enable_rate_limiting && self.rate_limit_envelopes_per_second.into_inner() == 0 {
            return Err(ConfigError::Inconsistent {
                reason: "rate_limit_envelopes_per_second must be nonzero when rate limiting is enabled"
                    .to_string(),
            });
        }

        if self.pause_queue_size.as_usize() > self.outbound_queue_size.as_usize() * 100 {
            return Err(ConfigError::Inconsistent {
                reason: "pause_queue_size is implausibly large relative to outbound_queue_size"
                    .to_string(),
            });
        }

        if self.duplicate_id_window_size == 0 {
            return Err(ConfigError::InvalidField {
                field: "duplicate_id_window_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reads and validates a configuration from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::development()
    }
}

/// Fluent builder for a custom [`GatewayConfig`], starting from development
/// defaults.
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Starts from development defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::development(),
        }
    }

    /// Sets the socket address the WebSocket server binds to.
    #[must_use]
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    /// Sets the per-participant outbound queue depth.
    #[must_use]
    pub fn outbound_queue_size(mut self, size: QueueDepth) -> Self {
        self.config.outbound_queue_size = size;
        self
    }

    /// Sets the router's inbound queue depth.
    #[must_use]
    pub fn inbound_queue_size(mut self, size: QueueDepth) -> Self {
        self.config.inbound_queue_size = size;
        self
    }

    /// Sets the pause-delivery queue depth.
    #[must_use]
    pub fn pause_queue_size(mut self, size: PauseQueueDepth) -> Self {
        self.config.pause_queue_size = size;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval_ms(mut self, interval: HeartbeatIntervalMs) -> Self {
        self.config.heartbeat_interval_ms = interval;
        self
    }

    /// Sets the per-connection duplicate-id window size.
    #[must_use]
    pub fn duplicate_id_window_size(mut self, size: usize) -> Self {
        self.config.duplicate_id_window_size = size;
        self
    }

    /// Sets the number of router worker tasks.
    #[must_use]
    pub fn worker_thread_count(mut self, count: usize) -> Self {
        self.config.worker_thread_count = count;
        self
    }

    /// Sets the client-side request timeout.
    #[must_use]
    pub fn request_timeout_ms(mut self, timeout: RequestTimeoutMs) -> Self {
        self.config.request_timeout_ms = timeout;
        self
    }

    /// Sets the proposal auto-reject timeout.
    #[must_use]
    pub fn proposal_timeout_ms(mut self, timeout: ProposalTimeoutMs) -> Self {
        self.config.proposal_timeout_ms = timeout;
        self
    }

    /// Sets the stream idle-close timeout.
    #[must_use]
    pub fn stream_idle_timeout_ms(mut self, timeout: StreamIdleTimeoutMs) -> Self {
        self.config.stream_idle_timeout_ms = timeout;
        self
    }

    /// Enables or disables ingress rate limiting.
    #[must_use]
    pub fn enable_rate_limiting(mut self, enable: bool) -> Self {
        self.config.enable_rate_limiting = enable;
        self
    }

    /// Sets the per-connection ingress rate limit.
    #[must_use]
    pub fn rate_limit_envelopes_per_second(mut self, rate: EnvelopesPerSecond) -> Self {
        self.config.rate_limit_envelopes_per_second = rate;
        self
    }

    /// Enables or disables the metrics collector.
    #[must_use]
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.config.enable_metrics = enable;
        self
    }

    /// Enables or disables detailed (debug-level) logging.
    #[must_use]
    pub fn enable_detailed_logs(mut self, enable: bool) -> Self {
        self.config.enable_detailed_logs = enable;
        self
    }

    /// Validates and finalizes the configuration.
    pub fn build(self) -> Result<GatewayConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for GatewayConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn development_config_is_valid() {
        assert!(GatewayConfig::development().validate().is_ok());
    }

    #[test]
    fn production_config_is_valid() {
        assert!(GatewayConfig::production().validate().is_ok());
    }

    #[test]
    fn testing_config_is_valid() {
        assert!(GatewayConfig::testing().validate().is_ok());
    }

    #[test]
    fn builder_round_trips_custom_values() {
        let config = GatewayConfig::builder()
            .worker_thread_count(1)
            .enable_rate_limiting(false)
            .build()
            .unwrap();
        assert_eq!(config.worker_thread_count, 1);
        assert!(!config.enable_rate_limiting);
    }

    #[test]
    fn validate_rejects_zero_worker_threads() {
        let config = GatewayConfig::builder().worker_thread_count(0).build();
        assert!(config.is_err());
    }

    #[test]
    fn validate_rejects_request_timeout_not_shorter_than_proposal_timeout() {
        let config = GatewayConfig::builder()
            .request_timeout_ms(RequestTimeoutMs::try_new(100_000).unwrap())
            .proposal_timeout_ms(ProposalTimeoutMs::try_new(60_000).unwrap())
            .build();
        assert!(config.is_err());
    }

    #[test]
    fn file_round_trip_preserves_values() {
        let config = GatewayConfig::development();
        let file = NamedTempFile::new().unwrap();
        config.save_to_file(file.path()).unwrap();
        let loaded = GatewayConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.inbound_queue_size, loaded.inbound_queue_size);
        assert_eq!(config.worker_thread_count, loaded.worker_thread_count);
    }
}

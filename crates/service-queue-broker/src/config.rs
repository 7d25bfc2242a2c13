//! Broker configuration.
//!
//! The on-disk format is a JSON object in which every field is optional:
//!
//! ```json
//! {
//!   "ports": {
//!     "input": "tcp://127.0.0.1:8100",
//!     "output": "tcp://127.0.0.1:8101",
//!     "service": "tcp://127.0.0.1:8102"
//!   },
//!   "heartbeat": { "interval_secs": 30, "timeout_secs": 10, "tick_ms": 1000 },
//!   "poll_timeout_ms": 1000,
//!   "high_water_mark": 1000,
//!   "retry": { "initial_backoff_ms": 1, "max_backoff_ms": 1000, "backoff_multiplier": 2.0 }
//! }
//! ```

use serde::Deserialize;
use service_queue_common::transport::DEFAULT_HIGH_WATER_MARK;
use service_queue_common::{BrokerError, Result};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_INPUT_ENDPOINT: &str = "tcp://127.0.0.1:8100";
pub const DEFAULT_OUTPUT_ENDPOINT: &str = "tcp://127.0.0.1:8101";
pub const DEFAULT_CONTROL_ENDPOINT: &str = "tcp://127.0.0.1:8102";

/// Addresses of the three endpoints the broker binds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PortsConfig {
    /// Producers push tasks here.
    pub input: String,
    /// Tasks are routed to workers here.
    pub output: String,
    /// Workers exchange control messages here.
    pub service: String,
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            input: DEFAULT_INPUT_ENDPOINT.to_string(),
            output: DEFAULT_OUTPUT_ENDPOINT.to_string(),
            service: DEFAULT_CONTROL_ENDPOINT.to_string(),
        }
    }
}

/// Heartbeat configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Seconds between pings to a worker that answered its last ping.
    pub interval_secs: u64,
    /// Seconds a worker has to answer a ping before it is evicted.
    pub timeout_secs: u64,
    /// Milliseconds between heartbeat scans.
    pub tick_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            timeout_secs: 10,
            tick_ms: 1000,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Backoff applied while a worker's outbound queue is full.
///
/// Task forwarding never gives up on a full queue; the backoff only spaces
/// out the attempts. Each wait is `previous * backoff_multiplier`, capped at
/// `max_backoff_ms`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First wait in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for a single wait in milliseconds
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1,
            max_backoff_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Wait to use after waiting `current_ms`.
    pub fn next_backoff(&self, current_ms: u64) -> u64 {
        std::cmp::min(
            (current_ms as f64 * self.backoff_multiplier) as u64,
            self.max_backoff_ms,
        )
    }
}

/// Complete broker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub ports: PortsConfig,
    pub heartbeat: HeartbeatConfig,
    /// Upper bound on how long a loop waits for input before re-checking
    /// the interrupt flag.
    pub poll_timeout_ms: u64,
    /// Per-worker outbound queue length before sends report a full queue.
    pub high_water_mark: usize,
    pub retry: RetryConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            ports: PortsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            poll_timeout_ms: 1000,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            retry: RetryConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Loads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Config` if the file cannot be read, is not valid
    /// JSON for this shape, or fails [`validate`](Self::validate).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            BrokerError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_slice(&data).map_err(|e| {
            BrokerError::Config(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, endpoint) in [
            ("ports.input", &self.ports.input),
            ("ports.output", &self.ports.output),
            ("ports.service", &self.ports.service),
        ] {
            if endpoint.trim().is_empty() {
                return Err(BrokerError::Config(format!("{} must not be empty", name)));
            }
        }

        let nonzero = [
            ("heartbeat.interval_secs", self.heartbeat.interval_secs),
            ("heartbeat.timeout_secs", self.heartbeat.timeout_secs),
            ("heartbeat.tick_ms", self.heartbeat.tick_ms),
            ("poll_timeout_ms", self.poll_timeout_ms),
            ("high_water_mark", self.high_water_mark as u64),
            ("retry.initial_backoff_ms", self.retry.initial_backoff_ms),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(BrokerError::Config(format!("{} must be greater than zero", name)));
            }
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(BrokerError::Config(
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(BrokerError::Config(
                "retry.max_backoff_ms must not be below retry.initial_backoff_ms".to_string(),
            ));
        }

        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

//! Broker counters.
//!
//! Every counter is a relaxed atomic; a [`StatsSnapshot`] is a point-in-time
//! copy suitable for logging or serializing.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Live counters shared by the broker threads.
#[derive(Debug)]
pub struct BrokerStats {
    started_at: Instant,
    tasks_received: AtomicU64,
    tasks_forwarded: AtomicU64,
    tasks_dropped: AtomicU64,
    send_retries: AtomicU64,
    send_failures: AtomicU64,
    pings_sent: AtomicU64,
    pongs_received: AtomicU64,
    evictions: AtomicU64,
    malformed_messages: AtomicU64,
    unknown_actions: AtomicU64,
}

/// Point-in-time copy of [`BrokerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub uptime_ms: u64,
    pub tasks_received: u64,
    pub tasks_forwarded: u64,
    pub tasks_dropped: u64,
    pub send_retries: u64,
    pub send_failures: u64,
    pub pings_sent: u64,
    pub pongs_received: u64,
    pub evictions: u64,
    pub malformed_messages: u64,
    pub unknown_actions: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl BrokerStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            tasks_received: AtomicU64::new(0),
            tasks_forwarded: AtomicU64::new(0),
            tasks_dropped: AtomicU64::new(0),
            send_retries: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            pongs_received: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            malformed_messages: AtomicU64::new(0),
            unknown_actions: AtomicU64::new(0),
        }
    }

    /// A task arrived on the input endpoint.
    pub fn increment_tasks_received(&self) {
        bump(&self.tasks_received);
    }

    /// A task was handed to a worker's outbound queue.
    pub fn increment_tasks_forwarded(&self) {
        bump(&self.tasks_forwarded);
    }

    /// A task was discarded during shutdown.
    pub fn increment_tasks_dropped(&self) {
        bump(&self.tasks_dropped);
    }

    /// A forward attempt hit a full queue and will be retried.
    pub fn increment_send_retries(&self) {
        bump(&self.send_retries);
    }

    /// A forward failed with a non-retryable error.
    pub fn increment_send_failures(&self) {
        bump(&self.send_failures);
    }

    pub fn increment_pings_sent(&self) {
        bump(&self.pings_sent);
    }

    pub fn increment_pongs_received(&self) {
        bump(&self.pongs_received);
    }

    pub fn increment_evictions(&self) {
        bump(&self.evictions);
    }

    pub fn increment_malformed_messages(&self) {
        bump(&self.malformed_messages);
    }

    pub fn increment_unknown_actions(&self) {
        bump(&self.unknown_actions);
    }

    pub fn uptime_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            uptime_ms: self.uptime_ms(),
            tasks_received: load(&self.tasks_received),
            tasks_forwarded: load(&self.tasks_forwarded),
            tasks_dropped: load(&self.tasks_dropped),
            send_retries: load(&self.send_retries),
            send_failures: load(&self.send_failures),
            pings_sent: load(&self.pings_sent),
            pongs_received: load(&self.pongs_received),
            evictions: load(&self.evictions),
            malformed_messages: load(&self.malformed_messages),
            unknown_actions: load(&self.unknown_actions),
        }
    }
}

impl Default for BrokerStats {
    fn default() -> Self {
        Self::new()
    }
}

use service_queue_common::Action;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::HeartbeatConfig;
use crate::context::BrokerContext;
use crate::worker::Liveness;

/// Workers acted on by one heartbeat scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub pinged: Vec<String>,
    pub evicted: Vec<String>,
}

/// Pings idle workers and evicts the ones that stop answering.
pub struct HeartbeatMonitor {
    context: BrokerContext,
    config: HeartbeatConfig,
}

impl HeartbeatMonitor {
    pub fn new(context: BrokerContext, config: HeartbeatConfig) -> Self {
        Self { context, config }
    }

    /// Starts the monitor on a thread named `heartbeat`.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("heartbeat".to_string())
            .spawn(move || self.run())
    }

    fn run(self) {
        info!(
            "Heartbeat monitor started (interval {}s, timeout {}s)",
            self.config.interval_secs, self.config.timeout_secs
        );

        while !self.context.interrupt.is_triggered() {
            self.tick(Instant::now());
            if self.context.interrupt.wait_timeout(self.config.tick()) {
                break;
            }
        }

        info!("Heartbeat monitor finished");
    }

    /// Runs one scan over a snapshot of the registry as of `now`.
    ///
    /// Evictions are applied after the scan, so a pong arriving mid-scan can
    /// still lose the race against an eviction decided from the snapshot.
    pub fn tick(&self, now: Instant) -> TickReport {
        let mut report = TickReport::default();

        for worker in self.context.registry.snapshot() {
            match worker.liveness(now, &self.config) {
                Liveness::Expired => report.evicted.push(worker.id),
                Liveness::PingDue => {
                    self.ping(&worker.id, now);
                    report.pinged.push(worker.id);
                }
                Liveness::Alive | Liveness::AwaitingPong => {}
            }
        }

        report.evicted.retain(|id| self.evict(id));

        report
    }

    fn ping(&self, id: &str, now: Instant) {
        match self.context.link.notify(id, Action::Ping) {
            Ok(()) => {
                self.context.stats.increment_pings_sent();
                debug!("Ping sent to {}", id);
            }
            Err(e) => warn!("Failed to ping worker {}: {}", id, e),
        }
        // Stamped even when the send failed, so an unreachable worker expires
        self.context.registry.record_ping(id, now);
    }

    /// Returns `false` if the worker was already gone, in which case the
    /// thread that removed it sends its `shutdown`.
    fn evict(&self, id: &str) -> bool {
        if !self.context.registry.remove(id) {
            return false;
        }
        warn!(
            "Worker {} did not answer ping within {}s, evicted",
            id, self.config.timeout_secs
        );
        self.context.stats.increment_evictions();
        if let Err(e) = self.context.link.notify(id, Action::Shutdown) {
            debug!("Failed to send shutdown to evicted worker {}: {}", id, e);
        }
        true
    }
}

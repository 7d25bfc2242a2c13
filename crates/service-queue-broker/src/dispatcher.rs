use service_queue_common::transport::{Frame, Inbound, Multipart};
use service_queue_common::{BrokerError, Result};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::RetryConfig;
use crate::context::BrokerContext;

/// Moves tasks from the input endpoint to workers, one worker per task in
/// round-robin order.
pub struct Dispatcher {
    inbound: Box<dyn Inbound>,
    context: BrokerContext,
    poll_timeout: Duration,
    retry: RetryConfig,
}

impl Dispatcher {
    pub fn new(
        inbound: Box<dyn Inbound>,
        context: BrokerContext,
        poll_timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            inbound,
            context,
            poll_timeout,
            retry,
        }
    }

    /// Starts the dispatcher on a thread named `dispatcher`.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || self.run())
    }

    fn run(mut self) {
        info!("Task dispatcher started");

        while !self.context.interrupt.is_triggered() {
            match self.inbound.recv_timeout(self.poll_timeout) {
                Ok(Some(task)) => {
                    if !self.dispatch(task) {
                        break;
                    }
                }
                Ok(None) => {}
                Err(BrokerError::Disconnected) => {
                    warn!("Task input closed");
                    break;
                }
                Err(e) => error!("Failed to receive task: {}", e),
            }
        }

        info!("Task dispatcher finished");
    }

    /// Routes one task to the next worker, waiting for a worker to register
    /// if none is available.
    ///
    /// Returns `false` if the registry was closed while waiting; the task is
    /// dropped in that case.
    pub fn dispatch(&self, task: Multipart) -> bool {
        self.context.stats.increment_tasks_received();

        let Some(worker) = self.context.registry.next() else {
            warn!("Worker registry closed, dropping task");
            self.context.stats.increment_tasks_dropped();
            return false;
        };

        debug!("Forwarding task to {}", worker);
        if let Err(e) = self.deliver(&worker, &task) {
            error!("Failed to forward task to {}: {}", worker, e);
        }
        true
    }

    /// Forwards `task` to `worker`, retrying with backoff for as long as the
    /// worker's queue is full.
    ///
    /// Gives up only on a non-retryable error or when the interrupt is
    /// triggered between attempts. A worker that is registered but has no
    /// task connection fails with `UnknownPeer`; its tasks are counted in
    /// `send_failures` and lost until the heartbeat evicts it.
    pub fn deliver(&self, worker: &str, task: &[Frame]) -> Result<()> {
        let mut backoff_ms = self.retry.initial_backoff_ms;
        let mut retries: u64 = 0;

        loop {
            match self.context.link.forward_task(worker, task) {
                Ok(()) => {
                    self.context.stats.increment_tasks_forwarded();
                    if retries > 0 {
                        debug!("Task delivered to {} after {} retries", worker, retries);
                    }
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    if self.context.interrupt.is_triggered() {
                        warn!("Interrupted while waiting on {}, dropping task", worker);
                        self.context.stats.increment_tasks_dropped();
                        return Err(e);
                    }

                    retries += 1;
                    self.context.stats.increment_send_retries();
                    if retries.is_power_of_two() {
                        warn!(
                            "Queue for {} is full (retry {}), backing off {}ms",
                            worker, retries, backoff_ms
                        );
                    }

                    thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms = self.retry.next_backoff(backoff_ms);
                }
                Err(e) => {
                    self.context.stats.increment_send_failures();
                    return Err(e);
                }
            }
        }
    }
}

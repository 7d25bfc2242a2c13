//! Reference worker.
//!
//! Connects to the broker's output and control endpoints under one identity,
//! registers, and then logs every task it receives. It answers `ping` with
//! `pong` and exits when the broker sends `shutdown`. When interrupted locally
//! it deregisters with `service.shutdown` and waits briefly for the broker's
//! confirmation.

use service_queue_broker::Interrupt;
use service_queue_common::transport::{DealerSocket, Frame, Inbound, Multipart, Outbound};
use service_queue_common::{parse_action, Action, BrokerError, ControlPayload, Result};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long a departing worker waits for the broker to confirm.
const LEAVE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Broker output endpoint, where tasks arrive
    pub output: String,
    /// Broker control endpoint
    pub control: String,
    pub id: String,
    pub poll_timeout: Duration,
}

/// Why the worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The broker sent `shutdown`
    BrokerShutdown,
    /// Stopped locally after deregistering
    Interrupted,
    /// A connection to the broker closed
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub tasks: u64,
    pub pings: u64,
    pub stop: StopReason,
}

pub struct ReferenceWorker {
    options: WorkerOptions,
    tasks: DealerSocket,
    control: DealerSocket,
    handled: u64,
    pings: u64,
}

impl ReferenceWorker {
    pub fn connect(options: WorkerOptions) -> Result<Self> {
        let tasks = DealerSocket::connect(&options.output, &options.id)?;
        let control = DealerSocket::connect(&options.control, &options.id)?;
        Ok(Self {
            options,
            tasks,
            control,
            handled: 0,
            pings: 0,
        })
    }

    /// Registers and serves until the broker or `interrupt` stops the worker.
    pub fn run(mut self, interrupt: &Interrupt) -> Result<WorkerReport> {
        self.send_action(Action::ServiceRegister)?;
        info!("Worker {} registered", self.options.id);

        loop {
            if interrupt.is_triggered() {
                return self.leave();
            }

            match self.tasks.recv_timeout(self.options.poll_timeout) {
                Ok(Some(task)) => self.handle_task(&task),
                Ok(None) => {}
                Err(BrokerError::Disconnected) => return Ok(self.report(StopReason::Disconnected)),
                Err(e) => return Err(e),
            }

            loop {
                match self.control.recv_timeout(Duration::ZERO) {
                    Ok(Some(message)) => {
                        if self.handle_control(&message)? {
                            self.drain_tasks();
                            info!("Broker asked worker {} to shut down", self.options.id);
                            return Ok(self.report(StopReason::BrokerShutdown));
                        }
                    }
                    Ok(None) => break,
                    Err(BrokerError::Disconnected) => return Ok(self.report(StopReason::Disconnected)),
                    Err(e) => return Err(e),
                }
            }
        }
    }

    fn handle_task(&mut self, task: &Multipart) {
        self.handled += 1;
        let body: Vec<_> = task.iter().map(|f| String::from_utf8_lossy(f)).collect();
        info!("Task #{}: {:?}", self.handled, body);
    }

    /// Returns `true` when the broker asked the worker to stop.
    fn handle_control(&mut self, message: &Multipart) -> Result<bool> {
        match Action::parse(&action_of(message)) {
            Action::Ping => {
                self.pings += 1;
                debug!("Ping received, answering");
                self.send_action(Action::Pong)?;
                Ok(false)
            }
            Action::Shutdown => Ok(true),
            other => {
                warn!("Ignoring unexpected control action {:?}", other.as_str());
                Ok(false)
            }
        }
    }

    /// Processes tasks that already arrived before a shutdown.
    fn drain_tasks(&mut self) {
        while let Ok(Some(task)) = self.tasks.recv_timeout(Duration::ZERO) {
            self.handle_task(&task);
        }
    }

    fn leave(mut self) -> Result<WorkerReport> {
        info!("Worker {} leaving", self.options.id);
        self.send_action(Action::ServiceShutdown)?;

        let deadline = Instant::now() + LEAVE_TIMEOUT;
        while Instant::now() < deadline {
            match self.control.recv_timeout(self.options.poll_timeout) {
                Ok(Some(message)) => {
                    if self.handle_control(&message)? {
                        debug!("Broker confirmed shutdown");
                        break;
                    }
                }
                Ok(None) => {}
                Err(BrokerError::Disconnected) => break,
                Err(e) => return Err(e),
            }
        }

        self.drain_tasks();
        Ok(self.report(StopReason::Interrupted))
    }

    fn send_action(&mut self, action: Action) -> Result<()> {
        let payload = ControlPayload::new(action).with_issuer(self.options.id.as_str());
        self.control.send(vec![Frame::new(), payload.to_bytes()?])
    }

    fn report(&self, stop: StopReason) -> WorkerReport {
        WorkerReport {
            tasks: self.handled,
            pings: self.pings,
            stop,
        }
    }
}

/// Action of a control message as the worker sees it: `[""][json]`.
fn action_of(message: &Multipart) -> String {
    message.last().map(|body| parse_action(body)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_of_uses_last_frame() {
        let message = vec![Vec::new(), br#"{"action":"ping"}"#.to_vec()];
        assert_eq!(action_of(&message), "ping");
        assert_eq!(action_of(&Vec::new()), "");
    }

    #[test]
    fn test_connect_requires_running_broker() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let options = WorkerOptions {
            output: format!("tcp://{}", addr),
            control: format!("tcp://{}", addr),
            id: "w1".to_string(),
            poll_timeout: Duration::from_millis(10),
        };
        assert!(ReferenceWorker::connect(options).is_err());
    }
}

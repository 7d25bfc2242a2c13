use service_queue_common::transport::{Frame, Inbound};
use service_queue_common::{Action, BrokerError, ControlMessage};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::context::BrokerContext;
use crate::shutdown;

/// What the control handler did with one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Registered(String),
    AlreadyRegistered(String),
    Unregistered(String),
    Pong { worker: String, known: bool },
    Quit,
    Unknown { issuer: String, action: String },
    Malformed { frames: usize },
}

/// Serves the control endpoint: registrations, deregistrations, pongs and
/// quit requests.
///
/// When the loop stops, either because a quit arrived, the interrupt was
/// triggered elsewhere or the endpoint closed, it runs the shutdown sequence
/// before returning.
pub struct ControlHandler {
    inbound: Box<dyn Inbound>,
    context: BrokerContext,
    poll_timeout: Duration,
}

impl ControlHandler {
    pub fn new(inbound: Box<dyn Inbound>, context: BrokerContext, poll_timeout: Duration) -> Self {
        Self {
            inbound,
            context,
            poll_timeout,
        }
    }

    /// Starts the handler on a thread named `control`.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("control".to_string())
            .spawn(move || self.run())
    }

    fn run(mut self) {
        info!("Control handler started");

        while !self.context.interrupt.is_triggered() {
            match self.inbound.recv_timeout(self.poll_timeout) {
                Ok(Some(frames)) => {
                    self.handle(&frames);
                }
                Ok(None) => {}
                Err(BrokerError::Disconnected) => {
                    warn!("Control endpoint closed");
                    break;
                }
                Err(e) => error!("Failed to receive control message: {}", e),
            }
        }

        let notified = shutdown::shut_down(&self.context);
        info!("Control handler finished ({} workers notified)", notified);
    }

    /// Applies one `[issuer][""][json]` message.
    pub fn handle(&self, frames: &[Frame]) -> ControlOutcome {
        let message = match ControlMessage::from_frames(frames) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring control message: {}", e);
                self.context.stats.increment_malformed_messages();
                return ControlOutcome::Malformed {
                    frames: frames.len(),
                };
            }
        };

        let ControlMessage { issuer, action } = message;
        debug!("Control message {} from {}", action, issuer);

        match action {
            Action::ServiceRegister => {
                if self.context.registry.register(&issuer) {
                    ControlOutcome::Registered(issuer)
                } else {
                    ControlOutcome::AlreadyRegistered(issuer)
                }
            }
            Action::ServiceShutdown => {
                self.context.registry.remove(&issuer);
                if let Err(e) = self.context.link.notify(&issuer, Action::Shutdown) {
                    warn!("Failed to confirm shutdown to worker {}: {}", issuer, e);
                }
                ControlOutcome::Unregistered(issuer)
            }
            Action::Pong => self.pong(issuer),
            Action::Quit => {
                info!("Quit requested by {}", issuer);
                self.context.interrupt.trigger();
                ControlOutcome::Quit
            }
            other => {
                warn!("Unknown service action {:?} from {}", other.as_str(), issuer);
                self.context.stats.increment_unknown_actions();
                ControlOutcome::Unknown {
                    issuer,
                    action: other.as_str().to_string(),
                }
            }
        }
    }

    fn pong(&self, issuer: String) -> ControlOutcome {
        match self.context.registry.record_pong(&issuer, Instant::now()) {
            Some(worker) => {
                self.context.stats.increment_pongs_received();
                match worker.round_trip() {
                    Some(rtt) => info!("Pong from {} (round trip {:?})", issuer, rtt),
                    None => debug!("Unsolicited pong from {}", issuer),
                }
                ControlOutcome::Pong {
                    worker: issuer,
                    known: true,
                }
            }
            None => {
                debug!("Pong from unregistered worker {}", issuer);
                ControlOutcome::Pong {
                    worker: issuer,
                    known: false,
                }
            }
        }
    }
}

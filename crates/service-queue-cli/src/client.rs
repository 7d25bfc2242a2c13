//! One-shot producer and admin commands.

use service_queue_common::transport::{DealerSocket, Outbound, PushSocket};
use service_queue_common::{Action, ControlPayload, Result};

/// Pushes one task made of `frames` to the broker's input endpoint.
pub fn submit(input: &str, frames: &[String]) -> Result<()> {
    let mut socket = PushSocket::connect(input)?;
    socket.send(frames.iter().map(|f| f.as_bytes().to_vec()).collect())
}

/// Asks the broker to shut down via its control endpoint.
///
/// `identity` is the name the request is issued under.
pub fn quit(control: &str, identity: &str) -> Result<()> {
    let mut socket = DealerSocket::connect(control, identity)?;
    let payload = ControlPayload::new(Action::Quit).with_issuer(identity);
    socket.send(vec![Vec::new(), payload.to_bytes()?])
}

/// Identity used by `service-queue quit` unless one is given.
pub fn default_identity() -> String {
    format!("service-queue-cli-{}", std::process::id())
}

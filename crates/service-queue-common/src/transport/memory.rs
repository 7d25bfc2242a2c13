//! In-process endpoints.
//!
//! A pipe is a bounded queue whose sending half implements [`Outbound`] and
//! whose receiving half implements [`Inbound`]. Sending to a full pipe fails
//! with `WouldBlock` instead of blocking, mirroring a TCP peer whose outbound
//! queue reached its high-water mark.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::time::Duration;

use crate::protocol::error::{BrokerError, Result};
use crate::transport::{recv_queued, Inbound, Multipart, Outbound};

/// Creates a pipe holding at most `capacity` undelivered messages.
pub fn pipe(capacity: usize) -> (MemorySender, MemoryReceiver) {
    let (sender, receiver) = mpsc::sync_channel(capacity);
    (MemorySender { sender }, MemoryReceiver { receiver })
}

#[derive(Clone)]
pub struct MemorySender {
    sender: SyncSender<Multipart>,
}

impl Outbound for MemorySender {
    fn send(&mut self, message: Multipart) -> Result<()> {
        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(BrokerError::WouldBlock("memory pipe".to_string())),
            Err(TrySendError::Disconnected(_)) => Err(BrokerError::Disconnected),
        }
    }
}

pub struct MemoryReceiver {
    receiver: Receiver<Multipart>,
}

impl MemoryReceiver {
    /// Returns a message only if one is already queued.
    pub fn try_recv(&self) -> Option<Multipart> {
        self.receiver.try_recv().ok()
    }
}

impl Inbound for MemoryReceiver {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Multipart>> {
        recv_queued(&self.receiver, timeout)
    }
}

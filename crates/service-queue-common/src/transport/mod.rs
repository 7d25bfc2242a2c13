//! Service Queue Transport Layer
//!
//! This module provides the multi-frame message transport used between
//! producers, the broker and workers.
//!
//! # Architecture
//!
//! The broker core is written against two traits:
//! - **[`Inbound`]**: a bounded-timeout receive of one whole multi-frame message
//! - **[`Outbound`]**: an atomic send of one whole multi-frame message
//!
//! Two families of endpoints implement them:
//! - **TCP** ([`PullSocket`], [`RouterSocket`], [`PushSocket`], [`DealerSocket`])
//! - **In-memory** ([`memory::pipe`]) for tests and embedding
//!
//! # Wire Format
//!
//! Each frame is written as:
//!
//! ```text
//! [1 byte flags] [4-byte length as u32 big-endian] [data]
//! ```
//!
//! Flag bit 0 (`MORE`) means another frame of the same message follows.
//!
//! # Example
//!
//! ```
//! use service_queue_common::transport::{memory, Inbound, Outbound};
//! use std::time::Duration;
//!
//! let (mut tx, mut rx) = memory::pipe(16);
//! tx.send(vec![b"task".to_vec()]).unwrap();
//!
//! let message = rx.recv_timeout(Duration::from_millis(100)).unwrap();
//! assert_eq!(message, Some(vec![b"task".to_vec()]));
//! ```

pub mod codec;
pub mod memory;
pub mod tcp;


use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::protocol::error::{BrokerError, Result};

pub use codec::{FrameCodec, MAX_FRAME_SIZE};
pub use memory::{MemoryReceiver, MemorySender};
pub use tcp::{DealerSocket, PullSocket, PushSocket, RouterReceiver, RouterSender, RouterSocket};

/// One discrete part of a message.
pub type Frame = Vec<u8>;

/// A message made of one or more frames delivered together.
pub type Multipart = Vec<Frame>;

/// Default per-peer outbound queue length, in messages.
pub const DEFAULT_HIGH_WATER_MARK: usize = 1000;

/// Receiving half of an endpoint.
pub trait Inbound: Send {
    /// Waits up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` if nothing arrived in time and
    /// `Err(BrokerError::Disconnected)` once no message can ever arrive.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Multipart>>;
}

/// Sending half of an endpoint.
pub trait Outbound: Send {
    /// Sends all frames of `message` as one unit.
    ///
    /// Returns `Err(BrokerError::WouldBlock)` when the destination queue is
    /// full; the message was not sent and may be retried.
    fn send(&mut self, message: Multipart) -> Result<()>;
}

impl<T: Inbound + ?Sized> Inbound for Box<T> {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Multipart>> {
        (**self).recv_timeout(timeout)
    }
}

impl<T: Outbound + ?Sized> Outbound for Box<T> {
    fn send(&mut self, message: Multipart) -> Result<()> {
        (**self).send(message)
    }
}

/// Shared receive path for endpoints backed by an in-process queue.
pub(crate) fn recv_queued(receiver: &Receiver<Multipart>, timeout: Duration) -> Result<Option<Multipart>> {
    match receiver.recv_timeout(timeout) {
        Ok(message) => Ok(Some(message)),
        Err(RecvTimeoutError::Timeout) => Ok(None),
        Err(RecvTimeoutError::Disconnected) => Err(BrokerError::Disconnected),
    }
}

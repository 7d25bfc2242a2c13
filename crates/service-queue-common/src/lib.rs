// Copyright 2025 Service Queue Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Service Queue Common Types and Transport
//!
//! This crate provides the control protocol definitions and the multi-frame
//! transport shared by the broker, the CLI and workers.
//!
//! # Overview
//!
//! The broker sits between task producers and a pool of workers. Three
//! endpoints are involved:
//!
//! - **input**: producers push single-frame task payloads
//! - **output**: the broker routes `[workerId][payload]` to one worker
//! - **control**: workers exchange `[workerId][""][json]` control messages
//!
//! # Components
//!
//! - [`protocol`] - Control actions, the JSON control payload, framing helpers
//!   and the shared error type
//! - [`transport`] - The `Inbound`/`Outbound` seam, the wire codec, TCP
//!   endpoints and in-memory pipes
//!
//! # Example
//!
//! ```
//! use service_queue_common::{Action, ControlMessage, control_envelope, ControlPayload};
//!
//! let frames = control_envelope("worker-1", &ControlPayload::new(Action::Pong)).unwrap();
//! let message = ControlMessage::from_frames(&frames).unwrap();
//!
//! assert_eq!(message.issuer, "worker-1");
//! assert_eq!(message.action, Action::Pong);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;

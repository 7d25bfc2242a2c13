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

//! Load-balancing task broker.
//!
//! Producers push tasks to the input endpoint. The broker hands each task to
//! exactly one registered worker, in round-robin order, on the output
//! endpoint. Workers join and leave through the control endpoint, which the
//! broker also uses to ping them; workers that stop answering are evicted.
//!
//! Three threads do the work:
//!
//! - [`Dispatcher`] forwards tasks, waiting while no worker is registered and
//!   backing off while a worker's queue is full.
//! - [`ControlHandler`] applies registrations, deregistrations, pongs and quit
//!   requests, and runs the shutdown broadcast when the broker stops.
//! - [`HeartbeatMonitor`] pings idle workers and evicts unresponsive ones.
//!
//! # Example
//!
//! ```no_run
//! use service_queue_broker::{Broker, BrokerConfig};
//!
//! # fn main() -> service_queue_common::Result<()> {
//! let broker = Broker::bind(BrokerConfig::default())?;
//! let running = broker.start()?;
//! // ... later, from another thread or a signal handler
//! running.interrupt().trigger();
//! let stats = running.join();
//! println!("forwarded {} tasks", stats.tasks_forwarded);
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod context;
pub mod control;
pub mod dispatcher;
pub mod heartbeat;
pub mod interrupt;
pub mod link;
pub mod registry;
pub mod shutdown;
pub mod stats;
pub mod worker;

pub use broker::{Broker, Endpoints, RunningBroker};
pub use config::{BrokerConfig, HeartbeatConfig, PortsConfig, RetryConfig};
pub use context::BrokerContext;
pub use control::{ControlHandler, ControlOutcome};
pub use dispatcher::Dispatcher;
pub use heartbeat::{HeartbeatMonitor, TickReport};
pub use interrupt::Interrupt;
pub use link::WorkerLink;
pub use registry::Registry;
pub use stats::{BrokerStats, StatsSnapshot};
pub use worker::{Liveness, Worker};

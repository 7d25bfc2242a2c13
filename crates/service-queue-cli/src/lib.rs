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

//! # Service Queue CLI
//!
//! Command-line interface for the service queue broker.
//!
//! The `service-queue` binary dispatches to the pieces in this crate:
//!
//! - **run**: start the broker (configuration in [`settings`], log setup in
//!   [`logging`], OS signals in [`signals`])
//! - **submit** / **quit**: one-shot producer and admin commands in [`client`]
//! - **worker**: a reference worker in [`worker`], useful for trying the broker
//!   out and for integration tests

pub mod client;
pub mod logging;
pub mod settings;
pub mod signals;
pub mod worker;

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

//! # Service Queue CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start the broker with ./default/config.json, or built-in defaults
//! service-queue run
//!
//! # Start the broker with ./production/config.json, logging to
//! # ./production/service_queue.log
//! service-queue run production
//!
//! # Push a task
//! service-queue submit tcp://127.0.0.1:8100 '{"job": 42}'
//!
//! # Run a worker
//! service-queue worker tcp://127.0.0.1:8101 tcp://127.0.0.1:8102 --id worker-1
//!
//! # Stop the broker
//! service-queue quit tcp://127.0.0.1:8102
//! ```
//!
//! ## Endpoint Format
//!
//! Endpoints are `tcp://host:port`:
//! - ✅ `tcp://127.0.0.1:8100`
//! - ❌ `127.0.0.1:8100`

use anyhow::{Context, Result};
use argh::FromArgs;
use service_queue_broker::{Broker, BrokerConfig, Interrupt};
use service_queue_cli::settings::{self, LoadedConfig};
use service_queue_cli::worker::{ReferenceWorker, WorkerOptions};
use service_queue_cli::signals::ShutdownSignals;
use service_queue_cli::{client, logging};
use std::path::PathBuf;
use std::time::Duration;

/// Validates that an endpoint string starts with tcp://
fn validate_endpoint(endpoint: &str, description: &str) -> Result<()> {
    if endpoint.starts_with("tcp://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid {}: '{}' must start with tcp://",
            description,
            endpoint
        ))
    }
}

#[derive(FromArgs)]
/// Service Queue - round-robin task broker
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Run(RunArgs),
    Submit(SubmitArgs),
    Quit(QuitArgs),
    Worker(WorkerArgs),
}

/// Arguments for starting the broker.
///
/// Flags override the corresponding values from the configuration file.
#[derive(FromArgs)]
#[argh(subcommand, name = "run")]
/// start the broker
struct RunArgs {
    /// configuration directory containing config.json
    ///
    /// Defaults to "default". If no directory is named and ./default/config.json
    /// does not exist, built-in defaults are used.
    #[argh(positional)]
    config: Option<String>,

    /// endpoint producers push tasks to
    #[argh(option)]
    input: Option<String>,

    /// endpoint tasks are routed to workers on
    #[argh(option)]
    output: Option<String>,

    /// endpoint workers exchange control messages on
    #[argh(option)]
    control: Option<String>,

    /// seconds between pings to an idle worker
    #[argh(option, long = "heartbeat-interval")]
    heartbeat_interval_secs: Option<u64>,

    /// seconds a worker has to answer a ping
    #[argh(option, long = "heartbeat-timeout")]
    heartbeat_timeout_secs: Option<u64>,

    /// upper bound in milliseconds on how long a loop waits for input
    #[argh(option, long = "poll-timeout-ms")]
    poll_timeout_ms: Option<u64>,

    /// file to append logs to
    ///
    /// Defaults to service_queue.log in the configuration directory.
    #[argh(option, long = "log-file")]
    log_file: Option<PathBuf>,
}

impl RunArgs {
    fn apply_overrides(&self, config: &mut BrokerConfig) -> Result<()> {
        if let Some(input) = &self.input {
            validate_endpoint(input, "input endpoint")?;
            config.ports.input = input.clone();
        }
        if let Some(output) = &self.output {
            validate_endpoint(output, "output endpoint")?;
            config.ports.output = output.clone();
        }
        if let Some(control) = &self.control {
            validate_endpoint(control, "control endpoint")?;
            config.ports.service = control.clone();
        }
        if let Some(secs) = self.heartbeat_interval_secs {
            config.heartbeat.interval_secs = secs;
        }
        if let Some(secs) = self.heartbeat_timeout_secs {
            config.heartbeat.timeout_secs = secs;
        }
        if let Some(ms) = self.poll_timeout_ms {
            config.poll_timeout_ms = ms;
        }
        config.validate()?;
        Ok(())
    }

    /// `--log-file` if given, otherwise the configuration's own log file.
    fn log_path(&self, loaded: &LoadedConfig) -> Option<PathBuf> {
        self.log_file.clone().or_else(|| loaded.log_file())
    }
}

#[derive(FromArgs)]
#[argh(subcommand, name = "submit")]
/// push one task to the broker
struct SubmitArgs {
    /// broker input endpoint
    #[argh(positional)]
    input: String,

    /// task frames, sent as one multi-frame message
    #[argh(positional)]
    frames: Vec<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "quit")]
/// ask the broker to shut down
struct QuitArgs {
    /// broker control endpoint
    #[argh(positional)]
    control: String,

    /// identity to issue the request under
    #[argh(option)]
    identity: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "worker")]
/// run a worker that logs the tasks it receives
struct WorkerArgs {
    /// broker output endpoint
    #[argh(positional)]
    output: String,

    /// broker control endpoint
    #[argh(positional)]
    control: String,

    /// worker identity, unique among connected workers
    #[argh(option)]
    id: String,

    /// milliseconds to wait for a task before checking control messages
    #[argh(option, long = "poll-timeout-ms", default = "100")]
    poll_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    match cli.command {
        Commands::Run(args) => run_broker(args).await,
        Commands::Submit(args) => {
            validate_endpoint(&args.input, "input endpoint")?;
            if args.frames.is_empty() {
                anyhow::bail!("A task needs at least one frame");
            }
            client::submit(&args.input, &args.frames)?;
            Ok(())
        }
        Commands::Quit(args) => {
            validate_endpoint(&args.control, "control endpoint")?;
            let identity = args.identity.unwrap_or_else(client::default_identity);
            client::quit(&args.control, &identity)?;
            Ok(())
        }
        Commands::Worker(args) => run_worker(args).await,
    }
}

/// Executes the `run` subcommand.
///
/// Blocks until the broker stops, either through a `quit` control message or
/// an OS signal.
async fn run_broker(args: RunArgs) -> Result<()> {
    let mut loaded = settings::load(args.config.as_deref())?;
    args.apply_overrides(&mut loaded.config)?;

    let log_file = args.log_path(&loaded);
    logging::init(log_file.as_deref())?;

    let LoadedConfig { config, directory } = loaded;
    match &directory {
        Some(dir) => tracing::info!("Using configuration from {}", dir.display()),
        None => tracing::info!("Using built-in configuration"),
    }

    let signals = ShutdownSignals::install().context("Failed to install signal handlers")?;
    let broker = Broker::bind(config).context("Failed to start broker")?;
    let running = broker.start()?;
    tokio::spawn(signals.trigger(running.interrupt()));

    let stats = tokio::task::spawn_blocking(move || running.join()).await?;
    tracing::info!("Final stats: {}", serde_json::to_string(&stats)?);
    Ok(())
}

/// Executes the `worker` subcommand.
async fn run_worker(args: WorkerArgs) -> Result<()> {
    validate_endpoint(&args.output, "output endpoint")?;
    validate_endpoint(&args.control, "control endpoint")?;
    logging::init(None)?;

    let options = WorkerOptions {
        output: args.output,
        control: args.control,
        id: args.id,
        poll_timeout: Duration::from_millis(args.poll_timeout_ms),
    };
    let worker = ReferenceWorker::connect(options).context("Failed to connect to broker")?;

    let interrupt = Interrupt::new();
    let signals = ShutdownSignals::install().context("Failed to install signal handlers")?;
    tokio::spawn(signals.trigger(interrupt.clone()));

    let report = tokio::task::spawn_blocking(move || worker.run(&interrupt)).await??;
    tracing::info!(
        "Worker stopped ({:?}) after {} tasks and {} pings",
        report.stop,
        report.tasks,
        report.pings
    );
    Ok(())
}

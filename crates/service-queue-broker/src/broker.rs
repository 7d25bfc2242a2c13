use service_queue_common::transport::{Inbound, Outbound, PullSocket, RouterSocket};
use service_queue_common::Result;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, info};

use crate::config::BrokerConfig;
use crate::context::BrokerContext;
use crate::control::ControlHandler;
use crate::dispatcher::Dispatcher;
use crate::heartbeat::HeartbeatMonitor;
use crate::interrupt::Interrupt;
use crate::link::WorkerLink;
use crate::registry::Registry;
use crate::shutdown;
use crate::stats::StatsSnapshot;

/// The four endpoints a broker runs on.
pub struct Endpoints {
    /// Tasks from producers
    pub tasks_in: Box<dyn Inbound>,
    /// Tasks to workers, addressed by worker id
    pub tasks_out: Box<dyn Outbound>,
    /// Control messages from workers
    pub control_in: Box<dyn Inbound>,
    /// Control messages to workers, addressed by worker id
    pub control_out: Box<dyn Outbound>,
    /// Anything workers send back on the task endpoint. The broker never
    /// reads it, but keeps it open for as long as it runs.
    pub task_replies: Option<Box<dyn Inbound>>,
}

impl Endpoints {
    /// Binds the TCP endpoints named in `config.ports`.
    pub fn bind_tcp(config: &BrokerConfig) -> Result<Self> {
        let input = PullSocket::bind(&config.ports.input)?;
        let (output_in, output_out) =
            RouterSocket::bind(&config.ports.output, config.high_water_mark)?;
        let (service_in, service_out) =
            RouterSocket::bind(&config.ports.service, config.high_water_mark)?;

        info!(
            "Listening: input on {}, output on {}, service on {}",
            input.local_addr(),
            output_in.local_addr(),
            service_in.local_addr()
        );

        Ok(Self {
            tasks_in: Box::new(input),
            tasks_out: Box::new(output_out),
            control_in: Box::new(service_in),
            control_out: Box::new(service_out),
            task_replies: Some(Box::new(output_in)),
        })
    }
}

/// A configured broker that has not started yet.
pub struct Broker {
    config: BrokerConfig,
    context: BrokerContext,
    tasks_in: Box<dyn Inbound>,
    control_in: Box<dyn Inbound>,
    task_replies: Option<Box<dyn Inbound>>,
}

impl Broker {
    pub fn new(config: BrokerConfig, endpoints: Endpoints) -> Self {
        let Endpoints {
            tasks_in,
            tasks_out,
            control_in,
            control_out,
            task_replies,
        } = endpoints;

        Self {
            config,
            context: BrokerContext::new(WorkerLink::new(tasks_out, control_out)),
            tasks_in,
            control_in,
            task_replies,
        }
    }

    /// Validates `config` and binds its TCP endpoints.
    pub fn bind(config: BrokerConfig) -> Result<Self> {
        config.validate()?;
        let endpoints = Endpoints::bind_tcp(&config)?;
        Ok(Self::new(config, endpoints))
    }

    /// Handle that stops the broker once triggered. Valid before and after
    /// [`start`](Self::start).
    pub fn interrupt(&self) -> Interrupt {
        self.context.interrupt.clone()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.context.registry)
    }

    /// Spawns the dispatcher, control and heartbeat threads.
    pub fn start(self) -> Result<RunningBroker> {
        let Broker {
            config,
            context,
            tasks_in,
            control_in,
            task_replies,
        } = self;
        let poll_timeout = config.poll_timeout();

        let dispatcher = Dispatcher::new(tasks_in, context.clone(), poll_timeout, config.retry);
        let control = ControlHandler::new(control_in, context.clone(), poll_timeout);
        let heartbeat = HeartbeatMonitor::new(context.clone(), config.heartbeat);

        let mut running = RunningBroker {
            context,
            handles: Vec::with_capacity(3),
            _task_replies: task_replies,
        };

        match spawn_threads(dispatcher, control, heartbeat, &mut running.handles) {
            Ok(()) => {
                info!("Broker started");
                Ok(running)
            }
            Err(e) => {
                error!("Failed to start broker threads: {}", e);
                shutdown::shut_down(&running.context);
                running.join();
                Err(e.into())
            }
        }
    }

    /// Starts the broker and blocks until it stops.
    pub fn run(self) -> Result<StatsSnapshot> {
        Ok(self.start()?.join())
    }
}

fn spawn_threads(
    dispatcher: Dispatcher,
    control: ControlHandler,
    heartbeat: HeartbeatMonitor,
    handles: &mut Vec<JoinHandle<()>>,
) -> std::io::Result<()> {
    handles.push(dispatcher.spawn()?);
    handles.push(control.spawn()?);
    handles.push(heartbeat.spawn()?);
    Ok(())
}

/// A broker whose threads are running.
pub struct RunningBroker {
    context: BrokerContext,
    handles: Vec<JoinHandle<()>>,
    _task_replies: Option<Box<dyn Inbound>>,
}

impl RunningBroker {
    pub fn interrupt(&self) -> Interrupt {
        self.context.interrupt.clone()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.context.registry)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.context.stats.snapshot()
    }

    /// Waits for every broker thread to exit and returns the final counters.
    pub fn join(self) -> StatsSnapshot {
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("broker").to_string();
            if handle.join().is_err() {
                error!("Broker thread {} panicked", name);
            }
        }

        let stats = self.context.stats.snapshot();
        info!(
            "Broker stopped: {} tasks received, {} forwarded, {} dropped, {} workers evicted",
            stats.tasks_received, stats.tasks_forwarded, stats.tasks_dropped, stats.evictions
        );
        stats
    }
}

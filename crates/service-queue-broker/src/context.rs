use std::sync::Arc;

use crate::interrupt::Interrupt;
use crate::link::WorkerLink;
use crate::registry::Registry;
use crate::stats::BrokerStats;

/// State shared by the dispatcher, control handler and heartbeat monitor.
#[derive(Clone)]
pub struct BrokerContext {
    pub registry: Arc<Registry>,
    pub link: Arc<WorkerLink>,
    pub interrupt: Interrupt,
    pub stats: Arc<BrokerStats>,
}

impl BrokerContext {
    pub fn new(link: WorkerLink) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            link: Arc::new(link),
            interrupt: Interrupt::new(),
            stats: Arc::new(BrokerStats::new()),
        }
    }
}

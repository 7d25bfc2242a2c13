use service_queue_common::Action;
use tracing::{info, warn};

use crate::context::BrokerContext;

/// Unregisters every worker and sends each one `shutdown`.
///
/// Returns how many notices were sent successfully. Workers that cannot be
/// reached are unregistered all the same. A worker already removed by
/// another thread (an eviction, say) is skipped, since whoever removed it
/// owns its notice.
pub fn broadcast_shutdown(context: &BrokerContext) -> usize {
    let workers = context.registry.ids();
    info!("Broadcasting shutdown to {} workers", workers.len());

    let mut notified = 0;
    for id in workers {
        if !context.registry.remove(&id) {
            continue;
        }
        match context.link.notify(&id, Action::Shutdown) {
            Ok(()) => notified += 1,
            Err(e) => warn!("Failed to send shutdown to worker {}: {}", id, e),
        }
    }
    notified
}

/// Final shutdown sequence: raises the interrupt, tells every worker to stop,
/// then closes the registry so a dispatcher blocked on an empty registry
/// wakes up and exits.
pub fn shut_down(context: &BrokerContext) -> usize {
    context.interrupt.trigger();
    let notified = broadcast_shutdown(context);
    context.registry.close();
    notified
}

use parking_lot::{Condvar, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::worker::Worker;

#[derive(Debug, Default)]
struct RegistryState {
    workers: Vec<Worker>,
    cursor: usize,
    closed: bool,
}

impl RegistryState {
    fn position(&self, id: &str) -> Option<usize> {
        self.workers.iter().position(|w| w.id == id)
    }

    /// Picks the worker under the cursor and advances it, wrapping at the end.
    fn select(&mut self) -> String {
        if self.cursor >= self.workers.len() {
            self.cursor = 0;
        }
        let id = self.workers[self.cursor].id.clone();
        self.cursor = (self.cursor + 1) % self.workers.len();
        id
    }
}

/// Thread-safe set of registered workers with round-robin selection.
///
/// Workers keep registration order. Selection visits them in that order,
/// one task each, and wraps around. When workers are removed the cursor is
/// left in place and reset to the front if it falls off the end, so the
/// rotation continues with whichever worker slid into the freed slot.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
    workers_available: Condvar,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a worker at the end of the rotation.
    ///
    /// Returns `false` if a worker with this id is already registered; the
    /// registry is left unchanged in that case.
    pub fn register(&self, id: &str) -> bool {
        let added = {
            let mut state = self.state.lock();
            if state.position(id).is_some() {
                false
            } else {
                state.workers.push(Worker::new(id));
                true
            }
        };
        self.workers_available.notify_all();

        if added {
            info!("Worker registered: {}", id);
        } else {
            warn!("Worker already registered: {}", id);
        }
        added
    }

    /// Removes a worker. Returns `false` if it was not registered.
    pub fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            match state.position(id) {
                Some(index) => {
                    state.workers.remove(index);
                    true
                }
                None => false,
            }
        };

        if removed {
            info!("Worker unregistered: {}", id);
        } else {
            debug!("Worker {} not registered, nothing to remove", id);
        }
        removed
    }

    /// Returns the next worker in rotation, blocking while none are registered.
    ///
    /// Returns `None` once the registry is [closed](Self::close).
    pub fn next(&self) -> Option<String> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if !state.workers.is_empty() {
                return Some(state.select());
            }
            debug!("No workers registered, waiting");
            self.workers_available.wait(&mut state);
        }
    }

    /// Non-blocking variant of [`next`](Self::next).
    pub fn try_next(&self) -> Option<String> {
        let mut state = self.state.lock();
        if state.closed || state.workers.is_empty() {
            return None;
        }
        Some(state.select())
    }

    /// Copy of every worker record, in rotation order.
    pub fn snapshot(&self) -> Vec<Worker> {
        self.state.lock().workers.clone()
    }

    /// Worker ids in rotation order.
    pub fn ids(&self) -> Vec<String> {
        self.state.lock().workers.iter().map(|w| w.id.clone()).collect()
    }

    /// Stamps the time a ping was sent. Returns `false` for unknown workers.
    pub fn record_ping(&self, id: &str, at: Instant) -> bool {
        let mut state = self.state.lock();
        match state.workers.iter_mut().find(|w| w.id == id) {
            Some(worker) => {
                worker.last_ping_sent_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Stamps the time a pong arrived and returns the updated record, or
    /// `None` for unknown workers.
    pub fn record_pong(&self, id: &str, at: Instant) -> Option<Worker> {
        let mut state = self.state.lock();
        let worker = state.workers.iter_mut().find(|w| w.id == id)?;
        worker.last_pong_received_at = Some(at);
        Some(worker.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.state.lock().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().workers.is_empty()
    }

    /// Stops selection: every current and future [`next`](Self::next) call
    /// returns `None`. Registered workers are kept.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.workers_available.notify_all();
        debug!("Worker registry closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn registry_with(ids: &[&str]) -> Registry {
        let registry = Registry::new();
        for id in ids {
            assert!(registry.register(id));
        }
        registry
    }

    fn take(registry: &Registry, n: usize) -> Vec<String> {
        (0..n).map(|_| registry.try_next().unwrap()).collect()
    }

    #[test]
    fn test_round_robin_order() {
        let registry = registry_with(&["w1", "w2", "w3"]);
        assert_eq!(take(&registry, 6), ["w1", "w2", "w3", "w1", "w2", "w3"]);
    }

    #[test]
    fn test_single_worker() {
        let registry = registry_with(&["only"]);
        assert_eq!(take(&registry, 3), ["only", "only", "only"]);
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let registry = registry_with(&["w1"]);
        assert!(!registry.register("w1"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.ids(), ["w1"]);
    }

    #[test]
    fn test_remove() {
        let registry = registry_with(&["w1", "w2"]);
        assert!(registry.remove("w1"));
        assert!(!registry.remove("w1"));
        assert!(!registry.contains("w1"));
        assert!(registry.contains("w2"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let registry = registry_with(&["w1"]);
        assert!(!registry.remove("ghost"));
        assert_eq!(registry.ids(), ["w1"]);
    }

    #[test]
    fn test_removal_keeps_cursor_position() {
        let registry = registry_with(&["w1", "w2", "w3"]);
        assert_eq!(take(&registry, 2), ["w1", "w2"]);

        // Cursor points at index 2 (w3); removing w2 slides w3 to index 1
        // and leaves the cursor past the end, so it wraps.
        registry.remove("w2");
        assert_eq!(take(&registry, 3), ["w1", "w3", "w1"]);
    }

    #[test]
    fn test_removal_before_cursor_shifts_rotation() {
        let registry = registry_with(&["w1", "w2", "w3", "w4"]);
        assert_eq!(take(&registry, 1), ["w1"]);

        // Cursor at index 1 (w2). Removing w1 shifts w3 into index 1.
        registry.remove("w1");
        assert_eq!(take(&registry, 4), ["w3", "w4", "w2", "w3"]);
    }

    #[test]
    fn test_new_worker_joins_rotation_at_end() {
        let registry = registry_with(&["w1", "w2"]);
        assert_eq!(take(&registry, 1), ["w1"]);
        registry.register("w3");
        assert_eq!(take(&registry, 4), ["w2", "w3", "w1", "w2"]);
    }

    #[test]
    fn test_try_next_empty() {
        let registry = Registry::new();
        assert!(registry.is_empty());
        assert!(registry.try_next().is_none());
    }

    #[test]
    fn test_next_blocks_until_registration() {
        let registry = Arc::new(Registry::new());

        let waiter = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.next())
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        registry.register("late");
        assert_eq!(waiter.join().unwrap().as_deref(), Some("late"));
    }

    #[test]
    fn test_close_wakes_blocked_next() {
        let registry = Arc::new(Registry::new());

        let waiter = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || registry.next())
        };

        thread::sleep(Duration::from_millis(50));
        registry.close();
        assert_eq!(waiter.join().unwrap(), None);
        assert!(registry.is_closed());
    }

    #[test]
    fn test_closed_registry_stops_selection() {
        let registry = registry_with(&["w1"]);
        registry.close();
        assert!(registry.next().is_none());
        assert!(registry.try_next().is_none());
        // Records are kept
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_heartbeat_timestamps() {
        let registry = registry_with(&["w1"]);
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(15);

        assert!(registry.record_ping("w1", t0));
        let worker = registry.record_pong("w1", t1).unwrap();
        assert_eq!(worker.last_ping_sent_at, Some(t0));
        assert_eq!(worker.round_trip(), Some(Duration::from_millis(15)));
        assert_eq!(registry.snapshot()[0], worker);

        assert!(!registry.record_ping("ghost", t0));
        assert!(registry.record_pong("ghost", t1).is_none());
    }

    #[test]
    fn test_concurrent_selection() {
        let registry = Arc::new(registry_with(&["w1", "w2", "w3"]));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let mut picks = Vec::new();
                for _ in 0..300 {
                    picks.push(registry.next().unwrap());
                }
                picks
            }));
        }

        let mut counts = std::collections::HashMap::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                *counts.entry(id).or_insert(0) += 1;
            }
        }

        // 1200 selections spread exactly evenly over three workers
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&count| count == 400));
    }
}

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Process-wide stop flag shared by the broker loops.
///
/// Once triggered it stays triggered. Threads sleeping in
/// [`wait_timeout`](Self::wait_timeout) are woken immediately.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock();
        self.inner.wake.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Sleeps for up to `timeout`, returning early if triggered.
    ///
    /// Returns whether the interrupt has been triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if self.is_triggered() {
            return true;
        }
        self.inner.wake.wait_for(&mut guard, timeout);
        self.is_triggered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_starts_clear() {
        let interrupt = Interrupt::new();
        assert!(!interrupt.is_triggered());
        assert!(!interrupt.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_trigger_is_shared_by_clones() {
        let interrupt = Interrupt::new();
        let clone = interrupt.clone();
        clone.trigger();
        assert!(interrupt.is_triggered());
        // Triggering twice is harmless
        interrupt.trigger();
        assert!(clone.is_triggered());
    }

    #[test]
    fn test_wait_returns_immediately_when_triggered() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let start = Instant::now();
        assert!(interrupt.wait_timeout(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let interrupt = Interrupt::new();
        let waiter = {
            let interrupt = interrupt.clone();
            thread::spawn(move || {
                let start = Instant::now();
                let triggered = interrupt.wait_timeout(Duration::from_secs(30));
                (triggered, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        interrupt.trigger();

        let (triggered, elapsed) = waiter.join().unwrap();
        assert!(triggered);
        assert!(elapsed < Duration::from_secs(10));
    }
}

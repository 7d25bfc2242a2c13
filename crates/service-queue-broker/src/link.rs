use parking_lot::Mutex;
use service_queue_common::transport::{Frame, Outbound};
use service_queue_common::{control_envelope, task_envelope, Action, ControlPayload, Result};

struct Channels {
    tasks: Box<dyn Outbound>,
    control: Box<dyn Outbound>,
}

/// Outbound side of the broker, shared by every loop that talks to workers.
///
/// Both outbound endpoints sit behind one mutex, so at most one send is in
/// flight at a time. Each call makes a single attempt; retrying is up to the
/// caller.
pub struct WorkerLink {
    channels: Mutex<Channels>,
}

impl WorkerLink {
    /// `tasks` carries `[worker id][payload...]` messages, `control` carries
    /// `[worker id][""][json]` notices.
    pub fn new(tasks: Box<dyn Outbound>, control: Box<dyn Outbound>) -> Self {
        Self {
            channels: Mutex::new(Channels { tasks, control }),
        }
    }

    /// Sends a copy of `payload` to `worker_id` on the task endpoint.
    pub fn forward_task(&self, worker_id: &str, payload: &[Frame]) -> Result<()> {
        let envelope = task_envelope(worker_id, payload.to_vec());
        self.channels.lock().tasks.send(envelope)
    }

    /// Sends a broker-issued control message with `action` to `worker_id`.
    pub fn notify(&self, worker_id: &str, action: Action) -> Result<()> {
        let envelope = control_envelope(worker_id, &ControlPayload::new(action))?;
        self.channels.lock().control.send(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_queue_common::transport::memory::pipe;
    use service_queue_common::{parse_action, BrokerError};

    #[test]
    fn test_forward_task_prefixes_worker_id() {
        let (tasks, task_rx) = pipe(4);
        let (control, control_rx) = pipe(4);
        let link = WorkerLink::new(Box::new(tasks), Box::new(control));

        let payload = vec![b"part-1".to_vec(), b"part-2".to_vec()];
        link.forward_task("w1", &payload).unwrap();

        assert_eq!(
            task_rx.try_recv().unwrap(),
            vec![b"w1".to_vec(), b"part-1".to_vec(), b"part-2".to_vec()]
        );
        assert!(control_rx.try_recv().is_none());
    }

    #[test]
    fn test_notify_uses_control_endpoint() {
        let (tasks, task_rx) = pipe(4);
        let (control, control_rx) = pipe(4);
        let link = WorkerLink::new(Box::new(tasks), Box::new(control));

        link.notify("w2", Action::Ping).unwrap();

        let frames = control_rx.try_recv().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], b"w2");
        assert!(frames[1].is_empty());
        assert_eq!(parse_action(&frames[2]), "ping");
        assert!(task_rx.try_recv().is_none());
    }

    #[test]
    fn test_full_queue_is_reported_once() {
        let (tasks, task_rx) = pipe(1);
        let (control, _control_rx) = pipe(1);
        let link = WorkerLink::new(Box::new(tasks), Box::new(control));

        link.forward_task("w1", &[b"first".to_vec()]).unwrap();
        let err = link.forward_task("w1", &[b"second".to_vec()]).unwrap_err();
        assert!(err.is_retryable());

        // Only the first task is queued
        assert!(task_rx.try_recv().is_some());
        assert!(task_rx.try_recv().is_none());
    }

    #[test]
    fn test_closed_endpoint_is_not_retryable() {
        let (tasks, task_rx) = pipe(1);
        let (control, _control_rx) = pipe(1);
        drop(task_rx);
        let link = WorkerLink::new(Box::new(tasks), Box::new(control));

        let err = link.forward_task("w1", &[b"task".to_vec()]).unwrap_err();
        assert!(matches!(err, BrokerError::Disconnected));
        assert!(!err.is_retryable());
    }
}

// End-to-end tests for service-queue-broker
//
// These tests run a complete broker over in-process pipes and play the
// producer and worker roles by hand.

use serde_json::json;
use service_queue_broker::{Broker, BrokerConfig, Endpoints, HeartbeatConfig, RunningBroker};
use service_queue_common::parse_action;
use service_queue_common::transport::memory::{pipe, MemoryReceiver, MemorySender};
use service_queue_common::transport::{Inbound, Multipart, Outbound};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Helpers
// ============================================================================

struct MemoryBroker {
    running: RunningBroker,
    producer: MemorySender,
    delivered: MemoryReceiver,
    workers: MemorySender,
    notices: MemoryReceiver,
}

fn test_config() -> BrokerConfig {
    BrokerConfig {
        poll_timeout_ms: 20,
        ..Default::default()
    }
}

fn start_broker(config: BrokerConfig) -> MemoryBroker {
    let (producer, tasks_in) = pipe(64);
    let (tasks_out, delivered) = pipe(64);
    let (workers, control_in) = pipe(64);
    let (control_out, notices) = pipe(64);

    let endpoints = Endpoints {
        tasks_in: Box::new(tasks_in),
        tasks_out: Box::new(tasks_out),
        control_in: Box::new(control_in),
        control_out: Box::new(control_out),
        task_replies: None,
    };

    MemoryBroker {
        running: Broker::new(config, endpoints).start().unwrap(),
        producer,
        delivered,
        workers,
        notices,
    }
}

/// Control message as it arrives from the transport: `[issuer][""][json]`
fn control(issuer: &str, action: &str) -> Multipart {
    vec![
        issuer.as_bytes().to_vec(),
        Vec::new(),
        json!({ "action": action }).to_string().into_bytes(),
    ]
}

fn task(body: &str) -> Multipart {
    vec![body.as_bytes().to_vec()]
}

fn recv(rx: &mut MemoryReceiver) -> Multipart {
    rx.recv_timeout(TIMEOUT)
        .unwrap()
        .expect("timed out waiting for a message")
}

/// Next `(worker, action)` control notice that is not a heartbeat ping
fn next_notice(rx: &mut MemoryReceiver) -> (String, String) {
    loop {
        let frames = recv(rx);
        let action = parse_action(&frames[2]);
        if action != "ping" {
            return (String::from_utf8_lossy(&frames[0]).into_owned(), action);
        }
    }
}

/// `(worker, body)` of the next delivered task
fn next_delivery(rx: &mut MemoryReceiver) -> (String, String) {
    let frames = recv(rx);
    assert_eq!(frames.len(), 2, "unexpected task framing: {:?}", frames);
    (
        String::from_utf8_lossy(&frames[0]).into_owned(),
        String::from_utf8_lossy(&frames[1]).into_owned(),
    )
}

fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(5));
    }
}

fn pair(a: &str, b: &str) -> (String, String) {
    (a.to_string(), b.to_string())
}

/// Joins the broker on a helper thread so a hang fails the test instead of
/// blocking it forever.
fn join_within_timeout(running: RunningBroker) -> service_queue_broker::StatsSnapshot {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(running.join());
    });
    rx.recv_timeout(TIMEOUT).expect("broker did not stop")
}

// ============================================================================
// Routing
// ============================================================================

#[test]
fn test_round_robin_deregistration_and_quit() {
    let mut b = start_broker(test_config());
    let registry = b.running.registry();

    for id in ["W1", "W2", "W3"] {
        b.workers.send(control(id, "service.register")).unwrap();
    }
    wait_until(|| registry.len() == 3);

    for i in 1..=6 {
        b.producer.send(task(&format!("T{}", i))).unwrap();
    }
    let first_round: Vec<_> = (0..6).map(|_| next_delivery(&mut b.delivered)).collect();
    assert_eq!(
        first_round,
        [
            pair("W1", "T1"),
            pair("W2", "T2"),
            pair("W3", "T3"),
            pair("W1", "T4"),
            pair("W2", "T5"),
            pair("W3", "T6"),
        ]
    );

    // W2 leaves and gets its confirmation
    b.workers.send(control("W2", "service.shutdown")).unwrap();
    assert_eq!(next_notice(&mut b.notices), pair("W2", "shutdown"));
    wait_until(|| registry.len() == 2);

    b.producer.send(task("T7")).unwrap();
    b.producer.send(task("T8")).unwrap();
    assert_eq!(next_delivery(&mut b.delivered), pair("W1", "T7"));
    assert_eq!(next_delivery(&mut b.delivered), pair("W3", "T8"));

    // Quit broadcasts shutdown to the remaining workers
    b.workers.send(control("admin", "quit")).unwrap();
    let stats = join_within_timeout(b.running);

    assert_eq!(next_notice(&mut b.notices), pair("W1", "shutdown"));
    assert_eq!(next_notice(&mut b.notices), pair("W3", "shutdown"));
    assert!(b.delivered.try_recv().is_none());
    assert!(registry.is_empty());

    assert_eq!(stats.tasks_received, 8);
    assert_eq!(stats.tasks_forwarded, 8);
    assert_eq!(stats.tasks_dropped, 0);
}

#[test]
fn test_task_waits_for_first_worker() {
    let mut b = start_broker(test_config());

    b.producer.send(task("early")).unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(b.delivered.try_recv().is_none());

    b.workers.send(control("W1", "service.register")).unwrap();
    assert_eq!(next_delivery(&mut b.delivered), pair("W1", "early"));

    b.running.interrupt().trigger();
    join_within_timeout(b.running);
}

#[test]
fn test_duplicate_registration_does_not_double_share() {
    let mut b = start_broker(test_config());
    let registry = b.running.registry();

    b.workers.send(control("W1", "service.register")).unwrap();
    b.workers.send(control("W1", "service.register")).unwrap();
    b.workers.send(control("W2", "service.register")).unwrap();
    wait_until(|| registry.len() == 2);

    for i in 1..=4 {
        b.producer.send(task(&format!("T{}", i))).unwrap();
    }
    let workers: Vec<_> = (0..4).map(|_| next_delivery(&mut b.delivered).0).collect();
    assert_eq!(workers, ["W1", "W2", "W1", "W2"]);

    b.running.interrupt().trigger();
    join_within_timeout(b.running);
}

// ============================================================================
// Control Plane Robustness
// ============================================================================

#[test]
fn test_malformed_and_unknown_messages_are_skipped() {
    let mut b = start_broker(test_config());
    let registry = b.running.registry();

    b.workers
        .send(vec![b"W1".to_vec(), b"{\"action\":\"service.register\"}".to_vec()])
        .unwrap();
    b.workers
        .send(vec![b"W1".to_vec(), Vec::new(), b"garbage".to_vec()])
        .unwrap();
    b.workers.send(control("W1", "dance")).unwrap();
    b.workers.send(control("W1", "service.register")).unwrap();
    wait_until(|| registry.len() == 1);

    b.producer.send(task("T1")).unwrap();
    assert_eq!(next_delivery(&mut b.delivered), pair("W1", "T1"));

    let stats = b.running.stats();
    assert_eq!(stats.malformed_messages, 1);
    assert_eq!(stats.unknown_actions, 2);

    b.running.interrupt().trigger();
    join_within_timeout(b.running);
}

// ============================================================================
// Heartbeats
// ============================================================================

#[test]
fn test_silent_worker_is_evicted_responsive_worker_kept() {
    let config = BrokerConfig {
        heartbeat: HeartbeatConfig {
            interval_secs: 1,
            timeout_secs: 1,
            tick_ms: 20,
        },
        ..test_config()
    };
    let b = start_broker(config);
    let registry = b.running.registry();

    // W1 answers every ping, W2 never does
    let mut notices = b.notices;
    let mut responder = b.workers.clone();
    let (seen_tx, seen_rx) = mpsc::channel();
    thread::spawn(move || {
        while let Ok(Some(frames)) = notices.recv_timeout(TIMEOUT) {
            let worker = String::from_utf8_lossy(&frames[0]).into_owned();
            let action = parse_action(&frames[2]);
            if worker == "W1" && action == "ping" {
                let _ = responder.send(control("W1", "pong"));
            }
            if seen_tx.send((worker, action)).is_err() {
                break;
            }
        }
    });

    let mut workers = b.workers;
    workers.send(control("W1", "service.register")).unwrap();
    workers.send(control("W2", "service.register")).unwrap();

    wait_until(|| registry.ids() == ["W1"]);
    let stats = b.running.stats();
    assert_eq!(stats.evictions, 1);
    assert!(stats.pongs_received >= 1);

    // The eviction notice is sent before the worker is removed, but the
    // responder thread may not have relayed it yet
    let mut seen = Vec::new();
    while !seen.contains(&pair("W2", "shutdown")) {
        seen.push(seen_rx.recv_timeout(TIMEOUT).expect("no eviction notice"));
    }
    assert!(seen.contains(&pair("W2", "ping")));
    assert!(!seen.contains(&pair("W1", "shutdown")));

    b.running.interrupt().trigger();
    join_within_timeout(b.running);
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn test_external_interrupt_stops_idle_broker() {
    let mut b = start_broker(test_config());
    let registry = b.running.registry();

    b.workers.send(control("W1", "service.register")).unwrap();
    wait_until(|| registry.len() == 1);

    // Dispatcher is idle, control loop polls, heartbeat sleeps
    b.running.interrupt().trigger();
    let stats = join_within_timeout(b.running);

    assert_eq!(next_notice(&mut b.notices), pair("W1", "shutdown"));
    assert!(registry.is_closed());
    assert_eq!(stats.tasks_received, 0);
}

#[test]
fn test_interrupt_wakes_dispatcher_blocked_on_empty_registry() {
    let b = start_broker(test_config());
    let mut producer = b.producer;

    // No workers: the dispatcher takes the task and blocks waiting for one
    producer.send(task("orphan")).unwrap();
    thread::sleep(Duration::from_millis(100));

    b.running.interrupt().trigger();
    let stats = join_within_timeout(b.running);
    assert_eq!(stats.tasks_received, 1);
    assert_eq!(stats.tasks_dropped, 1);
    assert_eq!(stats.tasks_forwarded, 0);
}

#[test]
fn test_closed_control_endpoint_stops_broker() {
    let b = start_broker(test_config());
    let interrupt = b.running.interrupt();

    drop(b.workers);
    let stats = join_within_timeout(b.running);
    assert!(interrupt.is_triggered());
    assert_eq!(stats.tasks_received, 0);
}

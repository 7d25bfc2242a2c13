use std::time::{Duration, Instant};

use crate::config::HeartbeatConfig;

/// Heartbeat state of a worker at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Answered its last ping recently enough; nothing to do
    Alive,
    /// A ping is outstanding and still within the timeout
    AwaitingPong,
    /// Never pinged, or the last answered ping is older than the interval
    PingDue,
    /// A ping went unanswered for longer than the timeout
    Expired,
}

/// A registered worker with its heartbeat timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    /// Transport identity on the control and output endpoints
    pub id: String,
    pub last_ping_sent_at: Option<Instant>,
    pub last_pong_received_at: Option<Instant>,
}

impl Worker {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            last_ping_sent_at: None,
            last_pong_received_at: None,
        }
    }

    /// Whether no ping is waiting for a pong.
    pub fn ping_answered(&self) -> bool {
        match (self.last_ping_sent_at, self.last_pong_received_at) {
            (None, _) => true,
            (Some(ping), Some(pong)) => pong >= ping,
            (Some(_), None) => false,
        }
    }

    /// Most recent heartbeat event: the pong if it answered the last ping,
    /// otherwise the ping itself. `None` until the first ping.
    pub fn last_activity(&self) -> Option<Instant> {
        let ping = self.last_ping_sent_at?;
        match self.last_pong_received_at {
            Some(pong) if pong >= ping => Some(pong),
            _ => Some(ping),
        }
    }

    /// Time between the last ping and the pong that answered it.
    pub fn round_trip(&self) -> Option<Duration> {
        match (self.last_ping_sent_at, self.last_pong_received_at) {
            (Some(ping), Some(pong)) if pong >= ping => Some(pong - ping),
            _ => None,
        }
    }

    /// Classifies the worker for the heartbeat scan at `now`.
    ///
    /// An outstanding ping is never re-sent; the worker either answers within
    /// the timeout or expires.
    pub fn liveness(&self, now: Instant, config: &HeartbeatConfig) -> Liveness {
        let Some(ping) = self.last_ping_sent_at else {
            return Liveness::PingDue;
        };

        let since_ping = now.saturating_duration_since(ping);
        if !self.ping_answered() {
            if since_ping > config.timeout() {
                Liveness::Expired
            } else {
                Liveness::AwaitingPong
            }
        } else if since_ping > config.interval() {
            Liveness::PingDue
        } else {
            Liveness::Alive
        }
    }
}

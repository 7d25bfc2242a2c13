//! OS signal handling.
//!
//! On Unix, SIGINT, SIGTERM and SIGHUP stop the process. Elsewhere only
//! Ctrl-C is handled. Handlers are installed eagerly by
//! [`ShutdownSignals::install`], so a signal that arrives before anything
//! awaits it is not lost.

use service_queue_broker::Interrupt;
use std::io;
use tracing::{error, info};

#[cfg(unix)]
pub struct ShutdownSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
    sighup: tokio::signal::unix::Signal,
}

#[cfg(not(unix))]
pub struct ShutdownSignals {
    _private: (),
}

impl ShutdownSignals {
    /// Installs the handlers. Must be called inside a Tokio runtime.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sighup: signal(SignalKind::hangup())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self { _private: () })
    }

    /// Completes with the name of the first signal received.
    #[cfg(unix)]
    pub async fn recv(mut self) -> io::Result<&'static str> {
        let name = tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sighup.recv() => "SIGHUP",
        };
        Ok(name)
    }

    #[cfg(not(unix))]
    pub async fn recv(self) -> io::Result<&'static str> {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl-C")
    }

    /// Waits for a signal and triggers `interrupt`.
    pub async fn trigger(self, interrupt: Interrupt) {
        match self.recv().await {
            Ok(name) => {
                info!("Received {}, shutting down", name);
                interrupt.trigger();
            }
            Err(e) => error!("Failed to listen for shutdown signals: {}", e),
        }
    }
}

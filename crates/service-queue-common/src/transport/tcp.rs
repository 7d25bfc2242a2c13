//! TCP endpoints.
//!
//! Server side:
//! - [`PullSocket`]: fan-in from any number of producers into one queue
//! - [`RouterSocket`]: identity-addressed, bidirectional; every connecting
//!   peer first sends a single-frame identity greeting
//!
//! Client side:
//! - [`PushSocket`]: sends messages to a `PullSocket`
//! - [`DealerSocket`]: greets a `RouterSocket` with an identity, then sends
//!   and receives messages
//!
//! Every endpoint string may carry an optional `tcp://` scheme.

use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::protocol::error::{BrokerError, Result};
use crate::transport::codec::FrameCodec;
use crate::transport::{recv_queued, Inbound, Multipart, Outbound};

/// Timeout for establishing client connections (5 seconds)
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Strips an optional `tcp://` scheme from an endpoint.
pub fn socket_address(endpoint: &str) -> &str {
    endpoint.strip_prefix("tcp://").unwrap_or(endpoint)
}

fn bind_listener(endpoint: &str) -> Result<(TcpListener, SocketAddr)> {
    let listener =
        TcpListener::bind(socket_address(endpoint)).map_err(|source| BrokerError::Bind {
            endpoint: endpoint.to_string(),
            source,
        })?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

/// Connects to the first resolved address that accepts.
fn connect(endpoint: &str) -> Result<TcpStream> {
    let addr = socket_address(endpoint);
    let socket_addrs = addr
        .to_socket_addrs()
        .map_err(|e| BrokerError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(BrokerError::Connection(format!(
        "Failed to connect to {}: {}",
        addr,
        last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no addresses resolved".to_string())
    )))
}

fn spawn_named<F>(name: String, f: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name).spawn(f)?;
    Ok(())
}

/// Forwards every message read from `stream` into `sender` until either side closes.
fn pump_messages(stream: TcpStream, sender: Sender<Multipart>) {
    let mut reader = BufReader::new(stream);
    loop {
        match FrameCodec::read_message(&mut reader) {
            Ok(Some(message)) => {
                if sender.send(message).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!("Closing connection after read failure: {}", e);
                return;
            }
        }
    }
}

// ============================================================================
// Pull
// ============================================================================

/// Fan-in endpoint: accepts any number of producers.
pub struct PullSocket {
    receiver: Receiver<Multipart>,
    local_addr: SocketAddr,
}

impl PullSocket {
    /// Binds the endpoint and starts accepting producers in the background.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Bind` if the address cannot be bound.
    pub fn bind(endpoint: &str) -> Result<Self> {
        let (listener, local_addr) = bind_listener(endpoint)?;
        let (sender, receiver) = mpsc::channel();

        spawn_named(format!("pull-accept-{}", local_addr.port()), move || {
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("Failed to accept producer connection: {}", e);
                        continue;
                    }
                };
                let sender = sender.clone();
                if let Err(e) = spawn_named("pull-conn".to_string(), move || {
                    pump_messages(stream, sender)
                }) {
                    warn!("Failed to start producer reader: {}", e);
                }
            }
        })?;

        Ok(Self {
            receiver,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Inbound for PullSocket {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Multipart>> {
        recv_queued(&self.receiver, timeout)
    }
}

// ============================================================================
// Router
// ============================================================================

struct Peer {
    connection: u64,
    outbox: SyncSender<Multipart>,
}

type PeerTable = Arc<Mutex<HashMap<String, Peer>>>;

/// Identity-addressed endpoint.
///
/// Inbound messages are delivered as `[identity][frames...]`; outbound
/// messages are routed by their first frame. Each peer has its own bounded
/// outbound queue of `high_water_mark` messages.
pub struct RouterSocket;

impl RouterSocket {
    /// Binds the endpoint and returns its receiving and sending halves.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Bind` if the address cannot be bound.
    pub fn bind(endpoint: &str, high_water_mark: usize) -> Result<(RouterReceiver, RouterSender)> {
        let (listener, local_addr) = bind_listener(endpoint)?;
        let peers: PeerTable = Arc::default();
        let (sender, receiver) = mpsc::channel();

        let table = peers.clone();
        spawn_named(format!("router-accept-{}", local_addr.port()), move || {
            let mut next_connection = 0u64;
            for stream in listener.incoming() {
                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!("Failed to accept peer connection: {}", e);
                        continue;
                    }
                };
                next_connection += 1;
                let connection = next_connection;
                let peers = table.clone();
                let inbound = sender.clone();
                if let Err(e) = spawn_named("router-conn".to_string(), move || {
                    serve_peer(stream, connection, peers, inbound, high_water_mark)
                }) {
                    warn!("Failed to start peer reader: {}", e);
                }
            }
        })?;

        Ok((
            RouterReceiver {
                receiver,
                local_addr,
            },
            RouterSender { peers },
        ))
    }
}

/// Runs one peer connection: greeting, writer thread, then the read loop.
fn serve_peer(
    stream: TcpStream,
    connection: u64,
    peers: PeerTable,
    inbound: Sender<Multipart>,
    high_water_mark: usize,
) {
    let read_half = match stream.try_clone() {
        Ok(read_half) => read_half,
        Err(e) => {
            warn!("Failed to split peer connection: {}", e);
            return;
        }
    };
    let mut reader = BufReader::new(read_half);

    let identity = match FrameCodec::read_message(&mut reader) {
        Ok(Some(frames)) if frames.len() == 1 && !frames[0].is_empty() => {
            String::from_utf8_lossy(&frames[0]).into_owned()
        }
        Ok(Some(frames)) => {
            warn!(
                "Rejecting peer: identity greeting must be one non-empty frame, got {} frames",
                frames.len()
            );
            return;
        }
        Ok(None) => return,
        Err(e) => {
            warn!("Rejecting peer: failed to read identity greeting: {}", e);
            return;
        }
    };

    let (outbox, queue) = mpsc::sync_channel::<Multipart>(high_water_mark);
    let writer_identity = identity.clone();
    if let Err(e) = spawn_named("router-write".to_string(), move || {
        let mut writer = BufWriter::new(stream);
        for message in queue {
            if let Err(e) = FrameCodec::write_message(&mut writer, &message) {
                warn!("Failed to write to peer {}: {}", writer_identity, e);
                break;
            }
        }
        let _ = writer.get_ref().shutdown(Shutdown::Both);
    }) {
        warn!("Failed to start writer for peer {}: {}", identity, e);
        return;
    }

    let previous = peers
        .lock()
        .insert(identity.clone(), Peer { connection, outbox });
    if let Some(previous) = previous {
        info!(
            "Peer {} reconnected, replacing connection {}",
            identity, previous.connection
        );
    }
    debug!("Peer {} connected", identity);

    loop {
        match FrameCodec::read_message(&mut reader) {
            Ok(Some(mut message)) => {
                message.insert(0, identity.as_bytes().to_vec());
                if inbound.send(message).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Read from peer {} failed: {}", identity, e);
                break;
            }
        }
    }

    // A newer connection with the same identity may already own the entry.
    let mut table = peers.lock();
    if table.get(&identity).map(|peer| peer.connection) == Some(connection) {
        table.remove(&identity);
    }
    drop(table);
    debug!("Peer {} disconnected", identity);
}

pub struct RouterReceiver {
    receiver: Receiver<Multipart>,
    local_addr: SocketAddr,
}

impl RouterReceiver {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Inbound for RouterReceiver {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Multipart>> {
        recv_queued(&self.receiver, timeout)
    }
}

#[derive(Clone)]
pub struct RouterSender {
    peers: PeerTable,
}

impl RouterSender {
    /// Whether a peer with `identity` is currently connected.
    pub fn has_peer(&self, identity: &str) -> bool {
        self.peers.lock().contains_key(identity)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }
}

impl Outbound for RouterSender {
    /// Routes `[identity][body...]` to the peer that greeted with `identity`.
    ///
    /// Delivery is best effort. A peer that has not connected yet, or whose
    /// connection dropped, gets [`BrokerError::UnknownPeer`] and the message
    /// is discarded; nothing is buffered for it.
    fn send(&mut self, mut message: Multipart) -> Result<()> {
        if message.len() < 2 {
            return Err(BrokerError::InvalidMessage(format!(
                "routed message needs an identity and a body, got {} frames",
                message.len()
            )));
        }

        let body = message.split_off(1);
        let identity = String::from_utf8_lossy(&message[0]).into_owned();

        let mut peers = self.peers.lock();
        let peer = peers
            .get(&identity)
            .ok_or_else(|| BrokerError::UnknownPeer(identity.clone()))?;

        match peer.outbox.try_send(body) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(BrokerError::WouldBlock(identity)),
            Err(TrySendError::Disconnected(_)) => {
                peers.remove(&identity);
                Err(BrokerError::UnknownPeer(identity))
            }
        }
    }
}

// ============================================================================
// Clients
// ============================================================================

/// Producer side of a [`PullSocket`].
pub struct PushSocket {
    writer: BufWriter<TcpStream>,
}

impl PushSocket {
    pub fn connect(endpoint: &str) -> Result<Self> {
        let stream = connect(endpoint)?;
        Ok(Self {
            writer: BufWriter::new(stream),
        })
    }
}

impl Outbound for PushSocket {
    fn send(&mut self, message: Multipart) -> Result<()> {
        FrameCodec::write_message(&mut self.writer, &message)
    }
}

/// Peer side of a [`RouterSocket`], known to the router by `identity`.
pub struct DealerSocket {
    identity: String,
    writer: BufWriter<TcpStream>,
    receiver: Receiver<Multipart>,
}

impl DealerSocket {
    /// Connects and sends the identity greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if `identity` is empty or the connection fails.
    pub fn connect(endpoint: &str, identity: &str) -> Result<Self> {
        if identity.is_empty() {
            return Err(BrokerError::InvalidMessage(
                "dealer identity must not be empty".to_string(),
            ));
        }

        let stream = connect(endpoint)?;
        let read_half = stream.try_clone()?;
        let mut writer = BufWriter::new(stream);
        FrameCodec::write_message(&mut writer, &[identity.as_bytes().to_vec()])?;

        let (sender, receiver) = mpsc::channel();
        spawn_named(format!("dealer-{}", identity), move || {
            pump_messages(read_half, sender)
        })?;

        Ok(Self {
            identity: identity.to_string(),
            writer,
            receiver,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl Outbound for DealerSocket {
    fn send(&mut self, message: Multipart) -> Result<()> {
        FrameCodec::write_message(&mut self.writer, &message)
    }
}

impl Inbound for DealerSocket {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Multipart>> {
        recv_queued(&self.receiver, timeout)
    }
}

impl Drop for DealerSocket {
    fn drop(&mut self) {
        // Unblocks the reader thread; written data is already flushed.
        let _ = self.writer.get_ref().shutdown(Shutdown::Both);
    }
}

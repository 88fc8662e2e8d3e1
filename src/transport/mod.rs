//! Network transports carrying OSC packets to and from the console
//!
//! One transport owns one socket (UDP) or stream (TCP). The receive path runs
//! as a single spawned task per open transport and hands decoded messages to
//! an [`InboundHandler`].

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::error::TransportError;
use crate::osc::{decode_packet, Framing, Message};

pub mod session;
pub mod tcp;
pub mod udp;

pub use session::TransportSession;
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Callback receiving every decoded inbound message
pub type InboundHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Callback notified on every connection state change
pub type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Protocol used to reach the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportMode {
    #[default]
    #[serde(rename = "udp")]
    Udp,
    /// SLIP-framed stream
    #[serde(rename = "tcp")]
    Tcp,
    /// Size-prefixed stream
    #[serde(rename = "tcp-raw")]
    TcpRaw,
}

impl TransportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
            Self::TcpRaw => "tcp-raw",
        }
    }

    /// Stream framing for connection-oriented modes
    pub fn framing(self) -> Option<Framing> {
        match self {
            Self::Udp => None,
            Self::Tcp => Some(Framing::Slip),
            Self::TcpRaw => Some(Framing::LengthPrefixed),
        }
    }

    pub fn is_stream(self) -> bool {
        self.framing().is_some()
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Transport trait - UDP and TCP implement this
///
/// All methods take `&self`; implementations use interior mutability.
#[async_trait]
pub trait Transport: Send + Sync {
    fn mode(&self) -> TransportMode;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Local address of the open socket, if any
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Open the socket/stream. Opening an open transport is a no-op.
    async fn open(&self) -> Result<(), TransportError>;

    /// Write one encoded OSC packet. Never retried.
    async fn send_packet(&self, packet: &[u8]) -> Result<(), TransportError>;

    /// Release the socket/stream and stop the receive task.
    /// Closing a closed transport is a no-op.
    async fn close(&self);
}

/// Settings shared by every transport kind
#[derive(Clone)]
pub struct TransportOptions {
    pub target: SocketAddr,
    /// Deliver inbound messages to `inbound`
    pub listen: bool,
    /// Local UDP port to bind (0 or None picks an ephemeral port)
    pub local_port: Option<u16>,
    pub inbound: InboundHandler,
    pub on_state: Option<StateCallback>,
    pub ledger: SocketLedger,
}

/// Build the transport for a mode
pub fn build(mode: TransportMode, options: TransportOptions) -> Box<dyn Transport> {
    match mode.framing() {
        None => Box::new(UdpTransport::new(options)),
        Some(framing) => Box::new(TcpTransport::new(mode, framing, options)),
    }
}

/// Shared connection state with change notification
#[derive(Clone)]
pub(crate) struct StateCell {
    label: &'static str,
    state: Arc<RwLock<ConnectionState>>,
    on_change: Option<StateCallback>,
}

impl StateCell {
    pub(crate) fn new(label: &'static str, on_change: Option<StateCallback>) -> Self {
        Self {
            label,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            on_change,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        self.state.read().clone()
    }

    pub(crate) fn set(&self, new: ConnectionState) {
        let changed = {
            let mut state = self.state.write();
            if *state == new {
                false
            } else {
                *state = new.clone();
                true
            }
        };

        if changed {
            debug!("{} transport state -> {}", self.label, new);
            if let Some(callback) = &self.on_change {
                callback(new);
            }
        }
    }
}

/// Counts sockets and streams currently held open
#[derive(Clone, Default)]
pub struct SocketLedger {
    open: Arc<AtomicUsize>,
}

impl SocketLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened socket; the count drops with the lease
    pub fn lease(&self) -> SocketLease {
        self.open.fetch_add(1, Ordering::SeqCst);
        SocketLease {
            open: Arc::clone(&self.open),
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Held alongside an open socket
pub struct SocketLease {
    open: Arc<AtomicUsize>,
}

impl Drop for SocketLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decode one inbound packet and hand each message to the handler
///
/// Malformed packets are logged and dropped.
pub(crate) fn dispatch_packet(bytes: &[u8], from: Option<SocketAddr>, inbound: &InboundHandler) {
    match decode_packet(bytes) {
        Ok(messages) => {
            for message in messages {
                trace!("OSC RX <- {:?}: {}", from, message);
                inbound(message);
            }
        },
        Err(e) => {
            debug!(
                "Dropping malformed packet ({} bytes) from {:?}: {}",
                bytes.len(),
                from,
                e
            );
        },
    }
}

/// Wildcard bind address in the target's address family
pub(crate) fn wildcard_for(target: &SocketAddr, port: u16) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::from(([0, 0, 0, 0], port)),
        SocketAddr::V6(_) => SocketAddr::from(([0u16; 8], port)),
    }
}

pub(crate) fn log_opened(mode: TransportMode, target: SocketAddr, local: Option<SocketAddr>) {
    info!("✅ OSC {} transport open -> {} (local {:?})", mode, target, local);
}

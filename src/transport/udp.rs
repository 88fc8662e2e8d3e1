//! UDP transport: one datagram per OSC packet

use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    dispatch_packet, log_opened, wildcard_for, ConnectionState, InboundHandler, SocketLease,
    StateCell, Transport, TransportMode, TransportOptions,
};
use crate::error::TransportError;

/// Largest datagram we read
const RECV_BUFFER_SIZE: usize = 65_536;

struct UdpLink {
    socket: Arc<UdpSocket>,
    local: Option<SocketAddr>,
    reader: Option<JoinHandle<()>>,
    _lease: SocketLease,
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.abort();
        }
    }
}

/// Sends datagrams to the target; optionally listens for replies on a local port
pub struct UdpTransport {
    options: TransportOptions,
    state: StateCell,
    link: Mutex<Option<UdpLink>>,
}

impl UdpTransport {
    pub fn new(options: TransportOptions) -> Self {
        let state = StateCell::new("udp", options.on_state.clone());
        Self {
            options,
            state,
            link: Mutex::new(None),
        }
    }

    fn socket(&self) -> Result<Arc<UdpSocket>, TransportError> {
        match self.link.lock().as_ref() {
            Some(link) => Ok(Arc::clone(&link.socket)),
            None => Err(TransportError::NotConnected(self.state.get())),
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Udp
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.link.lock().as_ref().and_then(|link| link.local)
    }

    async fn open(&self) -> Result<(), TransportError> {
        if self.link.lock().is_some() {
            return Ok(());
        }

        let port = if self.options.listen {
            self.options.local_port.unwrap_or(0)
        } else {
            0
        };
        let bind_addr = wildcard_for(&self.options.target, port);

        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(socket) => Arc::new(socket),
            Err(source) => {
                self.state.set(ConnectionState::Failed(source.to_string()));
                return Err(TransportError::Bind {
                    addr: bind_addr,
                    source,
                });
            },
        };
        let local = socket.local_addr().ok();

        let reader = if self.options.listen {
            Some(tokio::spawn(recv_loop(
                Arc::clone(&socket),
                self.options.inbound.clone(),
            )))
        } else {
            debug!("UDP listening disabled; inbound datagrams are ignored");
            None
        };

        *self.link.lock() = Some(UdpLink {
            socket,
            local,
            reader,
            _lease: self.options.ledger.lease(),
        });

        log_opened(TransportMode::Udp, self.options.target, local);
        self.state.set(ConnectionState::Connected);
        Ok(())
    }

    async fn send_packet(&self, packet: &[u8]) -> Result<(), TransportError> {
        let socket = self.socket()?;
        socket.send_to(packet, self.options.target).await?;
        Ok(())
    }

    async fn close(&self) {
        let link = self.link.lock().take();
        let Some(mut link) = link else {
            return;
        };

        if let Some(reader) = link.reader.take() {
            reader.abort();
            let _ = reader.await;
        }
        drop(link);

        debug!("UDP socket released");
        self.state.set(ConnectionState::Disconnected);
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, inbound: InboundHandler) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, from)) => dispatch_packet(&buf[..len], Some(from), &inbound),
            Err(e) => {
                // ICMP port-unreachable surfaces here on some platforms
                warn!("UDP receive error: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            },
        }
    }
}

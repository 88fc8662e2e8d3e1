//! TCP transport: one stream, packets framed with SLIP or a size prefix

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    dispatch_packet, log_opened, ConnectionState, InboundHandler, SocketLease, StateCell,
    Transport, TransportMode, TransportOptions,
};
use crate::error::TransportError;
use crate::osc::{FrameDecoder, Framing};

const READ_CHUNK: usize = 8192;

struct TcpLink {
    writer: OwnedWriteHalf,
    local: Option<SocketAddr>,
    reader: JoinHandle<()>,
    _lease: SocketLease,
}

impl TcpLink {
    async fn release(mut self) {
        self.reader.abort();
        let _ = (&mut self.reader).await;
        if let Err(e) = self.writer.shutdown().await {
            debug!("Stream shutdown: {}", e);
        }
    }
}

impl Drop for TcpLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Stream transport to the console
pub struct TcpTransport {
    mode: TransportMode,
    framing: Framing,
    options: TransportOptions,
    state: StateCell,
    link: Mutex<Option<TcpLink>>,
    local: parking_lot::Mutex<Option<SocketAddr>>,
}

impl TcpTransport {
    pub fn new(mode: TransportMode, framing: Framing, options: TransportOptions) -> Self {
        let state = StateCell::new(mode.as_str(), options.on_state.clone());
        Self {
            mode,
            framing,
            options,
            state,
            link: Mutex::new(None),
            local: parking_lot::Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn mode(&self) -> TransportMode {
        self.mode
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        *self.local.lock()
    }

    async fn open(&self) -> Result<(), TransportError> {
        let mut link = self.link.lock().await;
        if link.is_some() && self.state.get() == ConnectionState::Connected {
            return Ok(());
        }

        // Stream left over from a peer disconnect
        if let Some(stale) = link.take() {
            stale.release().await;
        }

        let target = self.options.target;
        self.state.set(ConnectionState::Connecting);
        info!("🔌 Connecting to {} ({})", target, self.mode);

        let stream = match TcpStream::connect(target).await {
            Ok(stream) => stream,
            Err(source) => {
                warn!("❌ Connection to {} failed: {}", target, source);
                self.state.set(ConnectionState::Failed(source.to_string()));
                return Err(TransportError::Connect {
                    addr: target,
                    source,
                });
            },
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let local = stream.local_addr().ok();
        let (read_half, write_half) = stream.into_split();

        self.state.set(ConnectionState::Connected);
        let reader = tokio::spawn(read_loop(
            read_half,
            self.framing,
            self.options.listen,
            self.options.inbound.clone(),
            self.state.clone(),
        ));

        *link = Some(TcpLink {
            writer: write_half,
            local,
            reader,
            _lease: self.options.ledger.lease(),
        });
        *self.local.lock() = local;

        log_opened(self.mode, target, local);
        Ok(())
    }

    async fn send_packet(&self, packet: &[u8]) -> Result<(), TransportError> {
        // Checked before taking the lock so a send during connect fails fast
        let state = self.state.get();
        if state != ConnectionState::Connected {
            return Err(TransportError::NotConnected(state));
        }

        let mut guard = self.link.lock().await;
        let Some(link) = guard.as_mut() else {
            return Err(TransportError::NotConnected(self.state.get()));
        };

        let framed = self.framing.frame(packet);
        if let Err(e) = link.writer.write_all(&framed).await {
            warn!("TCP write to {} failed: {}", self.options.target, e);
            self.state.set(ConnectionState::Disconnected);
            return Err(e.into());
        }
        Ok(())
    }

    async fn close(&self) {
        let link = self.link.lock().await.take();
        let Some(link) = link else {
            return;
        };

        debug!("Closing {} stream (local {:?})", self.mode, link.local);
        link.release().await;
        *self.local.lock() = None;
        self.state.set(ConnectionState::Disconnected);
    }
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    framing: Framing,
    listen: bool,
    inbound: InboundHandler,
    state: StateCell,
) {
    let mut decoder = FrameDecoder::new(framing);
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => {
                info!("Console closed the connection");
                state.set(ConnectionState::Disconnected);
                return;
            },
            Ok(len) => {
                decoder.push(&buf[..len]);
                while let Some(frame) = decoder.next_frame() {
                    match frame {
                        Ok(packet) if listen => dispatch_packet(&packet, None, &inbound),
                        Ok(_) => {},
                        Err(e) => debug!("Dropping bad frame: {}", e),
                    }
                }
            },
            Err(e) => {
                warn!("TCP read error: {}", e);
                state.set(ConnectionState::Disconnected);
                return;
            },
        }
    }
}

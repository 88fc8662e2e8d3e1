//! TransportSession - one open transport bound to one resolved target

use std::net::SocketAddr;
use tracing::debug;

use super::{build, ConnectionState, Transport, TransportMode, TransportOptions};
use crate::error::TransportError;
use crate::osc::{encode_message, OscArg};

/// A transport plus the OSC encoding step in front of it
pub struct TransportSession {
    transport: Box<dyn Transport>,
    target: SocketAddr,
}

impl TransportSession {
    pub fn new(mode: TransportMode, options: TransportOptions) -> Self {
        let target = options.target;
        Self {
            transport: build(mode, options),
            target,
        }
    }

    pub fn mode(&self) -> TransportMode {
        self.transport.mode()
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    pub async fn open(&self) -> Result<(), TransportError> {
        self.transport.open().await
    }

    /// Encode and send one message; failures are returned, never retried
    pub async fn send(&self, path: &str, args: &[OscArg]) -> Result<(), TransportError> {
        let packet = encode_message(path, args)?;
        self.transport.send_packet(&packet).await?;
        debug!(
            "OSC TX [{}] -> {} {} ({} args)",
            self.mode(),
            self.target,
            path,
            args.len()
        );
        Ok(())
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}

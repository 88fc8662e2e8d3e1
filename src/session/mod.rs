//! SessionController - owns the single live transport session
//!
//! Every configuration change tears the current session down completely
//! before a replacement is built, so at most one socket is ever open.
//! Rebuilds are serialized by their own lock; the session slot itself is
//! only held for the instant it takes to swap or clone the handle, so sends
//! and status reads never wait on a resolve or a connect.
//! Received messages flow into the feedback cache and channel variables.

mod lifecycle;
pub use lifecycle::RESEND_PATH;
pub mod status;

#[cfg(test)]
mod tests;

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::actions;
use crate::config::{ConnectionConfig, UnitsConfig};
use crate::error::{Result, SessionError};
use crate::feedback::{FeedbackCache, FeedbackQuery};
use crate::osc::{parse_arguments, Message, OscArg};
use crate::resolver::{DnsLookup, HostResolver, SystemDns};
use crate::transport::{ConnectionState, SocketLedger, TransportSession};
use crate::variables::ChannelVariables;

pub use status::{InstanceStatus, StatusCallback};
use status::StatusHub;

/// Callback receiving every inbound message after it was cached
pub type ReceiveCallback = Arc<dyn Fn(&Message) + Send + Sync>;

type SessionSlot = Arc<RwLock<Option<Arc<TransportSession>>>>;

/// Where inbound messages land
#[derive(Clone)]
struct InboundSink {
    cache: FeedbackCache,
    variables: ChannelVariables,
    callbacks: Arc<RwLock<Vec<ReceiveCallback>>>,
    generation: Arc<AtomicU64>,
}

impl InboundSink {
    fn deliver(&self, message: Message) {
        trace!("Caching {}", message);
        self.cache.store(&message.path, message.args.clone());
        self.notify(&message);
    }

    /// Deliver a message read by the session of `generation`
    ///
    /// The generation is checked under the cache lock, so nothing from a
    /// replaced session lands after the rebuild cleared the cache.
    fn deliver_from(&self, generation: u64, message: Message) -> bool {
        let current = &self.generation;
        let stored = self.cache.store_if(&message.path, message.args.clone(), || {
            current.load(Ordering::SeqCst) == generation
        });
        if !stored {
            trace!("Dropping {} from a replaced session", message);
            return false;
        }
        trace!("Cached {}", message);
        self.notify(&message);
        true
    }

    fn notify(&self, message: &Message) {
        self.variables.record(message);

        let callbacks = self.callbacks.read().clone();
        for callback in &callbacks {
            callback(message);
        }
    }
}

/// Gateway instance: configuration, session, cache and status
#[derive(Clone)]
pub struct SessionController {
    session: SessionSlot,
    rebuild: Arc<Mutex<()>>,
    connection: Arc<RwLock<Option<ConnectionConfig>>>,
    units: Arc<RwLock<UnitsConfig>>,
    target: Arc<RwLock<Option<SocketAddr>>>,
    resolver: Arc<HostResolver<Arc<dyn DnsLookup>>>,
    inbound: InboundSink,
    status: StatusHub,
    ledger: SocketLedger,
    generation: Arc<AtomicU64>,
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController {
    /// Controller using the system resolver
    pub fn new() -> Self {
        Self::with_dns(Arc::new(SystemDns))
    }

    /// Controller with a custom name lookup backend
    pub fn with_dns(dns: Arc<dyn DnsLookup>) -> Self {
        let generation = Arc::new(AtomicU64::new(0));
        Self {
            session: Arc::new(RwLock::new(None)),
            rebuild: Arc::new(Mutex::new(())),
            connection: Arc::new(RwLock::new(None)),
            units: Arc::new(RwLock::new(UnitsConfig::default())),
            target: Arc::new(RwLock::new(None)),
            resolver: Arc::new(HostResolver::with_lookup(dns)),
            inbound: InboundSink {
                cache: FeedbackCache::new(),
                variables: ChannelVariables::new(),
                callbacks: Arc::new(RwLock::new(Vec::new())),
                generation: Arc::clone(&generation),
            },
            status: StatusHub::new(),
            ledger: SocketLedger::new(),
            generation,
        }
    }

    fn current_session(&self) -> Option<Arc<TransportSession>> {
        self.session.read().clone()
    }

    /// Encode and send one message on the live session
    ///
    /// Never waits for a rebuild: while the session is still connecting the
    /// transport answers `NotConnected`, and with no session at all this is
    /// `NoSession`.
    pub async fn send(&self, path: &str, args: Vec<OscArg>) -> Result<()> {
        let session = self.current_session().ok_or(SessionError::NoSession)?;
        session.send(path, &args).await?;

        let message = Message::new(path, args);
        self.inbound.variables.record(&message);
        Ok(())
    }

    /// Send with arguments given in the multi-argument text syntax
    pub async fn send_text(&self, path: &str, arguments: &str) -> Result<()> {
        let args = parse_arguments(arguments)?;
        self.send(path, args).await
    }

    /// Store an inbound message as if it had arrived on the socket
    pub fn on_receive(&self, message: Message) {
        self.inbound.deliver(message);
    }

    /// Subscribe to inbound messages
    pub fn subscribe_receive(&self, callback: ReceiveCallback) {
        self.inbound.callbacks.write().push(callback);
    }

    /// Last arguments received on `path`
    pub fn lookup(&self, path: &str) -> Option<Vec<OscArg>> {
        self.inbound.cache.lookup(path)
    }

    /// One-shot read of `path`; see [`FeedbackCache::consume_once`]
    pub fn consume_once(&self, path: &str) -> bool {
        self.inbound.cache.consume_once(path)
    }

    pub fn evaluate(&self, query: &FeedbackQuery) -> bool {
        query.evaluate(&self.inbound.cache)
    }

    /// Run a table action, returning the messages that were sent
    pub async fn execute_action(
        &self,
        id: &str,
        params: &HashMap<String, String>,
        value: &str,
    ) -> Result<Vec<Message>> {
        let def = actions::find(id).ok_or_else(|| SessionError::UnknownAction(id.to_string()))?;
        let units = *self.units.read();
        let messages = actions::build_messages(def, params, value, &units)?;

        debug!("Action {} -> {} message(s)", id, messages.len());
        for message in &messages {
            self.send(&message.path, message.args.clone()).await?;
        }
        Ok(messages)
    }

    pub fn cache(&self) -> &FeedbackCache {
        &self.inbound.cache
    }

    pub fn variables(&self) -> &ChannelVariables {
        &self.inbound.variables
    }

    pub fn status(&self) -> InstanceStatus {
        self.status.current()
    }

    /// Subscribe to status changes; the current status is delivered immediately
    pub fn subscribe_status(&self, callback: StatusCallback) {
        debug!("New instance status subscription");
        self.status.subscribe(callback);
    }

    /// State of the live transport, if a session exists
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.current_session().map(|s| s.state())
    }

    /// Resolved address of the console
    pub fn target(&self) -> Option<SocketAddr> {
        *self.target.read()
    }

    pub fn connection_config(&self) -> Option<ConnectionConfig> {
        self.connection.read().clone()
    }

    /// Sockets and streams currently held open
    pub fn live_sockets(&self) -> usize {
        self.ledger.open_count()
    }

    /// Incremented on every rebuild and on shutdown
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

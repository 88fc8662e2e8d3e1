//! Session build, teardown and reconnection

use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::{InstanceStatus, SessionController};
use crate::config::{AppConfig, ConnectionConfig};
use crate::error::Result;
use crate::transport::{
    ConnectionState, InboundHandler, StateCallback, TransportOptions, TransportSession,
};

/// Asks the console to re-emit its current state
pub const RESEND_PATH: &str = "/console/resend";

/// Everything a reconnect task needs, without keeping the session alive.
/// One per session generation.
#[derive(Clone)]
struct ReconnectContext {
    slot: Weak<RwLock<Option<Arc<TransportSession>>>>,
    generation: Arc<AtomicU64>,
    active: Arc<AtomicBool>,
    polling: bool,
}

impl SessionController {
    /// First configuration of the instance
    pub async fn init(&self, config: &AppConfig) -> Result<()> {
        info!(
            "🚀 Starting OSC gateway for {}:{} ({})",
            config.connection.host, config.connection.target_port, config.connection.protocol
        );
        self.config_updated(config).await
    }

    /// Apply a new configuration
    ///
    /// The previous session is closed and its socket released before
    /// anything else happens. The new session is visible to senders while it
    /// connects, so a send in that window fails with `NotConnected` instead
    /// of waiting. Failures are reported through the instance status as well
    /// as the returned error.
    pub async fn config_updated(&self, config: &AppConfig) -> Result<()> {
        let _rebuild = self.rebuild.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let previous = self.session.write().take();
        if let Some(previous) = previous {
            info!("Closing {} session to {}", previous.mode(), previous.target());
            previous.close().await;
        }

        // Late deliveries from the old session fail their generation check
        // under the cache lock, so nothing survives this
        let dropped = self.inbound.cache.clear();
        if dropped > 0 {
            debug!("Cleared {} cached feedback path(s)", dropped);
        }

        let conn = config.connection.clone();
        *self.connection.write() = Some(conn.clone());
        *self.units.write() = config.units;
        *self.target.write() = None;

        let ip = match self.resolver.resolve(&conn.host).await {
            Ok(ip) => ip,
            Err(e) => {
                error!("Unable to resolve console host '{}': {}", conn.host, e);
                self.status.emit(InstanceStatus::BadConfig(e.to_string()));
                return Err(e.into());
            },
        };
        let target = SocketAddr::new(ip, conn.target_port);
        *self.target.write() = Some(target);

        let reconnect = (conn.reconnect && conn.protocol.is_stream()).then(|| ReconnectContext {
            slot: Arc::downgrade(&self.session),
            generation: Arc::clone(&self.generation),
            active: Arc::new(AtomicBool::new(false)),
            polling: conn.polling,
        });
        let session = Arc::new(TransportSession::new(
            conn.protocol,
            self.transport_options(&conn, target, generation, reconnect.clone()),
        ));
        self.status.emit(InstanceStatus::Connecting);
        *self.session.write() = Some(Arc::clone(&session));

        if let Err(e) = session.open().await {
            error!("Failed to open {} session to {}: {}", conn.protocol, target, e);
            match reconnect {
                Some(ctx) => spawn_reconnect(ctx, generation),
                None => {
                    self.session.write().take();
                },
            }
            return Err(e.into());
        }

        if conn.polling {
            request_resend(&session).await;
        }
        Ok(())
    }

    /// Apply a reloaded configuration file
    ///
    /// A healthy session is kept when the connection settings did not
    /// change; editors tend to fire several change events per save. Returns
    /// whether the session was rebuilt.
    pub async fn reload(&self, config: &AppConfig) -> Result<bool> {
        let same_connection = self.connection.read().as_ref() == Some(&config.connection);
        let healthy = matches!(self.status(), InstanceStatus::Ok | InstanceStatus::Connecting);
        if same_connection && healthy {
            *self.units.write() = config.units;
            debug!("Connection settings unchanged, keeping the current session");
            return Ok(false);
        }
        self.config_updated(config).await?;
        Ok(true)
    }

    /// Close the session and invalidate any task tied to it
    pub async fn shutdown(&self) {
        let _rebuild = self.rebuild.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);

        let session = self.session.write().take();
        if let Some(session) = session {
            session.close().await;
            info!("Session to {} closed", session.target());
        }
        self.status.emit(InstanceStatus::Disconnected);
    }

    fn transport_options(
        &self,
        conn: &ConnectionConfig,
        target: SocketAddr,
        generation: u64,
        reconnect: Option<ReconnectContext>,
    ) -> TransportOptions {
        let sink = self.inbound.clone();
        let inbound: InboundHandler = Arc::new(move |message| {
            sink.deliver_from(generation, message);
        });

        let status = self.status.clone();
        let current = Arc::clone(&self.generation);
        let on_state: StateCallback = Arc::new(move |state| {
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            status.emit(InstanceStatus::from_connection(&state));

            if state == ConnectionState::Disconnected {
                if let Some(ctx) = &reconnect {
                    spawn_reconnect(ctx.clone(), generation);
                }
            }
        });

        TransportOptions {
            target,
            listen: conn.listen,
            local_port: conn.feedback_port,
            inbound,
            on_state: Some(on_state),
            ledger: self.ledger.clone(),
        }
    }
}

async fn request_resend(session: &TransportSession) {
    match session.send(RESEND_PATH, &[]).await {
        Ok(()) => debug!("Requested state resend from {}", session.target()),
        Err(e) => warn!("State resend request failed: {}", e),
    }
}

fn spawn_reconnect(ctx: ReconnectContext, generation: u64) {
    if ctx
        .active
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return;
    }
    tokio::spawn(async move { reconnect_loop(&ctx, generation).await });
}

/// Reopen the session with backoff until it connects or is replaced
///
/// Owns the context's `active` flag while running and clears it on every exit.
async fn reconnect_loop(ctx: &ReconnectContext, generation: u64) {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        let delay_ms = std::cmp::min(30_000, 1000 * attempt);
        debug!("⏳ Reconnect #{} in {}ms", attempt, delay_ms);
        sleep(Duration::from_millis(delay_ms)).await;

        let session = match ctx.slot.upgrade() {
            Some(slot) if ctx.generation.load(Ordering::SeqCst) == generation => {
                let current = slot.read().clone();
                current
            },
            _ => None,
        };
        let Some(session) = session else {
            ctx.active.store(false, Ordering::SeqCst);
            return;
        };

        if let Err(e) = session.open().await {
            debug!("Reconnect #{} failed: {}", attempt, e);
            continue;
        }

        if ctx.generation.load(Ordering::SeqCst) != generation {
            // Replaced while connecting
            session.close().await;
            ctx.active.store(false, Ordering::SeqCst);
            return;
        }
        info!("✅ Reconnected to {} after {} attempt(s)", session.target(), attempt);

        // A drop reported before the flag cleared could not spawn a new loop
        ctx.active.store(false, Ordering::SeqCst);
        if session.state() == ConnectionState::Disconnected {
            if ctx
                .active
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                attempt = 0;
                continue;
            }
            return;
        }

        if ctx.polling {
            request_resend(&session).await;
        }
        return;
    }
}

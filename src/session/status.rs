//! Instance status reported to subscribers

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::transport::ConnectionState;

/// Health of the gateway as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum InstanceStatus {
    Ok,
    Connecting,
    BadConfig(String),
    ConnectionFailure(String),
    Disconnected,
}

impl InstanceStatus {
    /// Status implied by a transport state change
    pub fn from_connection(state: &ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Ok,
            ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Disconnected => Self::Disconnected,
            ConnectionState::Failed(reason) => Self::ConnectionFailure(reason.clone()),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Connecting => f.write_str("connecting"),
            Self::BadConfig(reason) => write!(f, "bad config: {}", reason),
            Self::ConnectionFailure(reason) => write!(f, "connection failure: {}", reason),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Callback receiving status changes
pub type StatusCallback = Arc<dyn Fn(InstanceStatus) + Send + Sync>;

/// Current status plus its subscribers
#[derive(Clone)]
pub(crate) struct StatusHub {
    current: Arc<RwLock<InstanceStatus>>,
    callbacks: Arc<RwLock<Vec<StatusCallback>>>,
}

impl StatusHub {
    pub(crate) fn new() -> Self {
        Self {
            current: Arc::new(RwLock::new(InstanceStatus::Disconnected)),
            callbacks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub(crate) fn current(&self) -> InstanceStatus {
        self.current.read().clone()
    }

    /// Record and broadcast a status; repeats of the current status are dropped
    pub(crate) fn emit(&self, status: InstanceStatus) {
        {
            let mut current = self.current.write();
            if *current == status {
                return;
            }
            *current = status.clone();
        }

        match &status {
            InstanceStatus::BadConfig(_) | InstanceStatus::ConnectionFailure(_) => {
                warn!("Instance status: {}", status)
            },
            _ => info!("Instance status: {}", status),
        }

        let callbacks = self.callbacks.read().clone();
        for callback in callbacks {
            callback(status.clone());
        }
    }

    /// Add a subscriber; it is called with the current status right away
    pub(crate) fn subscribe(&self, callback: StatusCallback) {
        callback(self.current());
        self.callbacks.write().push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_subscribe_emits_current_then_changes() {
        let hub = StatusHub::new();
        hub.emit(InstanceStatus::Connecting);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hub.subscribe(Arc::new(move |s| sink.lock().push(s)));

        hub.emit(InstanceStatus::Ok);
        hub.emit(InstanceStatus::Ok);
        hub.emit(InstanceStatus::BadConfig("no host configured".into()));

        assert_eq!(
            *seen.lock(),
            vec![
                InstanceStatus::Connecting,
                InstanceStatus::Ok,
                InstanceStatus::BadConfig("no host configured".into()),
            ]
        );
    }

    #[test]
    fn test_status_json() {
        let json = serde_json::to_value(InstanceStatus::ConnectionFailure("refused".into())).unwrap();
        assert_eq!(json["status"], "connection_failure");
        assert_eq!(json["reason"], "refused");
        assert_eq!(
            InstanceStatus::from_connection(&ConnectionState::Failed("x".into())),
            InstanceStatus::ConnectionFailure("x".into())
        );
    }
}

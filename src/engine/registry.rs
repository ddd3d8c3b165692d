use crate::link::LinkHandle;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where a session's link currently stands. Every session starts
/// `Disconnected` on process start; runtime state is never restored from
/// disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Observable runtime state, as exposed by the status snapshot.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSnapshot {
    pub phase: ConnectionPhase,
    pub qr: Option<String>,
}

#[derive(Default)]
struct RuntimeState {
    phase: ConnectionPhase,
    qr: Option<String>,
    handle: Option<Arc<dyn LinkHandle>>,
}

/// In-memory map from session id to live connection state. Bookkeeping
/// only; the connection manager drives all transitions.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<String, RuntimeState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn phase(&self, id: &str) -> ConnectionPhase {
        self.inner
            .read()
            .await
            .get(id)
            .map(|state| state.phase)
            .unwrap_or_default()
    }

    pub async fn snapshot(&self, id: &str) -> RuntimeSnapshot {
        self.inner
            .read()
            .await
            .get(id)
            .map(|state| RuntimeSnapshot {
                phase: state.phase,
                qr: state.qr.clone(),
            })
            .unwrap_or_default()
    }

    pub async fn handle(&self, id: &str) -> Option<Arc<dyn LinkHandle>> {
        self.inner.read().await.get(id).and_then(|state| state.handle.clone())
    }

    /// Move the session into `Connecting` unless a link is already active.
    /// Check and transition happen under one write lock, so out of any
    /// number of concurrent callers exactly one sees `true`.
    pub async fn try_begin_connect(&self, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let state = inner.entry(id.to_string()).or_default();
        if state.phase != ConnectionPhase::Disconnected {
            return false;
        }
        state.phase = ConnectionPhase::Connecting;
        true
    }

    pub async fn set_phase(&self, id: &str, phase: ConnectionPhase) {
        let mut inner = self.inner.write().await;
        inner.entry(id.to_string()).or_default().phase = phase;
    }

    pub async fn set_qr(&self, id: &str, qr: Option<String>) {
        let mut inner = self.inner.write().await;
        inner.entry(id.to_string()).or_default().qr = qr;
    }

    pub async fn set_handle(&self, id: &str, handle: Option<Arc<dyn LinkHandle>>) {
        let mut inner = self.inner.write().await;
        inner.entry(id.to_string()).or_default().handle = handle;
    }

    /// Back to a cold `Disconnected` state, returning the old handle so the
    /// caller can close it.
    pub async fn clear(&self, id: &str) -> Option<Arc<dyn LinkHandle>> {
        let mut inner = self.inner.write().await;
        let state = inner.entry(id.to_string()).or_default();
        state.phase = ConnectionPhase::Disconnected;
        state.qr = None;
        state.handle.take()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<dyn LinkHandle>> {
        let mut inner = self.inner.write().await;
        inner.remove(id).and_then(|state| state.handle)
    }
}

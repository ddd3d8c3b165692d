//! In-process transport. Carries no wire protocol: tests and the demo
//! binary script link events through [`MemoryLinkControl`] and inspect what
//! the engine sent back.

use super::{LinkEvent, LinkHandle, MediaKind, Transport};
use crate::error::LinkError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 64;

/// What a session sent over its link.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat: String,
        body: String,
    },
    Media {
        chat: String,
        kind: MediaKind,
        bytes: Vec<u8>,
        caption: Option<String>,
    },
    Read {
        chat: String,
        message_id: String,
    },
}

#[derive(Default)]
struct SessionState {
    sent: Vec<Sent>,
    event_tx: Option<mpsc::Sender<LinkEvent>>,
    group_names: HashMap<String, String>,
    opens: usize,
    fail_opens: bool,
}

#[derive(Default)]
pub struct MemoryTransport {
    sessions: Mutex<HashMap<String, Arc<Mutex<SessionState>>>>,
    open_count: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script handle for one session; usable before the session connects.
    pub fn control(&self, session_id: &str) -> MemoryLinkControl {
        MemoryLinkControl {
            state: self.state(session_id),
        }
    }

    /// Total links opened across all sessions.
    pub fn opens(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    fn state(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(
        &self,
        session_id: &str,
        _auth_dir: &Path,
    ) -> Result<(Arc<dyn LinkHandle>, mpsc::Receiver<LinkEvent>), LinkError> {
        let state = self.state(session_id);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        {
            let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
            if guard.fail_opens {
                return Err(LinkError::Connect(format!(
                    "link unavailable for {session_id}"
                )));
            }
            guard.event_tx = Some(tx);
            guard.opens += 1;
        }
        self.open_count.fetch_add(1, Ordering::SeqCst);

        let handle: Arc<dyn LinkHandle> = Arc::new(MemoryLinkHandle { state });
        Ok((handle, rx))
    }
}

struct MemoryLinkHandle {
    state: Arc<Mutex<SessionState>>,
}

impl MemoryLinkHandle {
    fn record(&self, item: Sent) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.sent.push(item);
    }
}

#[async_trait]
impl LinkHandle for MemoryLinkHandle {
    async fn send_text(&self, chat: &str, body: &str) -> Result<(), LinkError> {
        self.record(Sent::Text {
            chat: chat.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn send_media(
        &self,
        chat: &str,
        kind: MediaKind,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), LinkError> {
        self.record(Sent::Media {
            chat: chat.to_string(),
            kind,
            bytes,
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    async fn mark_read(&self, chat: &str, message_id: &str) -> Result<(), LinkError> {
        self.record(Sent::Read {
            chat: chat.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn group_subject(&self, group_id: &str) -> Result<String, LinkError> {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .group_names
            .get(group_id)
            .cloned()
            .ok_or_else(|| LinkError::Metadata(format!("no metadata for {group_id}")))
    }

    async fn close(&self) -> Result<(), LinkError> {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Dropping the sender ends the engine's event stream.
        guard.event_tx = None;
        Ok(())
    }
}

/// Test-side handle: push link events, preset group metadata, inspect sends.
#[derive(Clone)]
pub struct MemoryLinkControl {
    state: Arc<Mutex<SessionState>>,
}

impl MemoryLinkControl {
    pub async fn emit(&self, event: LinkEvent) -> Result<(), LinkError> {
        let tx = {
            let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            guard.event_tx.clone()
        };
        let Some(tx) = tx else {
            return Err(LinkError::Closed);
        };
        tx.send(event).await.map_err(|_| LinkError::Closed)
    }

    /// Emit a close event and end the stream, as a real link would.
    pub async fn emit_close(&self, reason: super::CloseReason) -> Result<(), LinkError> {
        self.emit(LinkEvent::Close(reason)).await?;
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.event_tx = None;
        Ok(())
    }

    /// Make subsequent opens fail, simulating an unreachable network.
    pub fn set_fail_opens(&self, fail: bool) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.fail_opens = fail;
    }

    pub fn set_group_name(&self, group_id: &str, name: &str) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .group_names
            .insert(group_id.to_string(), name.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.sent.clone()
    }

    pub fn opens(&self) -> usize {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.opens
    }

    pub fn is_open(&self) -> bool {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.event_tx.is_some()
    }
}

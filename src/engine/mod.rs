//! Session lifecycle and inbound-message processing: connection
//! supervision, policy gating, command matching, responder dispatch.

pub mod dispatch;
pub mod gate;
pub mod matcher;
pub mod registry;

use crate::config::Config;
use crate::error::{GateError, LinkError, SessionError};
use crate::link::{CloseReason, InboundMessage, LinkEvent, Transport};
use crate::store::{CommandStore, GroupStore, SessionStore};
use registry::{ConnectionPhase, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// In-chat reply when a dispatch attempt fails. Chat users never see the
/// underlying error.
pub const DISPATCH_FAILURE_NOTICE: &str = "There was an error processing your command.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Started,
    AlreadyActive,
}

enum PumpOutcome {
    LoggedOut,
    Transient(String),
    Ended,
}

struct EngineInner {
    config: Config,
    sessions: SessionStore,
    commands: CommandStore,
    groups: GroupStore,
    registry: SessionRegistry,
    transport: Arc<dyn Transport>,
    http: reqwest::Client,
}

/// Owns the stores, the session registry, and every live link. Cheap to
/// clone; clones share state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self, GateError> {
        let sessions = SessionStore::open(config.sessions_file())?;
        let commands = CommandStore::open(config.commands_file())?;
        let groups = GroupStore::open(config.groups_file())?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("http client: {e}"))?;

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                sessions,
                commands,
                groups,
                registry: SessionRegistry::new(),
                transport,
                http,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    pub fn commands(&self) -> &CommandStore {
        &self.inner.commands
    }

    pub fn groups(&self) -> &GroupStore {
        &self.inner.groups
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Open the session's link and start supervising it. Idempotent while
    /// the session is already connecting or connected.
    pub async fn connect(&self, id: &str) -> Result<ConnectOutcome, GateError> {
        let session = self
            .inner
            .sessions
            .get(id)?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        if !session.enabled {
            return Err(SessionError::Disabled(id.to_string()).into());
        }
        if !self.inner.registry.try_begin_connect(id).await {
            return Ok(ConnectOutcome::AlreadyActive);
        }
        let events = match self.open_link(id).await {
            Ok(events) => events,
            Err(error) => {
                self.inner.registry.clear(id).await;
                return Err(error.into());
            }
        };

        let engine = self.clone();
        let session_id = id.to_string();
        tokio::spawn(async move { engine.supervise(session_id, events).await });
        Ok(ConnectOutcome::Started)
    }

    /// Close the live link. Credentials are kept; a later connect resumes
    /// without re-pairing.
    pub async fn disconnect(&self, id: &str) -> Result<(), GateError> {
        if self.inner.sessions.get(id)?.is_none() {
            return Err(SessionError::NotFound(id.to_string()).into());
        }
        if self.inner.registry.phase(id).await == ConnectionPhase::Disconnected {
            return Err(SessionError::NotConnected(id.to_string()).into());
        }

        // Phase goes to Disconnected before the close so the supervisor
        // sees a deliberate stop, not a transient failure. A supervisor
        // caught mid-backoff has no handle to close here; it observes the
        // phase change at its next still-wanted check and exits then.
        let handle = self.inner.registry.clear(id).await;
        if let Some(handle) = handle {
            if let Err(error) = handle.close().await {
                tracing::debug!(session = %id, %error, "close on disconnect failed");
            }
        }
        Ok(())
    }

    /// Tear down the session entirely: live link, credential material, and
    /// the persisted record. `false` when the id is unknown.
    pub async fn delete_session(&self, id: &str) -> Result<bool, GateError> {
        if self.inner.sessions.get(id)?.is_none() {
            return Ok(false);
        }
        if let Some(handle) = self.inner.registry.remove(id).await {
            if let Err(error) = handle.close().await {
                tracing::debug!(session = %id, %error, "close on delete failed");
            }
        }
        self.inner.sessions.remove(id)?;
        self.erase_credentials(id).await;
        Ok(true)
    }

    /// Close every live link. Used on process shutdown.
    pub async fn shutdown(&self) {
        for record in self.inner.sessions.list().unwrap_or_default() {
            if let Some(handle) = self.inner.registry.clear(&record.id).await {
                let _ = handle.close().await;
            }
        }
    }

    async fn open_link(&self, id: &str) -> Result<mpsc::Receiver<LinkEvent>, LinkError> {
        let auth_dir = self.inner.config.auth_dir(id);
        let (handle, events) = self.inner.transport.open(id, &auth_dir).await?;
        self.inner.registry.set_handle(id, Some(handle)).await;
        Ok(events)
    }

    async fn supervise(self, id: String, mut events: mpsc::Receiver<LinkEvent>) {
        let reconnect = self.inner.config.reconnect.clone();
        let mut attempts: u32 = 0;
        let mut backoff = reconnect.initial_backoff_secs.max(1);

        loop {
            let (outcome, saw_open) = self.pump(&id, &mut events).await;
            if saw_open {
                attempts = 0;
                backoff = reconnect.initial_backoff_secs.max(1);
            }

            match outcome {
                PumpOutcome::LoggedOut => {
                    tracing::info!(session = %id, "logged out; erasing credentials, re-pairing required");
                    self.inner.registry.clear(&id).await;
                    self.erase_credentials(&id).await;
                    return;
                }
                PumpOutcome::Ended => {
                    // Stream ended without a close event: deliberate
                    // disconnect, delete, or transport shutdown.
                    if self.inner.registry.phase(&id).await == ConnectionPhase::Disconnected {
                        return;
                    }
                    tracing::warn!(session = %id, "link event stream ended; reconnecting");
                }
                PumpOutcome::Transient(reason) => {
                    if self.inner.registry.phase(&id).await == ConnectionPhase::Disconnected {
                        return;
                    }
                    tracing::warn!(session = %id, %reason, "link closed; reconnecting");
                }
            }

            self.inner
                .registry
                .set_phase(&id, ConnectionPhase::Connecting)
                .await;
            self.inner.registry.set_handle(&id, None).await;

            loop {
                attempts += 1;
                if attempts > reconnect.max_attempts {
                    tracing::warn!(
                        session = %id,
                        attempts = reconnect.max_attempts,
                        "reconnect attempts exhausted; session parked"
                    );
                    self.inner.registry.clear(&id).await;
                    return;
                }
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                backoff = backoff
                    .saturating_mul(2)
                    .min(reconnect.max_backoff_secs.max(1));

                let session = self.inner.sessions.get(&id).ok().flatten();
                let phase = self.inner.registry.phase(&id).await;
                let still_wanted =
                    session.as_ref().is_some_and(|s| s.enabled) && phase == ConnectionPhase::Connecting;
                if !still_wanted {
                    if session.is_none() {
                        self.inner.registry.remove(&id).await;
                    } else {
                        self.inner.registry.clear(&id).await;
                    }
                    return;
                }

                match self.open_link(&id).await {
                    Ok(new_events) => {
                        events = new_events;
                        break;
                    }
                    Err(error) => {
                        tracing::warn!(session = %id, attempt = attempts, %error, "reconnect failed");
                    }
                }
            }
        }
    }

    async fn pump(
        &self,
        id: &str,
        events: &mut mpsc::Receiver<LinkEvent>,
    ) -> (PumpOutcome, bool) {
        let mut saw_open = false;
        while let Some(event) = events.recv().await {
            match event {
                LinkEvent::Qr(payload) => {
                    self.inner.registry.set_qr(id, Some(payload)).await;
                }
                LinkEvent::Open => {
                    saw_open = true;
                    self.inner
                        .registry
                        .set_phase(id, ConnectionPhase::Connected)
                        .await;
                    self.inner.registry.set_qr(id, None).await;
                    tracing::info!(session = %id, "link open");
                }
                LinkEvent::CredsUpdate(bytes) => {
                    self.persist_credentials(id, &bytes).await;
                }
                LinkEvent::GroupJoined { id: group_id, name } => {
                    if let Err(error) = self.inner.groups.register(&group_id, &name) {
                        tracing::warn!(group = %group_id, %error, "group auto-registration failed");
                    }
                }
                LinkEvent::Message(message) => {
                    // Per-message task: a slow dispatch must not hold up the
                    // session's event stream.
                    let engine = self.clone();
                    let session_id = id.to_string();
                    tokio::spawn(async move {
                        engine.handle_inbound(&session_id, message).await;
                    });
                }
                LinkEvent::Close(CloseReason::LoggedOut) => {
                    return (PumpOutcome::LoggedOut, saw_open);
                }
                LinkEvent::Close(CloseReason::Transient(reason)) => {
                    return (PumpOutcome::Transient(reason), saw_open);
                }
            }
        }
        (PumpOutcome::Ended, saw_open)
    }

    async fn handle_inbound(&self, session_id: &str, message: InboundMessage) {
        if message.from_me {
            return;
        }
        let Some(handle) = self.inner.registry.handle(session_id).await else {
            return;
        };

        // Read receipt goes out even when gating stops processing.
        if let Err(error) = handle.mark_read(&message.chat, &message.id).await {
            tracing::debug!(session = %session_id, %error, "mark read failed");
        }

        let session = match self.inner.sessions.get(session_id) {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(session = %session_id, %error, "session lookup failed");
                return;
            }
        };

        match gate::allows_dispatch(&session, &message, &self.inner.groups, handle.as_ref()).await
        {
            Ok(true) => {}
            Ok(false) => return,
            Err(error) => {
                tracing::warn!(session = %session_id, %error, "policy gate failed");
                return;
            }
        }

        let entries = match self.inner.commands.entries() {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(session = %session_id, %error, "command snapshot failed");
                return;
            }
        };
        let Some((key, command)) = matcher::match_command(&entries, &message.body) else {
            return;
        };
        tracing::debug!(session = %session_id, command = %key, "command matched");

        if let Err(error) = dispatch::respond(
            handle.as_ref(),
            &message.chat,
            &command.action,
            &self.inner.http,
            self.inner.config.asset_root(),
        )
        .await
        {
            tracing::warn!(session = %session_id, command = %key, %error, "command dispatch failed");
            if let Err(notify_error) = handle.send_text(&message.chat, DISPATCH_FAILURE_NOTICE).await
            {
                tracing::warn!(session = %session_id, %notify_error, "failure notice send failed");
            }
        }
    }

    async fn persist_credentials(&self, id: &str, bytes: &[u8]) {
        let dir = self.inner.config.auth_dir(id);
        if let Err(error) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!(session = %id, %error, "auth dir create failed");
            return;
        }
        if let Err(error) = tokio::fs::write(dir.join("creds.bin"), bytes).await {
            tracing::warn!(session = %id, %error, "credential persist failed");
        }
    }

    async fn erase_credentials(&self, id: &str) {
        let dir = self.inner.config.auth_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => tracing::warn!(session = %id, %error, "credential erase failed"),
        }
    }
}

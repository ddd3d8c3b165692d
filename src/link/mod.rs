//! Seam to the messaging network's wire protocol.
//!
//! The protocol itself is a supplied capability: a production adapter
//! implements [`Transport`] and [`LinkHandle`]; [`memory::MemoryTransport`]
//! is the in-process implementation used by tests and the demo binary.

pub mod memory;

use crate::error::LinkError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use memory::MemoryTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Document,
    Voice,
}

/// An inbound message as delivered by the link.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    /// Chat identifier; for group chats this is the group id and the reply
    /// target in one.
    pub chat: String,
    pub body: String,
    /// Authored by the session's own account.
    pub from_me: bool,
    pub is_group: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Device was unpaired; credentials are void and must not be reused.
    LoggedOut,
    /// Recoverable network or protocol failure.
    Transient(String),
}

/// Link-level events observed by the connection manager.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Pairing QR issued; payload is opaque to us.
    Qr(String),
    /// Link is up.
    Open,
    Close(CloseReason),
    /// Updated credential material to persist, as opaque bytes.
    CredsUpdate(Vec<u8>),
    Message(InboundMessage),
    /// Bot was added to (or saw activity in) a group.
    GroupJoined { id: String, name: String },
}

/// A live connection for one session.
#[async_trait]
pub trait LinkHandle: Send + Sync {
    async fn send_text(&self, chat: &str, body: &str) -> Result<(), LinkError>;

    async fn send_media(
        &self,
        chat: &str,
        kind: MediaKind,
        bytes: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<(), LinkError>;

    async fn mark_read(&self, chat: &str, message_id: &str) -> Result<(), LinkError>;

    /// Display name from group metadata.
    async fn group_subject(&self, group_id: &str) -> Result<String, LinkError>;

    async fn close(&self) -> Result<(), LinkError>;
}

/// Opens links. Injected into the engine so sessions can run against any
/// wire implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a link for `session_id`, loading (or creating) credential
    /// material under `auth_dir`. Events flow until the link closes.
    async fn open(
        &self,
        session_id: &str,
        auth_dir: &Path,
    ) -> Result<(Arc<dyn LinkHandle>, mpsc::Receiver<LinkEvent>), LinkError>;
}

use std::path::PathBuf;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `wagate`.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; binary glue continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum GateError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Persistent store ────────────────────────────────────────────────
    #[error("store: {0}")]
    Store(#[from] StoreError),

    // ── Session lifecycle ───────────────────────────────────────────────
    #[error("session: {0}")]
    Session(#[from] SessionError),

    // ── Wire link ───────────────────────────────────────────────────────
    #[error("link: {0}")]
    Link(#[from] LinkError),

    // ── Responder dispatch ──────────────────────────────────────────────
    #[error("dispatch: {0}")]
    Dispatch(#[from] DispatchError),

    // ── Control API ─────────────────────────────────────────────────────
    #[error("control: {0}")]
    Control(#[from] ControlError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("parse failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Store errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed collection file {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("serialize failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("lock poisoned: {0}")]
    Lock(String),
}

// ─── Session errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session {0} is disabled")]
    Disabled(String),

    #[error("session {0} is not connected")]
    NotConnected(String),
}

// ─── Link errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("metadata fetch failed: {0}")]
    Metadata(String),

    #[error("link closed")]
    Closed,
}

// ─── Dispatch errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response path: {path}")]
    InvalidResponsePath { path: String },

    #[error("media: {0}")]
    Media(String),

    #[error("link: {0}")]
    Link(#[from] LinkError),
}

// ─── Control errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0}")]
    Validation(String),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, GateError>;

//! Flat-file JSON persistence for the three independent collections:
//! sessions, commands, groups. Write-through on every mutation; no
//! cross-collection transactions (the collections are independent).

pub mod commands;
pub mod groups;
pub mod sessions;

pub use commands::{Command, CommandAction, CommandStore};
pub use groups::{GroupRecord, GroupStore};
pub use sessions::{SessionRecord, SessionStore};

use crate::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Read a collection file. A missing file is a fresh install, not an error;
/// malformed JSON is a startup error, never a silent reset.
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StoreError::Malformed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Serialize the full collection to a sibling tmp file, then rename into
/// place. A crash mid-write never leaves a truncated collection behind.
pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let io_err = |e: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let rendered = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, rendered).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

pub(crate) fn lock_err<T>(error: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Lock(error.to_string())
}

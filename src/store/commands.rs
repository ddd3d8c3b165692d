use super::{load_json, lock_err, save_json};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::RwLock;

fn default_response_path() -> String {
    "result".into()
}

/// The action bound to a trigger. Tagged by the persisted `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum CommandAction {
    Text {
        response: String,
    },
    Image {
        media_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Video {
        media_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Api {
        api_url: String,
        #[serde(default = "default_response_path")]
        api_response_path: String,
    },
}

/// A trigger-to-action binding. The trigger string is the map key in
/// `commands.json`, not a field here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(flatten)]
    pub action: CommandAction,
}

/// Insertion-ordered command collection, persisted as a JSON object.
///
/// The matcher's case-insensitive tier scans in insertion order, so order is
/// part of the contract; `serde_json`'s preserve_order feature keeps document
/// order intact across reloads.
pub struct CommandStore {
    path: PathBuf,
    entries: RwLock<Vec<(String, Command)>>,
}

impl CommandStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let raw = load_json::<Map<String, Value>>(&path)?.unwrap_or_default();
        let mut entries = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            let command =
                serde_json::from_value::<Command>(value).map_err(|e| StoreError::Malformed {
                    path: path.clone(),
                    source: e,
                })?;
            entries.push((key, command));
        }
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Snapshot of all commands in insertion order.
    pub fn entries(&self) -> Result<Vec<(String, Command)>, StoreError> {
        Ok(self.entries.read().map_err(lock_err)?.clone())
    }

    pub fn get(&self, key: &str) -> Result<Option<Command>, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(lock_err)?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, command)| command.clone()))
    }

    /// Insert or replace. Replacing keeps the key's original position.
    pub fn upsert(&self, key: &str, command: Command) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(lock_err)?;
        let replaced = match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => {
                *existing = command;
                true
            }
            None => {
                entries.push((key.to_string(), command));
                false
            }
        };
        Self::persist(&self.path, &entries)?;
        Ok(replaced)
    }

    /// Replace an existing command only; `false` when the key is unknown.
    pub fn replace(&self, key: &str, command: Command) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(lock_err)?;
        let Some((_, existing)) = entries.iter_mut().find(|(k, _)| k == key) else {
            return Ok(false);
        };
        *existing = command;
        Self::persist(&self.path, &entries)?;
        Ok(true)
    }

    pub fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().map_err(lock_err)?;
        let before = entries.len();
        entries.retain(|(k, _)| k != key);
        if entries.len() == before {
            return Ok(false);
        }
        Self::persist(&self.path, &entries)?;
        Ok(true)
    }

    fn persist(path: &PathBuf, entries: &[(String, Command)]) -> Result<(), StoreError> {
        let mut map = Map::with_capacity(entries.len());
        for (key, command) in entries {
            map.insert(key.clone(), serde_json::to_value(command)?);
        }
        save_json(path, &map)
    }
}

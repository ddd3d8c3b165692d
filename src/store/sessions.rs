use super::{load_json, lock_err, save_json};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;
use uuid::Uuid;

/// One independent connection to the messaging network.
///
/// Runtime state (connection phase, QR payload, live handle) lives in the
/// session registry, never here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    /// Whether the session is allowed to run at all.
    pub enabled: bool,
    /// Whether matched commands are acted upon for this session.
    pub commands_enabled: bool,
    pub created_at: DateTime<Utc>,
}

pub struct SessionStore {
    path: PathBuf,
    records: RwLock<Vec<SessionRecord>>,
}

impl SessionStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let records = load_json::<Vec<SessionRecord>>(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        Ok(self.records.read().map_err(lock_err)?.clone())
    }

    pub fn get(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .map_err(lock_err)?
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    pub fn create(&self, name: &str) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            enabled: true,
            commands_enabled: true,
            created_at: Utc::now(),
        };
        let mut records = self.records.write().map_err(lock_err)?;
        records.push(record.clone());
        save_json(&self.path, &*records)?;
        Ok(record)
    }

    pub fn rename(&self, id: &str, name: &str) -> Result<bool, StoreError> {
        self.update(id, |record| record.name = name.to_string())
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, StoreError> {
        self.update(id, |record| record.enabled = enabled)
    }

    pub fn set_commands_enabled(&self, id: &str, enabled: bool) -> Result<bool, StoreError> {
        self.update(id, |record| record.commands_enabled = enabled)
    }

    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(lock_err)?;
        let before = records.len();
        records.retain(|record| record.id != id);
        if records.len() == before {
            return Ok(false);
        }
        save_json(&self.path, &*records)?;
        Ok(true)
    }

    fn update(
        &self,
        id: &str,
        apply: impl FnOnce(&mut SessionRecord),
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(lock_err)?;
        let Some(record) = records.iter_mut().find(|record| record.id == id) else {
            return Ok(false);
        };
        apply(record);
        save_json(&self.path, &*records)?;
        Ok(true)
    }
}

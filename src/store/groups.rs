use super::{load_json, lock_err, save_json};
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;

/// A group chat known to the bot. Auto-created on first contact, toggled via
/// the control API, never auto-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    /// Network-provided group identifier.
    pub id: String,
    pub name: String,
    /// Whether commands are answered in this group.
    pub enabled: bool,
}

pub struct GroupStore {
    path: PathBuf,
    records: RwLock<Vec<GroupRecord>>,
}

impl GroupStore {
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let records = load_json::<Vec<GroupRecord>>(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    pub fn list(&self) -> Result<Vec<GroupRecord>, StoreError> {
        Ok(self.records.read().map_err(lock_err)?.clone())
    }

    pub fn get(&self, id: &str) -> Result<Option<GroupRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .map_err(lock_err)?
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    /// Register a newly seen group as enabled. Returns the stored record;
    /// an already-known id is returned as-is, never duplicated.
    pub fn register(&self, id: &str, name: &str) -> Result<GroupRecord, StoreError> {
        let mut records = self.records.write().map_err(lock_err)?;
        if let Some(existing) = records.iter().find(|record| record.id == id) {
            return Ok(existing.clone());
        }
        let record = GroupRecord {
            id: id.to_string(),
            name: name.to_string(),
            enabled: true,
        };
        records.push(record.clone());
        save_json(&self.path, &*records)?;
        Ok(record)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(lock_err)?;
        let Some(record) = records.iter_mut().find(|record| record.id == id) else {
            return Ok(false);
        };
        record.enabled = enabled;
        save_json(&self.path, &*records)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, GroupStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = GroupStore::open(dir.path().join("groups.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn register_defaults_to_enabled() {
        let (_dir, store) = store();
        let record = store.register("123@g.us", "Class of 2024").unwrap();
        assert!(record.enabled);
        assert_eq!(record.name, "Class of 2024");
    }

    #[test]
    fn register_twice_does_not_duplicate() {
        let (_dir, store) = store();
        store.register("123@g.us", "Class of 2024").unwrap();
        let second = store.register("123@g.us", "Renamed").unwrap();

        assert_eq!(store.list().unwrap().len(), 1);
        // First-seen name wins; renames come from the control surface.
        assert_eq!(second.name, "Class of 2024");
    }

    #[test]
    fn set_enabled_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("groups.json");
        {
            let store = GroupStore::open(path.clone()).unwrap();
            store.register("123@g.us", "Class").unwrap();
            assert!(store.set_enabled("123@g.us", false).unwrap());
        }

        let reopened = GroupStore::open(path).unwrap();
        assert!(!reopened.get("123@g.us").unwrap().unwrap().enabled);
    }

    #[test]
    fn set_enabled_on_unknown_id_reports_not_found() {
        let (_dir, store) = store();
        assert!(!store.set_enabled("missing@g.us", false).unwrap());
    }
}

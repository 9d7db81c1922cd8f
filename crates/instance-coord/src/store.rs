//! The shared channel between instances.
//!
//! [`FileStatusStore`] keeps one `instance-<id>.json` per instance in a
//! shared directory. Writes go to a hidden temp file in the same directory
//! and are renamed into place, so readers never see a partial record.

use crate::{CoordError, InstanceRecord, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub trait StatusStore: Send + Sync {
    /// Publish (or replace) one instance's record.
    fn put(&self, record: &InstanceRecord) -> Result<()>;

    /// Every readable record, ordered by instance id.
    fn snapshot(&self) -> Result<Vec<InstanceRecord>>;

    /// Remove an instance's record. Missing records are not an error.
    fn remove(&self, instance_id: u32) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileStatusStore {
    dir: PathBuf,
}

impl FileStatusStore {
    /// Creates the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| CoordError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, instance_id: u32) -> PathBuf {
        self.dir.join(format!("instance-{instance_id}.json"))
    }

    fn parse_file_name(name: &str) -> Option<u32> {
        name.strip_prefix("instance-")?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }

    fn read_record(path: &Path) -> Result<InstanceRecord> {
        let content = std::fs::read_to_string(path).map_err(|e| CoordError::io(path, e))?;
        serde_json::from_str(&content).map_err(|source| CoordError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl StatusStore for FileStatusStore {
    fn put(&self, record: &InstanceRecord) -> Result<()> {
        let path = self.record_path(record.instance_id);
        let json = serde_json::to_string_pretty(record)?;
        let tmp = self
            .dir
            .join(format!(".instance-{}.json.tmp", record.instance_id));
        std::fs::write(&tmp, json.as_bytes()).map_err(|e| CoordError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| CoordError::io(&path, e))?;
        tracing::trace!(path = %path.display(), "status record written");
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<InstanceRecord>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| CoordError::io(&self.dir, e))?;
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CoordError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(Self::parse_file_name) else {
                continue;
            };
            match Self::read_record(&entry.path()) {
                Ok(record) if record.instance_id == id => records.push(record),
                Ok(record) => {
                    tracing::warn!(file_id = id, record_id = record.instance_id, "status file name does not match its record; skipped");
                }
                // A peer may vanish between listing and reading.
                Err(e) => tracing::warn!("skipping status file: {}", e),
            }
        }
        records.sort_by_key(|r| r.instance_id);
        Ok(records)
    }

    fn remove(&self, instance_id: u32) -> Result<()> {
        let path = self.record_path(instance_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoordError::io(&path, e)),
        }
    }
}

/// Process-local store, for tests and single-process clusters.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    records: Mutex<BTreeMap<u32, InstanceRecord>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusStore for MemoryStatusStore {
    fn put(&self, record: &InstanceRecord) -> Result<()> {
        self.records
            .lock()
            .insert(record.instance_id, record.clone());
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<InstanceRecord>> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn remove(&self, instance_id: u32) -> Result<()> {
        self.records.lock().remove(&instance_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStatusStore::new(dir.path().join("cluster")).unwrap();
        store.put(&InstanceRecord::new(1, 2)).unwrap();
        store.put(&InstanceRecord::new(0, 2)).unwrap();

        let records = store.snapshot().unwrap();
        assert_eq!(
            records.iter().map(|r| r.instance_id).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert!(store.record_path(0).exists());
        assert!(!store.dir().join(".instance-0.json.tmp").exists());

        store.remove(1).unwrap();
        store.remove(1).unwrap();
        assert_eq!(store.snapshot().unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_skips_foreign_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStatusStore::new(dir.path()).unwrap();
        store.put(&InstanceRecord::new(0, 1)).unwrap();
        std::fs::write(dir.path().join("instance-7.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join(".instance-3.json.tmp"), "{}").unwrap();

        let records = store.snapshot().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].instance_id, 0);
    }

    #[test]
    fn test_put_replaces_record() {
        let store = MemoryStatusStore::new();
        let mut record = InstanceRecord::new(2, 3);
        store.put(&record).unwrap();
        record.shutdown_requested = true;
        store.put(&record).unwrap();
        let records = store.snapshot().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].shutdown_requested);
    }
}

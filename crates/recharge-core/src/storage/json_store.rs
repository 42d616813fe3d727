//! JSON file record store.
//!
//! One JSON object keyed by user id. Every write rewrites the whole file
//! through a temp file and a rename. Writers hold an in-process lock plus an
//! exclusive OS lock on `<file>.lock` from load to rename, so a CLI and a
//! daemon sharing the file never drop each other's entries. Readers do not
//! lock: the rename means they always see a complete file.
//!
//! A missing file is an empty store. A file that fails to parse is also
//! treated as empty, after copying it aside to `<file>.corrupt` and logging
//! at error level; the next write replaces it.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fd_lock::RwLock as FileLock;
use tempfile::NamedTempFile;
use tracing::{error, warn};

use super::store::RecordStore;
use crate::error::StoreError;
use crate::recharge::UserRechargeRecord;

type RecordMap = BTreeMap<String, UserRechargeRecord>;

pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Use `path` as the backing file. Nothing is read or created until the
    /// first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn load(&self) -> Result<RecordMap, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RecordMap::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        if content.trim().is_empty() {
            return Ok(RecordMap::new());
        }
        match serde_json::from_str::<RecordMap>(&content) {
            Ok(map) => Ok(map),
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "record store is corrupt, continuing with an empty store"
                );
                self.keep_corrupt_copy();
                Ok(RecordMap::new())
            }
        }
    }

    fn keep_corrupt_copy(&self) {
        let mut backup = self.path.clone().into_os_string();
        backup.push(".corrupt");
        let backup = PathBuf::from(backup);
        if backup.exists() {
            return;
        }
        if let Err(e) = std::fs::copy(&self.path, &backup) {
            warn!(path = %backup.display(), error = %e, "could not keep a copy of the corrupt store");
        }
    }

    fn parent_dir(&self) -> Result<PathBuf, StoreError> {
        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| self.io_err(e))?;
        Ok(parent)
    }

    /// Sidecar file the cross-process writer lock is taken on.
    fn lock_file(&self) -> Result<FileLock<File>, StoreError> {
        self.parent_dir()?;
        let mut lock_path = self.path.clone().into_os_string();
        lock_path.push(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(PathBuf::from(lock_path))
            .map_err(|e| self.io_err(e))?;
        Ok(FileLock::new(file))
    }

    /// Run `write` on the current map under both locks. The map is saved
    /// when `write` reports it dirty.
    fn write_locked<T>(
        &self,
        write: impl FnOnce(&mut RecordMap) -> (T, bool),
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock()?;
        let mut file_lock = self.lock_file()?;
        let _os_guard = file_lock.write().map_err(|e| self.io_err(e))?;

        let mut map = self.load()?;
        let (out, dirty) = write(&mut map);
        if dirty {
            self.save(&map)?;
        }
        Ok(out)
    }

    fn save(&self, map: &RecordMap) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(map)?;
        let mut tmp = NamedTempFile::new_in(self.parent_dir()?).map_err(|e| self.io_err(e))?;
        tmp.write_all(content.as_bytes()).map_err(|e| self.io_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn backend(&self) -> &'static str {
        "json"
    }

    fn get(&self, user_id: &str) -> Result<Option<UserRechargeRecord>, StoreError> {
        let _guard = self.lock.lock()?;
        Ok(self.load()?.remove(user_id))
    }

    fn put(
        &self,
        user_id: &str,
        mut record: UserRechargeRecord,
    ) -> Result<UserRechargeRecord, StoreError> {
        self.write_locked(|map| {
            record.version = map.get(user_id).map_or(0, |r| r.version) + 1;
            map.insert(user_id.to_string(), record.clone());
            (record, true)
        })
    }

    fn list(&self) -> Result<Vec<(String, UserRechargeRecord)>, StoreError> {
        let _guard = self.lock.lock()?;
        Ok(self.load()?.into_iter().collect())
    }

    fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: Option<u64>,
        mut record: UserRechargeRecord,
    ) -> Result<Option<UserRechargeRecord>, StoreError> {
        self.write_locked(|map| {
            if map.get(user_id).map(|r| r.version) != expected_version {
                return (None, false);
            }
            record.version = expected_version.map_or(1, |v| v + 1);
            map.insert(user_id.to_string(), record.clone());
            (Some(record), true)
        })
    }
}

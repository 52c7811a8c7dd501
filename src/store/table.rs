//! Lock table file access under the table-level lock.

use super::record::LockRecord;
use crate::error::{LockError, Result};
use crate::fs::atomic_write;
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

const BACKEND: &str = "database";

#[derive(Debug, Default, Serialize, Deserialize)]
struct TableFile {
    #[serde(default)]
    records: BTreeMap<String, LockRecord>,
}

/// Rows of the table as seen inside one transaction.
///
/// Mutations mark the rows dirty so the table is only rewritten when
/// something actually changed.
#[derive(Debug)]
pub struct TableRows {
    records: BTreeMap<String, LockRecord>,
    dirty: bool,
}

impl TableRows {
    /// The record for `name`, if any, expired or not.
    pub fn get(&self, name: &str) -> Option<&LockRecord> {
        self.records.get(name)
    }

    /// The record for `name` if it has not expired at `now`.
    pub fn get_live(&self, name: &str, now: DateTime<Utc>) -> Option<&LockRecord> {
        self.records.get(name).filter(|r| r.is_live(now))
    }

    /// Insert or overwrite the record for `record.name`.
    pub fn upsert(&mut self, record: LockRecord) {
        self.records.insert(record.name.clone(), record);
        self.dirty = true;
    }

    /// Delete the record for `name`.
    pub fn remove(&mut self, name: &str) -> Option<LockRecord> {
        let removed = self.records.remove(name);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Iterate over all records, expired ones included.
    pub fn iter(&self) -> impl Iterator<Item = &LockRecord> {
        self.records.values()
    }

    /// Drop records whose expiry has passed.
    fn reap(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.is_live(now));
        before - self.records.len()
    }
}

/// A lock table stored at a filesystem path.
#[derive(Debug, Clone)]
pub struct LockTable {
    path: PathBuf,
    guard_path: PathBuf,
}

impl LockTable {
    /// Open (lazily) the table at `path`. Nothing is created until the first
    /// transaction.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut guard = path.clone().into_os_string();
        guard.push(".lock");

        Self {
            path,
            guard_path: PathBuf::from(guard),
        }
    }

    /// Path of the table file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` over the rows while holding the exclusive table lock, writing
    /// the table back if `f` changed anything. Expired rows are reaped on
    /// every write.
    pub fn transact<T>(&self, f: impl FnOnce(&mut TableRows) -> T) -> Result<T> {
        let guard = self.open_guard()?;
        guard
            .lock_exclusive()
            .map_err(|e| self.unavailable("failed to lock table", e))?;

        let mut rows = self.load()?;
        let out = f(&mut rows);

        if rows.dirty {
            let reaped = rows.reap(Utc::now());
            if reaped > 0 {
                debug!(table = %self.path.display(), reaped, "reaped expired lock records");
            }
            self.store(&rows)?;
        }

        // Closing the guard file releases the table lock.
        drop(guard);
        Ok(out)
    }

    /// Run `f` over the rows while holding the table lock in shared mode.
    pub fn read<T>(&self, f: impl FnOnce(&TableRows) -> T) -> Result<T> {
        if !self.path.exists() {
            return Ok(f(&TableRows {
                records: BTreeMap::new(),
                dirty: false,
            }));
        }

        let guard = self.open_guard()?;
        FileExt::lock_shared(&guard).map_err(|e| self.unavailable("failed to lock table", e))?;

        let rows = self.load()?;
        let out = f(&rows);
        drop(guard);
        Ok(out)
    }

    fn open_guard(&self) -> Result<File> {
        if let Some(parent) = self.guard_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .map_err(|e| self.unavailable("failed to create table directory", e))?;
        }

        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.guard_path)
            .map_err(|e| self.unavailable("failed to open table lock file", e))
    }

    fn load(&self) -> Result<TableRows> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(self.unavailable("failed to read table", e)),
        };

        let file: TableFile = if content.trim().is_empty() {
            TableFile::default()
        } else {
            serde_json::from_str(&content).map_err(|e| LockError::CorruptStore {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
        };

        Ok(TableRows {
            records: file.records,
            dirty: false,
        })
    }

    fn store(&self, rows: &TableRows) -> Result<()> {
        #[derive(Serialize)]
        struct TableFileRef<'a> {
            records: &'a BTreeMap<String, LockRecord>,
        }

        let json = serde_json::to_string_pretty(&TableFileRef {
            records: &rows.records,
        })
        .map_err(|e| self.unavailable("failed to serialize table", e))?;

        atomic_write(&self.path, json.as_bytes())
            .map_err(|e| self.unavailable("failed to write table", e))
    }

    fn unavailable(&self, what: &str, e: impl std::fmt::Display) -> LockError {
        LockError::unavailable(BACKEND, format!("{} '{}': {}", what, self.path.display(), e))
    }
}

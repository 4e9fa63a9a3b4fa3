//! File-backed checkpoint state for provisioning runs.
//!
//! The state file is the single source of truth for which indexes a run has
//! already driven to completion. Every record transition is persisted
//! synchronously before the caller proceeds, by writing a sibling temp file
//! and renaming it over the previous state file, so a crash at any point
//! leaves a parseable file that reflects every completed transition.
//!
//! One orchestrator process owns a state file at a time; concurrent writers
//! are not supported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::plan::IndexSpec;

/// Provisioning status of one (table, index) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Pending,
    InProgress,
    Active,
    Failed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "pending",
            IndexStatus::InProgress => "in_progress",
            IndexStatus::Active => "active",
            IndexStatus::Failed => "failed",
        }
    }
}

/// Stored status of one index across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub status: IndexStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The on-disk document: run metadata plus every index record.
///
/// `BTreeMap` keeps the serialized form deterministic, so two runs over the
/// same inputs produce byte-comparable files (modulo timestamps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub script_name: String,
    pub created_at: DateTime<Utc>,
    pub gsis: BTreeMap<String, BTreeMap<String, IndexRecord>>,
}

/// Per-status record counts, for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub active: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.active + self.failed
    }
}

// ========== STORE ==========

/// Owns the state file at `path` and persists after every mutation.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: RunState,
}

impl StateStore {
    /// Load the state file if it exists, else start a fresh in-memory state.
    ///
    /// Nothing is written until the first mutation, so a dry run never
    /// creates a file. An existing file recorded by a different script name
    /// is rejected rather than silently adopted.
    pub fn load_or_create(path: &Path, script_name: &str) -> Result<StateStore, Error> {
        if path.exists() {
            let store = StateStore::load(path)?;
            if store.state.script_name != script_name {
                return Err(Error::ScriptMismatch {
                    path: path.to_path_buf(),
                    found: store.state.script_name,
                    expected: script_name.to_string(),
                });
            }
            return Ok(store);
        }
        Ok(StateStore {
            path: path.to_path_buf(),
            state: RunState {
                script_name: script_name.to_string(),
                created_at: Utc::now(),
                gsis: BTreeMap::new(),
            },
        })
    }

    /// Load an existing state file, failing if it is absent.
    pub fn load(path: &Path) -> Result<StateStore, Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::StateIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        let state: RunState = serde_json::from_str(&raw).map_err(|e| Error::StateFormat {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(StateStore {
            path: path.to_path_buf(),
            state,
        })
    }

    /// Resume from an existing state file for the given script.
    pub fn resume(path: &Path, script_name: &str) -> Result<StateStore, Error> {
        if !path.exists() {
            return Err(Error::NothingToResume(path.to_path_buf()));
        }
        StateStore::load_or_create(path, script_name)
    }

    /// Ensure a `pending` record exists for every spec, then persist.
    ///
    /// Idempotent: records that already exist keep their status and counters,
    /// so re-running after an interrupt never loses progress.
    pub fn initialize(&mut self, specs: &[IndexSpec]) -> Result<(), Error> {
        let now = Utc::now();
        for spec in specs {
            self.state
                .gsis
                .entry(spec.table.clone())
                .or_default()
                .entry(spec.index_name.clone())
                .or_insert_with(|| IndexRecord {
                    status: IndexStatus::Pending,
                    retry_count: 0,
                    last_error: None,
                    created_at: now,
                    updated_at: now,
                });
        }
        self.persist()
    }

    /// Overwrite one record's status, retry count, and last error, then
    /// persist the whole state synchronously.
    pub fn update(
        &mut self,
        table: &str,
        index: &str,
        status: IndexStatus,
        retry_count: u32,
        last_error: Option<&str>,
    ) -> Result<(), Error> {
        let record = self
            .state
            .gsis
            .get_mut(table)
            .and_then(|indexes| indexes.get_mut(index))
            .ok_or_else(|| Error::UnknownRecord {
                table: table.to_string(),
                index: index.to_string(),
            })?;
        record.status = status;
        record.retry_count = retry_count;
        record.last_error = last_error.map(str::to_string);
        record.updated_at = Utc::now();
        self.persist()
    }

    pub fn get(&self, table: &str, index: &str) -> Option<&IndexRecord> {
        self.state.gsis.get(table).and_then(|m| m.get(index))
    }

    /// (table, index) pairs still waiting for their first attempt.
    pub fn pending(&self) -> Vec<(String, String)> {
        self.pairs_with_status(IndexStatus::Pending)
    }

    /// (table, index) pairs that exhausted their retry budget.
    pub fn failed(&self) -> Vec<(String, String)> {
        self.pairs_with_status(IndexStatus::Failed)
    }

    fn pairs_with_status(&self, wanted: IndexStatus) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (table, indexes) in &self.state.gsis {
            for (index, record) in indexes {
                if record.status == wanted {
                    pairs.push((table.clone(), index.clone()));
                }
            }
        }
        pairs
    }

    /// True iff the stored status is `active`; re-runs skip these pairs.
    pub fn should_skip(&self, table: &str, index: &str) -> bool {
        self.get(table, index)
            .map(|r| r.status == IndexStatus::Active)
            .unwrap_or(false)
    }

    /// True iff every record is `active`.
    pub fn is_complete(&self) -> bool {
        let mut any = false;
        for indexes in self.state.gsis.values() {
            for record in indexes.values() {
                any = true;
                if record.status != IndexStatus::Active {
                    return false;
                }
            }
        }
        any
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for indexes in self.state.gsis.values() {
            for record in indexes.values() {
                match record.status {
                    IndexStatus::Pending => counts.pending += 1,
                    IndexStatus::InProgress => counts.in_progress += 1,
                    IndexStatus::Active => counts.active += 1,
                    IndexStatus::Failed => counts.failed += 1,
                }
            }
        }
        counts
    }

    /// Archive the state file once every record is `active`.
    ///
    /// Renames the file to `<name>.<timestamp>.completed` in place, keeping
    /// an audit trail rather than deleting. Returns the archive path, or
    /// `None` when the run is not complete yet.
    pub fn cleanup(&self) -> Result<Option<PathBuf>, Error> {
        if !self.is_complete() || !self.path.exists() {
            return Ok(None);
        }
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let archive = self.path.with_file_name(format!(
            "{}.{stamp}.completed",
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "state".to_string()),
        ));
        std::fs::rename(&self.path, &archive).map_err(|e| Error::StateIo {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(Some(archive))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Write the whole state to a sibling temp file, then rename it over the
    /// state file. The rename is what makes a mid-write crash harmless.
    fn persist(&self) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(&self.state).map_err(|e| Error::StateFormat {
            path: self.path.clone(),
            source: e,
        })?;
        let tmp = self.path.with_file_name(format!(
            "{}.tmp",
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "state".to_string()),
        ));
        std::fs::write(&tmp, json.as_bytes()).map_err(|e| Error::StateIo {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Error::StateIo {
            path: self.path.clone(),
            source: e,
        })
    }
}

// ========== SHARED HANDLE ==========

/// Clonable handle passed to per-table tasks.
///
/// Methods lock, mutate, persist, and return; the lock is never held across
/// an await point. A poisoned lock is recovered rather than propagated since
/// the file on disk is always a complete snapshot.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<Mutex<StateStore>>);

impl SharedState {
    pub fn new(store: StateStore) -> Self {
        SharedState(Arc::new(Mutex::new(store)))
    }

    pub fn update(
        &self,
        table: &str,
        index: &str,
        status: IndexStatus,
        retry_count: u32,
        last_error: Option<&str>,
    ) -> Result<(), Error> {
        self.lock().update(table, index, status, retry_count, last_error)
    }

    pub fn should_skip(&self, table: &str, index: &str) -> bool {
        self.lock().should_skip(table, index)
    }

    pub fn is_complete(&self) -> bool {
        self.lock().is_complete()
    }

    pub fn counts(&self) -> StatusCounts {
        self.lock().counts()
    }

    pub fn failed(&self) -> Vec<(String, String)> {
        self.lock().failed()
    }

    pub fn cleanup(&self) -> Result<Option<PathBuf>, Error> {
        self.lock().cleanup()
    }

    pub fn with_store<T>(&self, f: impl FnOnce(&StateStore) -> T) -> T {
        f(&self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StateStore> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

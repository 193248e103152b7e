// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Result persistence and retrieval.
//!
//! Results are history: stores only ever append. [`InMemoryResultStore`] keeps
//! them in a vector; [`JsonlResultStore`] writes one JSON document per line.

use chrono::{DateTime, Utc};
use ih_core::IntegrationTestResult;
use ih_error::{Coded, ErrorCode};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Failures reported by a [`ResultStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A result could not be encoded.
    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
    /// A previous writer panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

impl Coded for StoreError {
    fn code(&self) -> ErrorCode {
        ErrorCode::StoreUnavailable
    }
}

/// Filter for [`ResultStore::query`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultQuery {
    /// Exact integration name.
    pub integration: Option<String>,
    /// Inclusive lower bound on `tested_at`.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `tested_at`.
    pub until: Option<DateTime<Utc>>,
}

impl ResultQuery {
    /// Match every stored result.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn integration(mut self, name: impl Into<String>) -> Self {
        self.integration = Some(name.into());
        self
    }

    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    pub fn matches(&self, result: &IntegrationTestResult) -> bool {
        let at = result.tested_at();
        self.integration
            .as_deref()
            .is_none_or(|n| n == result.integration_name())
            && self.since.is_none_or(|s| at >= s)
            && self.until.is_none_or(|u| at < u)
    }
}

/// Append-only history of test results.
pub trait ResultStore: Send + Sync {
    /// Persist one result.
    fn append(&self, result: &IntegrationTestResult) -> Result<(), StoreError>;

    /// Matching results in append order.
    fn query(&self, query: &ResultQuery) -> Result<Vec<IntegrationTestResult>, StoreError>;

    /// Most recently appended result for `integration`.
    fn latest(&self, integration: &str) -> Result<Option<IntegrationTestResult>, StoreError> {
        Ok(self
            .query(&ResultQuery::all().integration(integration))?
            .pop())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    results: Mutex<Vec<IntegrationTestResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.results.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultStore for InMemoryResultStore {
    fn append(&self, result: &IntegrationTestResult) -> Result<(), StoreError> {
        self.results
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .push(result.clone());
        Ok(())
    }

    fn query(&self, query: &ResultQuery) -> Result<Vec<IntegrationTestResult>, StoreError> {
        let results = self.results.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(results.iter().filter(|r| query.matches(r)).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// JSONL file
// ---------------------------------------------------------------------------

/// File-backed store: one JSON document per line, opened in append mode.
#[derive(Debug)]
pub struct JsonlResultStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlResultStore {
    /// Store backed by `path`. The file is created on first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ResultStore for JsonlResultStore {
    fn append(&self, result: &IntegrationTestResult) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let _guard = self.write_lock.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| self.io_error(e))?;
        debug!(
            target: "ih.store",
            path = %self.path.display(),
            integration = result.integration_name(),
            "result appended"
        );
        Ok(())
    }

    fn query(&self, query: &ResultQuery) -> Result<Vec<IntegrationTestResult>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut out = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<IntegrationTestResult>(line) {
                Ok(result) if query.matches(&result) => out.push(result),
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        target: "ih.store",
                        path = %self.path.display(),
                        line = idx + 1,
                        error = %e,
                        "skipping unreadable result"
                    );
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ih_core::{Capability, CapabilityEvidence, IntegrationIdentity, IntegrationKind};

    fn result_at(name: &str, secs: i64) -> IntegrationTestResult {
        IntegrationTestResult::builder(
            IntegrationIdentity::new(name, "pkg", Some("1.0")),
            IntegrationKind::ChatModel,
        )
        .tested_at(Utc.timestamp_opt(secs, 0).unwrap())
        .evidence(CapabilityEvidence::passed(Capability::Invoke, Some(0.1)))
        .finalize(|_| 0.4)
    }

    #[test]
    fn memory_store_filters_by_name_and_range() {
        let store = InMemoryResultStore::new();
        for (name, t) in [("A", 100), ("B", 200), ("A", 300)] {
            store.append(&result_at(name, t)).unwrap();
        }
        assert_eq!(store.len(), 3);
        assert_eq!(store.query(&ResultQuery::all().integration("A")).unwrap().len(), 2);

        let window = ResultQuery::all()
            .since(Utc.timestamp_opt(100, 0).unwrap())
            .until(Utc.timestamp_opt(300, 0).unwrap());
        let names: Vec<_> = store
            .query(&window)
            .unwrap()
            .iter()
            .map(|r| r.integration_name().to_string())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn latest_is_last_appended() {
        let store = InMemoryResultStore::new();
        let first = result_at("A", 100);
        let second = result_at("A", 200);
        store.append(&first).unwrap();
        store.append(&second).unwrap();
        assert_eq!(store.latest("A").unwrap().unwrap().run_id(), second.run_id());
        assert!(store.latest("Z").unwrap().is_none());
    }

    #[test]
    fn jsonl_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.jsonl");
        let original = result_at("ChatX", 1_000);
        JsonlResultStore::new(&path).append(&original).unwrap();
        JsonlResultStore::new(&path).append(&result_at("ChatY", 2_000)).unwrap();

        let reopened = JsonlResultStore::new(&path);
        let all = reopened.query(&ResultQuery::all()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], original);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn jsonl_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlResultStore::new(dir.path().join("none.jsonl"));
        assert!(store.query(&ResultQuery::all()).unwrap().is_empty());
    }

    #[test]
    fn jsonl_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.jsonl");
        let store = JsonlResultStore::new(&path);
        store.append(&result_at("A", 1)).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"{not json\n")
            .unwrap();
        store.append(&result_at("B", 2)).unwrap();
        assert_eq!(store.query(&ResultQuery::all()).unwrap().len(), 2);
    }

    #[test]
    fn unwritable_path_is_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let store = JsonlResultStore::new(dir.path());
        let err = store.append(&result_at("A", 1)).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(err.code(), ErrorCode::StoreUnavailable);
    }
}

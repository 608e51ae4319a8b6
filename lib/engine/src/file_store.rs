//! JSON file backed schedule store.
//!
//! The whole record set is kept as a single versioned snapshot. A commit
//! reads the snapshot, applies the change set, writes the result to a
//! sibling temporary file and renames it over the original, so readers see
//! either the old or the new snapshot and never a partial one.
//!
//! Snapshots written before tombstones existed (version 1) hold only the
//! record list. They still load, with no tombstones.

use crate::envelope::{CURRENT_VERSION, Envelope, RawEnvelope};
use crate::error::StoreError;
use crate::store::{ChangeSet, ScheduleRecord, ScheduleStore, StoreSnapshot};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Envelope version whose payload is a bare record list.
const RECORDS_ONLY_VERSION: u32 = 1;

/// A store that persists records to a JSON file.
#[derive(Debug)]
pub struct FileScheduleStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileScheduleStore {
    /// Creates a store backed by `path`. The file is created on first commit.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreSnapshot::default()),
            Err(e) => {
                return Err(StoreError::ReadFailed {
                    reason: format!("{}: {e}", self.path.display()),
                });
            }
        };

        let corrupt = |e: serde_json::Error| StoreError::Corrupt {
            reason: e.to_string(),
        };
        let raw = RawEnvelope::from_json_bytes(&bytes).map_err(corrupt)?;
        match raw.version {
            CURRENT_VERSION => {
                let envelope: Envelope<StoreSnapshot> =
                    raw.deserialize_payload().map_err(corrupt)?;
                Ok(envelope.into_payload())
            }
            RECORDS_ONLY_VERSION => {
                let envelope: Envelope<Vec<ScheduleRecord>> =
                    raw.deserialize_payload().map_err(corrupt)?;
                info!(path = %self.path.display(), "upgrading snapshot without tombstones");
                Ok(StoreSnapshot {
                    records: envelope.into_payload(),
                    retired: Default::default(),
                })
            }
            version => Err(StoreError::UnsupportedVersion { version }),
        }
    }

    async fn write_snapshot(&self, snapshot: StoreSnapshot) -> Result<(), StoreError> {
        let bytes = Envelope::new(snapshot)
            .to_json_bytes()
            .map_err(|e| StoreError::WriteFailed {
                reason: format!("failed to serialize snapshot: {e}"),
            })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::WriteFailed {
                    reason: format!("{}: {e}", parent.display()),
                })?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| StoreError::WriteFailed {
                reason: format!("{}: {e}", temp.display()),
            })?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StoreError::WriteFailed {
                reason: format!("{}: {e}", self.path.display()),
            })?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for FileScheduleStore {
    async fn load(&self) -> Result<StoreSnapshot, StoreError> {
        self.read_snapshot().await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;

        let (mut records, mut retired) = self.read_snapshot().await?.into_parts();
        changes.apply_to(&mut records, &mut retired);

        debug!(
            path = %self.path.display(),
            records = records.len(),
            retired = retired.len(),
            "writing schedule snapshot"
        );
        self.write_snapshot(StoreSnapshot::from_parts(records, retired))
            .await
    }
}

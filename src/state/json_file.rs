//! JSON file snapshot backend
//!
//! The snapshot is written to a sibling temporary file, synced, and renamed over the
//! target, so a crash leaves either the previous snapshot or the new one on disk.

use crate::state::snapshot::ProgressSnapshot;
use crate::state::traits::{SnapshotBackend, StateError, StateResult};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Snapshot stored as a pretty-printed JSON document
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<file>.tmp` next to the target, so the rename stays on one filesystem
    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn corrupt(&self, message: impl ToString) -> StateError {
        StateError::Corrupt {
            location: self.describe(),
            message: message.to_string(),
        }
    }
}

impl SnapshotBackend for JsonFileBackend {
    fn read(&self) -> StateResult<Option<ProgressSnapshot>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.corrupt(e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| self.corrupt(e))
    }

    fn write(&mut self, snapshot: &ProgressSnapshot) -> StateResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let encoded = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = self.tmp_path();

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        // make the rename itself durable
        #[cfg(unix)]
        if let Some(parent) = self.path.parent() {
            let dir = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            File::open(dir)?.sync_all()?;
        }

        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

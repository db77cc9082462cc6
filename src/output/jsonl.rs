//! Append-only JSONL output
//!
//! One serialized [`OutputRecord`] per line. Every batch is synced to disk before
//! `append_batch` returns. On open the existing file is scanned: a torn trailing line
//! left by a crash is cut off and the `(collection, issue_key)` pairs already present
//! are indexed, so re-appending a known issue is suppressed.

use crate::output::traits::{OutputError, OutputResult, OutputSink};
use crate::state::{CollectionKey, ItemId};
use crate::transform::OutputRecord;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// The parts of a stored line needed for the index
#[derive(Deserialize)]
struct IndexedLine {
    issue_key: String,
    #[serde(default)]
    metadata: Option<IndexedMetadata>,
}

#[derive(Deserialize)]
struct IndexedMetadata {
    #[serde(default)]
    collection: Option<String>,
}

impl IndexedLine {
    /// Collection the line belongs to; lines without one fall back to the key prefix
    fn collection(&self) -> CollectionKey {
        match self.metadata.as_ref().and_then(|m| m.collection.as_deref()) {
            Some(collection) => CollectionKey::new(collection),
            None => CollectionKey::new(
                self.issue_key
                    .rsplit_once('-')
                    .map(|(prefix, _)| prefix)
                    .unwrap_or(&self.issue_key),
            ),
        }
    }
}

/// JSONL file sink
pub struct JsonlSink {
    path: PathBuf,
    file: File,
    index: HashMap<CollectionKey, HashSet<ItemId>>,
    records: usize,
}

impl JsonlSink {
    /// Opens (or creates) the output file, recovering and indexing existing content
    pub fn open(path: impl Into<PathBuf>) -> OutputResult<Self> {
        let path = path.into();
        let io_err = |source: std::io::Error| OutputError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let existing = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(io_err(e)),
        };

        let valid_len = match existing.iter().rposition(|b| *b == b'\n') {
            Some(last_newline) => last_newline + 1,
            None => 0,
        };

        if valid_len < existing.len() {
            tracing::warn!(
                "Discarding {} bytes of incomplete trailing record in {}",
                existing.len() - valid_len,
                path.display()
            );
            let file = OpenOptions::new().write(true).open(&path).map_err(io_err)?;
            file.set_len(valid_len as u64).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }

        let mut index: HashMap<CollectionKey, HashSet<ItemId>> = HashMap::new();
        let mut records = 0;
        for (number, line) in existing[..valid_len].split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<IndexedLine>(line) {
                Ok(entry) => {
                    index
                        .entry(entry.collection())
                        .or_default()
                        .insert(ItemId::new(entry.issue_key));
                    records += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        "Skipping unreadable line {} of {}: {}",
                        number + 1,
                        path.display(),
                        e
                    );
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;

        tracing::info!(
            "Opened output {} ({} existing records)",
            path.display(),
            records
        );

        Ok(Self {
            path,
            file,
            index,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records in the file
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    fn io_error(&self, source: std::io::Error) -> OutputError {
        OutputError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl OutputSink for JsonlSink {
    fn append_batch(&mut self, records: &[OutputRecord]) -> OutputResult<()> {
        let mut buffer = Vec::new();
        let mut appended: Vec<(CollectionKey, ItemId)> = Vec::new();

        for record in records {
            let collection = CollectionKey::new(record.metadata.collection.as_str());
            let id = ItemId::new(record.issue_key.as_str());
            let already_present = self.contains(&collection, &id)
                || appended.iter().any(|(c, i)| *c == collection && *i == id);
            if already_present {
                tracing::debug!("Output already holds {}, not appending again", id);
                continue;
            }

            serde_json::to_writer(&mut buffer, record).map_err(|source| {
                OutputError::Serialization {
                    issue_key: record.issue_key.clone(),
                    source,
                }
            })?;
            buffer.push(b'\n');
            appended.push((collection, id));
        }

        if appended.is_empty() {
            return Ok(());
        }

        self.file
            .write_all(&buffer)
            .map_err(|e| self.io_error(e))?;
        self.file.sync_all().map_err(|e| self.io_error(e))?;

        self.records += appended.len();
        for (collection, id) in appended {
            self.index.entry(collection).or_default().insert(id);
        }

        Ok(())
    }

    fn contains(&self, collection: &CollectionKey, id: &ItemId) -> bool {
        self.index
            .get(collection)
            .map(|ids| ids.contains(id))
            .unwrap_or(false)
    }
}

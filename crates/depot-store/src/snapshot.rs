//! JSON snapshots of an [`InMemoryArchive`].
//!
//! A snapshot holds every record (filed under its id) and every blob. Indices
//! are not stored; they are rebuilt on load. In-flight ingests are not part of
//! a snapshot.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ArchiveConfig;
use crate::error::{StoreError, StoreResult};
use crate::memory::{ArchiveState, InMemoryArchive};
use crate::package::PackageEntry;
use crate::record::Blob;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized archive contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSnapshot {
    pub version: u32,
    /// Sorted by id.
    pub records: Vec<PackageEntry>,
    pub blobs: Vec<Blob>,
}

impl InMemoryArchive {
    /// Capture the archive's records and blobs.
    pub fn snapshot(&self) -> StoreResult<ArchiveSnapshot> {
        let state = self.read_state()?;
        let mut records: Vec<PackageEntry> = state
            .records
            .iter()
            .map(|(id, record)| PackageEntry {
                id: *id,
                record: record.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        let mut blobs: Vec<(_, Blob)> = state
            .blobs
            .iter()
            .map(|(id, blob)| (*id, blob.clone()))
            .collect();
        blobs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ArchiveSnapshot {
            version: SNAPSHOT_VERSION,
            records,
            blobs: blobs.into_iter().map(|(_, blob)| blob).collect(),
        })
    }

    /// Rebuild an archive from a snapshot, verifying every record id.
    pub fn from_snapshot(snapshot: ArchiveSnapshot, config: ArchiveConfig) -> StoreResult<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Serialization(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        let mut state = ArchiveState::default();
        for blob in snapshot.blobs {
            state.insert_blob(blob);
        }
        for entry in snapshot.records {
            entry.verify().map_err(|e| StoreError::CorruptRecord {
                id: entry.id,
                reason: e.to_string(),
            })?;
            if let Some(content) = entry.record.content {
                if !state.blobs.contains_key(&content) {
                    return Err(StoreError::CorruptRecord {
                        id: entry.id,
                        reason: format!("content blob {} missing", content.short_hex()),
                    });
                }
            }
            state.insert_record(entry.id, entry.record);
        }
        Ok(Self::from_state(config, state))
    }

    /// Write a snapshot to `path`.
    ///
    /// The file is written next to its destination and moved into place, so
    /// an interrupted save leaves the previous snapshot intact.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let snapshot = self.snapshot()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, &snapshot)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| StoreError::Persist {
            path: path.to_path_buf(),
            reason: e.error.to_string(),
        })?;

        info!(
            path = %path.display(),
            records = snapshot.records.len(),
            blobs = snapshot.blobs.len(),
            "snapshot saved"
        );
        Ok(())
    }

    /// Load an archive from a snapshot file.
    pub fn load(path: &Path, config: ArchiveConfig) -> StoreResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let snapshot: ArchiveSnapshot = serde_json::from_reader(reader)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        debug!(path = %path.display(), records = snapshot.records.len(), "snapshot read");
        Self::from_snapshot(snapshot, config)
    }

    /// Load `path` if it exists, otherwise start empty.
    pub fn open_or_create(path: &Path, config: ArchiveConfig) -> StoreResult<Self> {
        if path.exists() {
            Self::load(path, config)
        } else {
            debug!(path = %path.display(), "no snapshot; starting empty archive");
            Ok(Self::with_config(config))
        }
    }
}

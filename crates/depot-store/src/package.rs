use serde::{Deserialize, Serialize};

use depot_types::{ArchiveId, BusinessId};

use crate::error::{StoreError, StoreResult};
use crate::record::{ArchivalRecord, Blob};

/// A record filed under its content-addressed id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub id: ArchiveId,
    pub record: ArchivalRecord,
}

impl PackageEntry {
    /// File a record under its computed id.
    pub fn new(record: ArchivalRecord) -> StoreResult<Self> {
        let id = record.compute_id()?;
        Ok(Self { id, record })
    }

    /// Recompute the id and compare with the filed one.
    pub fn verify(&self) -> StoreResult<()> {
        let computed = self.record.compute_id()?;
        if computed != self.id {
            return Err(StoreError::HashMismatch {
                expected: self.id,
                computed,
            });
        }
        Ok(())
    }
}

/// One submission unit: the linked records and blobs produced for a single
/// business object (and its files).
///
/// Entries are ordered so that every record appears after the records it
/// links to within the package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Allocated package identifier.
    pub id: BusinessId,
    /// The business object this package deposits.
    pub subject: BusinessId,
    pub entries: Vec<PackageEntry>,
    pub blobs: Vec<Blob>,
}

impl Package {
    pub fn new(id: BusinessId, subject: BusinessId) -> Self {
        Self {
            id,
            subject,
            entries: Vec::new(),
            blobs: Vec::new(),
        }
    }

    /// Append a record and return its id.
    pub fn push(&mut self, record: ArchivalRecord) -> StoreResult<ArchiveId> {
        let entry = PackageEntry::new(record)?;
        let id = entry.id;
        self.entries.push(entry);
        Ok(id)
    }

    /// Append a blob (deduplicated) and return its id.
    pub fn push_blob(&mut self, blob: Blob) -> ArchiveId {
        let id = blob.compute_id();
        if !self.blobs.iter().any(|b| b.compute_id() == id) {
            self.blobs.push(blob);
        }
        id
    }

    pub fn get(&self, id: &ArchiveId) -> Option<&ArchivalRecord> {
        self.entries
            .iter()
            .find(|e| e.id == *id)
            .map(|e| &e.record)
    }

    pub fn record_ids(&self) -> Vec<ArchiveId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    /// The state record this package writes for its subject.
    pub fn subject_state(&self) -> Option<(ArchiveId, &ArchivalRecord)> {
        self.entries
            .iter()
            .find(|e| e.record.is_state() && e.record.business_id == self.subject)
            .map(|e| (e.id, &e.record))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use serde::{Deserialize, Serialize};

use depot_types::{ArchiveId, BusinessId};

use crate::error::StoreResult;
use crate::package::Package;
use crate::record::{ArchivalRecord, Blob};

/// Read side of a content-addressed archive.
///
/// All implementations must satisfy these invariants:
/// - Records are immutable once stored.
/// - A record is visible only after the package carrying it has been applied.
/// - Concurrent reads are always safe.
pub trait ArchiveStore: Send + Sync {
    /// Read a record by id. Returns `Ok(None)` if it does not exist.
    fn read(&self, id: &ArchiveId) -> StoreResult<Option<ArchivalRecord>>;

    /// Read a content blob by id.
    fn read_blob(&self, id: &ArchiveId) -> StoreResult<Option<Blob>>;

    /// Look up the root record of a business id.
    fn root_of(&self, business_id: &BusinessId) -> StoreResult<Option<ArchiveId>>;

    /// Ids of all records that list `target` in their `parents`.
    fn referencing(&self, target: &ArchiveId) -> StoreResult<Vec<ArchiveId>>;

    /// Ids of all records whose `successor_of` is `target`.
    fn successors(&self, target: &ArchiveId) -> StoreResult<Vec<ArchiveId>>;

    fn exists(&self, id: &ArchiveId) -> StoreResult<bool> {
        Ok(self.read(id)?.is_some())
    }

    /// Read several records. Default implementation calls `read()` per id.
    fn read_batch(&self, ids: &[ArchiveId]) -> StoreResult<Vec<Option<ArchivalRecord>>> {
        ids.iter().map(|id| self.read(id)).collect()
    }
}

/// Handle for a package accepted by an [`IngestBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IngestTicket(pub u64);

impl std::fmt::Display for IngestTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ingest#{}", self.0)
    }
}

/// Where an accepted package stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestProgress {
    /// Still being processed.
    InProgress,
    /// Applied; every record is durably stored and queryable.
    Complete { records: Vec<ArchiveId> },
    /// Rejected; nothing from the package was stored.
    Rejected { reason: String },
}

impl IngestProgress {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Write side of the archive: asynchronous package ingest.
pub trait IngestBackend: Send + Sync {
    /// Hand a package to the archive.
    ///
    /// Fails only when the archive cannot be reached. Validation happens
    /// later and surfaces as [`IngestProgress::Rejected`].
    fn accept(&self, package: Package) -> StoreResult<IngestTicket>;

    /// Check on an accepted package. Once finished, the answer never changes.
    fn progress(&self, ticket: &IngestTicket) -> StoreResult<IngestProgress>;
}

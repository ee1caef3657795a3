use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use depot_types::{ArchiveId, BusinessId};

use crate::config::ArchiveConfig;
use crate::error::{StoreError, StoreResult};
use crate::package::Package;
use crate::record::{ArchivalRecord, Blob};
use crate::traits::{ArchiveStore, IngestBackend, IngestProgress, IngestTicket};
use crate::validation::check_package;

/// Records, blobs and the indices derived from them.
#[derive(Debug, Default)]
pub(crate) struct ArchiveState {
    pub(crate) records: HashMap<ArchiveId, ArchivalRecord>,
    pub(crate) blobs: HashMap<ArchiveId, Blob>,
    /// Business id → root record. The only index that is not pure lookup
    /// acceleration: it is what makes a business id resolvable at all.
    pub(crate) roots: BTreeMap<BusinessId, ArchiveId>,
    /// Record → records listing it in `parents`.
    pub(crate) referencing: HashMap<ArchiveId, Vec<ArchiveId>>,
    /// Record → records naming it in `successor_of`.
    pub(crate) successors: HashMap<ArchiveId, Vec<ArchiveId>>,
}

impl ArchiveState {
    pub(crate) fn insert_record(&mut self, id: ArchiveId, record: ArchivalRecord) {
        if self.records.contains_key(&id) {
            return;
        }
        for parent in &record.parents {
            self.referencing.entry(*parent).or_default().push(id);
        }
        if let Some(previous) = record.successor_of {
            self.successors.entry(previous).or_default().push(id);
        }
        if record.is_root() {
            self.roots.insert(record.business_id.clone(), id);
        }
        self.records.insert(id, record);
    }

    pub(crate) fn insert_blob(&mut self, blob: Blob) {
        self.blobs.entry(blob.compute_id()).or_insert(blob);
    }
}

/// A package waiting to be processed, or the answer once it has been.
#[derive(Debug)]
struct Staged {
    package: Option<Package>,
    remaining: u32,
    outcome: Option<IngestProgress>,
}

#[derive(Debug, Default)]
struct IngestQueue {
    next_ticket: u64,
    staged: HashMap<u64, Staged>,
}

/// In-memory archive.
///
/// Intended for tests, embedding and the CLI (through snapshots). Packages
/// accepted through [`IngestBackend::accept`] stay in flight for
/// [`ArchiveConfig::ingest_latency`] progress checks, then are validated and
/// applied all-or-nothing.
pub struct InMemoryArchive {
    config: ArchiveConfig,
    state: RwLock<ArchiveState>,
    queue: Mutex<IngestQueue>,
    available: AtomicBool,
}

impl InMemoryArchive {
    /// Create an empty archive with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ArchiveConfig::default())
    }

    pub fn with_config(config: ArchiveConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ArchiveState::default()),
            queue: Mutex::new(IngestQueue::default()),
            available: AtomicBool::new(true),
        }
    }

    pub(crate) fn from_state(config: ArchiveConfig, state: ArchiveState) -> Self {
        Self {
            state: RwLock::new(state),
            ..Self::with_config(config)
        }
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Simulate the archive going offline (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of records stored.
    pub fn len(&self) -> usize {
        self.read_state().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn blob_count(&self) -> usize {
        self.read_state().map(|s| s.blobs.len()).unwrap_or(0)
    }

    /// Packages accepted but not yet processed.
    pub fn pending_ingests(&self) -> usize {
        self.queue
            .lock()
            .map(|q| q.staged.values().filter(|s| s.outcome.is_none()).count())
            .unwrap_or(0)
    }

    /// Every business id with a root record, in id order.
    pub fn roots(&self) -> StoreResult<Vec<(BusinessId, ArchiveId)>> {
        let state = self.read_state()?;
        Ok(state.roots.iter().map(|(b, a)| (b.clone(), *a)).collect())
    }

    /// Sorted list of all record ids.
    pub fn all_ids(&self) -> StoreResult<Vec<ArchiveId>> {
        let state = self.read_state()?;
        let mut ids: Vec<ArchiveId> = state.records.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    /// Validate and apply a package right away, bypassing the ingest queue.
    pub fn ingest_now(&self, package: Package) -> StoreResult<IngestProgress> {
        if !self.is_available() {
            return Err(StoreError::Unavailable("archive is offline".into()));
        }
        self.apply(package)
    }

    fn apply(&self, package: Package) -> StoreResult<IngestProgress> {
        let mut state = self.write_state()?;
        if let Err(reason) = check_package(&state, &package, self.config.conflict_policy) {
            warn!(package = %package.id, subject = %package.subject, %reason, "package rejected");
            return Ok(IngestProgress::Rejected { reason });
        }

        let records = package.record_ids();
        for blob in package.blobs {
            state.insert_blob(blob);
        }
        for entry in package.entries {
            debug!(
                record = %entry.id.short_hex(),
                kind = %entry.record.kind,
                business_id = %entry.record.business_id,
                "stored record"
            );
            state.insert_record(entry.id, entry.record);
        }
        info!(package = %package.id, subject = %package.subject, records = records.len(), "package applied");
        Ok(IngestProgress::Complete { records })
    }

    pub(crate) fn read_state(&self) -> StoreResult<RwLockReadGuard<'_, ArchiveState>> {
        self.state
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_state(&self) -> StoreResult<RwLockWriteGuard<'_, ArchiveState>> {
        self.state
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl Default for InMemoryArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveStore for InMemoryArchive {
    fn read(&self, id: &ArchiveId) -> StoreResult<Option<ArchivalRecord>> {
        Ok(self.read_state()?.records.get(id).cloned())
    }

    fn read_blob(&self, id: &ArchiveId) -> StoreResult<Option<Blob>> {
        Ok(self.read_state()?.blobs.get(id).cloned())
    }

    fn root_of(&self, business_id: &BusinessId) -> StoreResult<Option<ArchiveId>> {
        Ok(self.read_state()?.roots.get(business_id).copied())
    }

    fn referencing(&self, target: &ArchiveId) -> StoreResult<Vec<ArchiveId>> {
        Ok(self
            .read_state()?
            .referencing
            .get(target)
            .cloned()
            .unwrap_or_default())
    }

    fn successors(&self, target: &ArchiveId) -> StoreResult<Vec<ArchiveId>> {
        Ok(self
            .read_state()?
            .successors
            .get(target)
            .cloned()
            .unwrap_or_default())
    }

    fn exists(&self, id: &ArchiveId) -> StoreResult<bool> {
        Ok(self.read_state()?.records.contains_key(id))
    }
}

impl IngestBackend for InMemoryArchive {
    fn accept(&self, package: Package) -> StoreResult<IngestTicket> {
        if !self.is_available() {
            return Err(StoreError::Unavailable("archive is offline".into()));
        }
        let mut queue = self
            .queue
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        queue.next_ticket += 1;
        let ticket = IngestTicket(queue.next_ticket);
        debug!(%ticket, package = %package.id, entries = package.len(), "package accepted");
        queue.staged.insert(
            ticket.0,
            Staged {
                package: Some(package),
                remaining: self.config.ingest_latency,
                outcome: None,
            },
        );
        Ok(ticket)
    }

    fn progress(&self, ticket: &IngestTicket) -> StoreResult<IngestProgress> {
        let mut queue = self
            .queue
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let staged = queue
            .staged
            .get_mut(&ticket.0)
            .ok_or(StoreError::UnknownTicket(ticket.0))?;

        if let Some(outcome) = &staged.outcome {
            return Ok(outcome.clone());
        }
        if staged.remaining > 0 {
            staged.remaining -= 1;
            return Ok(IngestProgress::InProgress);
        }

        let outcome = match staged.package.take() {
            Some(package) => self.apply(package)?,
            None => IngestProgress::Rejected {
                reason: "package lost before processing".into(),
            },
        };
        staged.outcome = Some(outcome.clone());
        Ok(outcome)
    }
}

impl std::fmt::Debug for InMemoryArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryArchive")
            .field("record_count", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

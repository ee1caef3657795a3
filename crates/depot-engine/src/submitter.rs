//! Deposit submission and per-deposit status tracking.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use depot_store::{IngestBackend, IngestProgress, IngestTicket, Package, StoreError};
use depot_types::{ArchiveId, BusinessId, Category, DepositId};

use crate::error::{EngineError, EngineResult, MappingError};

/// Lifecycle of a deposit.
///
/// `Pending` moves to `Deposited` or `Failed`; both are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    Pending,
    Deposited,
    Failed,
}

impl DepositStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition_to(&self, next: DepositStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Deposited) | (Self::Pending, Self::Failed)
        )
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Deposited => write!(f, "DEPOSITED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One submission attempt and what became of it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub deposit_id: DepositId,
    pub package_id: BusinessId,
    pub subject: BusinessId,
    pub category: Category,
    /// State record the package writes for its subject.
    pub subject_state: ArchiveId,
    pub ticket: IngestTicket,
    pub status: DepositStatus,
    /// Records stored, once deposited.
    pub records: Vec<ArchiveId>,
    pub failure: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Progress checks made so far.
    pub attempts: u32,
}

impl DepositRecord {
    /// Apply an archive answer. Returns `false` if the record was already
    /// final and nothing changed.
    fn apply(&mut self, progress: IngestProgress) -> bool {
        let now = Utc::now();
        let next = match &progress {
            IngestProgress::InProgress => DepositStatus::Pending,
            IngestProgress::Complete { .. } => DepositStatus::Deposited,
            IngestProgress::Rejected { .. } => DepositStatus::Failed,
        };
        if self.status.is_terminal() {
            return false;
        }
        self.attempts += 1;
        self.updated_at = now;
        if !self.status.can_transition_to(next) {
            return true;
        }
        match progress {
            IngestProgress::Complete { records } => self.records = records,
            IngestProgress::Rejected { reason } => self.failure = Some(reason),
            IngestProgress::InProgress => {}
        }
        self.status = next;
        self.completed_at = Some(now);
        true
    }
}

/// Hands packages to the archive and tracks every deposit it issued.
///
/// Deposit records live only as long as the submitter.
pub struct DepositSubmitter<B: IngestBackend + ?Sized> {
    backend: Arc<B>,
    deposits: RwLock<HashMap<DepositId, DepositRecord>>,
}

impl<B: IngestBackend + ?Sized> DepositSubmitter<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            deposits: RwLock::new(HashMap::new()),
        }
    }

    /// Submit a package. The deposit starts out `Pending`.
    ///
    /// If the archive refuses the hand-off, no deposit id is issued.
    pub fn submit(&self, package: Package) -> EngineResult<DepositId> {
        let (subject_state, record) = package.subject_state().ok_or_else(|| {
            MappingError::Malformed(format!("package {} has no state for its subject", package.id))
        })?;
        let category = record.category;
        let package_id = package.id.clone();
        let subject = package.subject.clone();

        let ticket = self.backend.accept(package).map_err(|e| {
            warn!(%subject, error = %e, "archive refused package");
            EngineError::Submission(e.to_string())
        })?;

        let deposit_id = DepositId::new();
        let now = Utc::now();
        info!(deposit = %deposit_id, %subject, %category, %ticket, "deposit submitted");
        self.write()?.insert(
            deposit_id,
            DepositRecord {
                deposit_id,
                package_id,
                subject,
                category,
                subject_state,
                ticket,
                status: DepositStatus::Pending,
                records: Vec::new(),
                failure: None,
                submitted_at: now,
                updated_at: now,
                completed_at: None,
                attempts: 0,
            },
        );
        Ok(deposit_id)
    }

    pub fn status(&self, deposit_id: &DepositId) -> EngineResult<DepositStatus> {
        Ok(self.record(deposit_id)?.status)
    }

    pub fn record(&self, deposit_id: &DepositId) -> EngineResult<DepositRecord> {
        self.read()?
            .get(deposit_id)
            .cloned()
            .ok_or(EngineError::UnknownDeposit(*deposit_id))
    }

    /// Ids of deposits still waiting on the archive, oldest first.
    pub fn pending(&self) -> EngineResult<Vec<DepositId>> {
        let deposits = self.read()?;
        let mut pending: Vec<&DepositRecord> = deposits
            .values()
            .filter(|r| r.status == DepositStatus::Pending)
            .collect();
        pending.sort_by_key(|r| (r.submitted_at, r.deposit_id));
        Ok(pending.into_iter().map(|r| r.deposit_id).collect())
    }

    /// Every deposit, oldest first.
    pub fn deposits(&self) -> EngineResult<Vec<DepositRecord>> {
        let mut all: Vec<DepositRecord> = self.read()?.values().cloned().collect();
        all.sort_by_key(|r| (r.submitted_at, r.deposit_id));
        Ok(all)
    }

    /// Ask the archive about one deposit and record the answer.
    ///
    /// The archive is queried without holding the tracker lock. An error
    /// from the archive leaves the deposit untouched.
    pub fn check(&self, deposit_id: &DepositId) -> EngineResult<DepositStatus> {
        let record = self.record(deposit_id)?;
        if record.status.is_terminal() {
            return Ok(record.status);
        }
        let progress = self.backend.progress(&record.ticket)?;

        let mut deposits = self.write()?;
        let record = deposits
            .get_mut(deposit_id)
            .ok_or(EngineError::UnknownDeposit(*deposit_id))?;
        if record.apply(progress) {
            match record.status {
                DepositStatus::Deposited => info!(
                    deposit = %deposit_id,
                    subject = %record.subject,
                    records = record.records.len(),
                    "deposit completed"
                ),
                DepositStatus::Failed => warn!(
                    deposit = %deposit_id,
                    subject = %record.subject,
                    reason = record.failure.as_deref().unwrap_or_default(),
                    "deposit failed"
                ),
                DepositStatus::Pending => {}
            }
        }
        Ok(record.status)
    }

    fn read(&self) -> EngineResult<RwLockReadGuard<'_, HashMap<DepositId, DepositRecord>>> {
        self.deposits
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()).into())
    }

    fn write(&self) -> EngineResult<RwLockWriteGuard<'_, HashMap<DepositId, DepositRecord>>> {
        self.deposits
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()).into())
    }
}

impl<B: IngestBackend + ?Sized> std::fmt::Debug for DepositSubmitter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.deposits.read().map(|d| d.len()).unwrap_or(0);
        f.debug_struct("DepositSubmitter")
            .field("deposits", &count)
            .finish()
    }
}

//! Deposit and versioning engine for Depot.
//!
//! Turns business objects (collections, data items, files, metadata) into
//! archive packages, submits them, tracks each deposit until the archive
//! applies or rejects it, and reads the current or historical state of any
//! object back out of the archive.
//!
//! # Components
//!
//! - [`IdAllocator`]: business id allocation (UUIDv7 or sequential)
//! - [`PackageMapper`]: object ⇄ package conversion, version chaining
//! - [`reconcile`]: per-file carry-forward / replace / add decisions
//! - [`DepositSubmitter`]: submission and deposit status tracking
//! - [`PollingDriver`]: manual ticks over pending deposits, [`wait_for`]
//! - [`VersionResolver`]: chain heads, history, ambiguity detection
//! - [`ArchiveQuery`]: retrieval by business or deposit id, children, metadata
//! - [`DepositEngine`]: the above wired to one archive
//!
//! # Example
//!
//! ```no_run
//! use depot_engine::{BusinessId, Collection, DepositEngine};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DepositEngine::in_memory();
//! let collection = Collection::new(BusinessId::new("col-1")?, "Survey 2024");
//! let (receipt, outcome) = engine.deposit_and_wait(collection).await?;
//! println!("{} -> {:?}", receipt.business_id, outcome);
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod mapper;
pub mod payload;
pub mod poller;
pub mod query;
pub mod reconcile;
pub mod resolver;
pub mod submitter;

pub use allocator::{AllocatorConfig, AllocatorStrategy, IdAllocator, SequentialAllocator, UuidAllocator};
pub use config::EngineConfig;
pub use container::{ContainerEntry, ExtractedContainer, CONTAINER_MEDIA_TYPES};
pub use engine::{DepositEngine, DepositReceipt};
pub use error::{EngineError, EngineResult, MappingError};
pub use mapper::{MappedPackage, PackageMapper};
pub use payload::{FileEntry, StatePayload};
pub use poller::{wait_for, AdvanceReport, PollPolicy, PollingDriver, WaitOutcome};
pub use query::{ArchiveQuery, Lookup, SearchResult};
pub use reconcile::{reconcile, FileAction, ReconciledFile, Reconciliation};
pub use resolver::{BusinessObjectState, VersionResolver};
pub use submitter::{DepositRecord, DepositStatus, DepositSubmitter};

// Re-export key types
pub use depot_model::{
    Archivable, BusinessObject, Collection, DataFile, DataItem, FileLinkage, MetadataFile, Person,
    Project,
};
pub use depot_store::{
    ArchiveConfig, ArchiveStore, ConflictPolicy, InMemoryArchive, IngestBackend, StoreError,
};
pub use depot_types::{ArchiveId, BusinessId, Category, DepositId};

//! Content-addressed archive for Depot.
//!
//! The archive holds immutable [`ArchivalRecord`]s and [`Blob`]s, each keyed by
//! a domain-separated BLAKE3 hash of its contents, plus one mutable index:
//! business id → root record id.
//!
//! # Record Types
//!
//! - **Root**: created once per business id, never replaced
//! - **State**: one per version; lists its root in `parents` and points at
//!   its predecessor through `successor_of`
//!
//! # Ingest
//!
//! Records only enter the archive through a [`Package`] handed to an
//! [`IngestBackend`]. Acceptance is synchronous; processing is not. Callers
//! poll [`IngestBackend::progress`] until the package is applied or rejected.
//!
//! # Backends
//!
//! - [`InMemoryArchive`]: `HashMap`-based archive with JSON snapshot
//!   persistence, configurable ingest latency and conflict policy
//!
//! # Design Rules
//!
//! 1. Records are immutable once written (content-addressing guarantees this).
//! 2. A package is applied all-or-nothing after validation.
//! 3. A business id gets exactly one root record.
//! 4. The archive never interprets record attributes.

pub mod config;
pub mod error;
pub mod hasher;
pub mod memory;
pub mod package;
pub mod record;
pub mod snapshot;
pub mod traits;
mod validation;

pub use config::{ArchiveConfig, ConflictPolicy};
pub use error::{StoreError, StoreResult};
pub use hasher::ContentHasher;
pub use memory::InMemoryArchive;
pub use package::{Package, PackageEntry};
pub use record::{ArchivalRecord, Blob, RecordKind};
pub use snapshot::ArchiveSnapshot;
pub use traits::{ArchiveStore, IngestBackend, IngestProgress, IngestTicket};

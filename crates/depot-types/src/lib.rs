//! Foundation types for Depot, the archival deposit and versioning engine.
//!
//! Every other Depot crate depends on `depot-types`. The types here carry no
//! behaviour beyond parsing, formatting and hashing.
//!
//! # Key Types
//!
//! - [`ArchiveId`]: Content-addressed identifier of one immutable archival record (BLAKE3 hash)
//! - [`BusinessId`]: Stable identifier of a business object, unchanged across versions
//! - [`Category`]: The kind of business object an identifier names
//! - [`DepositId`]: UUID v7 identifier of one submission attempt

pub mod archive;
pub mod business;
pub mod deposit;
pub mod error;

pub use archive::ArchiveId;
pub use business::{BusinessId, Category};
pub use deposit::DepositId;
pub use error::TypeError;

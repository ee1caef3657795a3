use thiserror::Error;

use depot_store::StoreError;
use depot_types::{ArchiveId, BusinessId, Category, DepositId};

/// Reasons a business object cannot be turned into a package.
///
/// Raised before anything is handed to the archive.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("parent {0} does not resolve to an archived object")]
    UnresolvableParent(BusinessId),

    #[error("parent {parent} is a {actual}, expected one of {expected:?}")]
    WrongParentCategory {
        parent: BusinessId,
        expected: Vec<Category>,
        actual: Category,
    },

    #[error("collection {0} would become its own ancestor")]
    CyclicParent(BusinessId),

    #[error("{business_id} is archived as a {actual}, not a {expected}")]
    CategoryMismatch {
        business_id: BusinessId,
        expected: Category,
        actual: Category,
    },

    #[error("file {0} appears more than once")]
    DuplicateFile(BusinessId),

    #[error("new file {0} has no content")]
    MissingContent(BusinessId),

    #[error("container {0} has no entries")]
    EmptyContainer(String),

    #[error("{name} ({media_type}) is not a container")]
    NotAContainer { name: String, media_type: String },

    #[error("malformed object: {0}")]
    Malformed(String),
}

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The identifier namespace could not issue an id. Nothing was submitted.
    #[error("identifier allocation failed: {0}")]
    AllocationFailure(String),

    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// The archive could not be reached. No deposit id was issued.
    #[error("submission failed: {0}")]
    Submission(String),

    /// More than one state record claims to be the current version.
    #[error("ambiguous version for {business_id}: {} heads", heads.len())]
    AmbiguousVersion {
        business_id: BusinessId,
        heads: Vec<ArchiveId>,
    },

    #[error("not found: {business_id}")]
    NotFound { business_id: BusinessId },

    #[error("unknown deposit: {0}")]
    UnknownDeposit(DepositId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub(crate) fn not_found(business_id: &BusinessId) -> Self {
        Self::NotFound {
            business_id: business_id.clone(),
        }
    }

    pub(crate) fn corrupt(id: ArchiveId, reason: impl Into<String>) -> Self {
        Self::Store(StoreError::CorruptRecord {
            id,
            reason: reason.into(),
        })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

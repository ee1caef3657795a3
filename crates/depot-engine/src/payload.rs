//! The attribute payload stored in state records.
//!
//! The archive treats attributes as opaque JSON. The engine stores one
//! [`StatePayload`] per state record, tagged by `kind`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use depot_store::{ArchivalRecord, StoreError};
use depot_types::{ArchiveId, BusinessId, Category};

use crate::error::{EngineError, EngineResult};

/// A file listed in an owner's state: which file, at which version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub business_id: BusinessId,
    pub state: ArchiveId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatePayload {
    Collection {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        parent_id: Option<BusinessId>,
    },
    DataItem {
        name: String,
        #[serde(default)]
        description: String,
        parent_id: BusinessId,
        #[serde(default)]
        files: Vec<FileEntry>,
    },
    DataFile {
        name: String,
        media_type: String,
        size: u64,
    },
    MetadataFile {
        name: String,
        #[serde(default)]
        format: String,
        parent_id: BusinessId,
        #[serde(default)]
        files: Vec<FileEntry>,
    },
    Project {
        name: String,
        #[serde(default)]
        description: String,
    },
    Person {
        name: String,
        #[serde(default)]
        email: Option<String>,
    },
}

impl StatePayload {
    pub fn category(&self) -> Category {
        match self {
            Self::Collection { .. } => Category::Collection,
            Self::DataItem { .. } => Category::DataItem,
            Self::DataFile { .. } => Category::DataFile,
            Self::MetadataFile { .. } => Category::MetadataFile,
            Self::Project { .. } => Category::Project,
            Self::Person { .. } => Category::Person,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Collection { name, .. }
            | Self::DataItem { name, .. }
            | Self::DataFile { name, .. }
            | Self::MetadataFile { name, .. }
            | Self::Project { name, .. }
            | Self::Person { name, .. } => name,
        }
    }

    /// Structural parent declared in the payload.
    pub fn parent_id(&self) -> Option<&BusinessId> {
        match self {
            Self::Collection { parent_id, .. } => parent_id.as_ref(),
            Self::DataItem { parent_id, .. } | Self::MetadataFile { parent_id, .. } => Some(parent_id),
            _ => None,
        }
    }

    /// The file manifest, for owners of files.
    pub fn files(&self) -> &[FileEntry] {
        match self {
            Self::DataItem { files, .. } | Self::MetadataFile { files, .. } => files,
            _ => &[],
        }
    }

    pub fn to_value(&self) -> EngineResult<Value> {
        serde_json::to_value(self)
            .map_err(|e| EngineError::Store(StoreError::Serialization(e.to_string())))
    }

    /// Decode the payload of a state record and check it against the
    /// record's category.
    pub fn from_record(id: ArchiveId, record: &ArchivalRecord) -> EngineResult<Self> {
        if !record.is_state() {
            return Err(EngineError::corrupt(id, "expected a state record"));
        }
        let payload: Self = serde_json::from_value(record.attributes.clone())
            .map_err(|e| EngineError::corrupt(id, format!("unreadable attributes: {e}")))?;
        if payload.category() != record.category {
            return Err(EngineError::corrupt(
                id,
                format!(
                    "{} payload on a {} record",
                    payload.category(),
                    record.category
                ),
            ));
        }
        Ok(payload)
    }
}

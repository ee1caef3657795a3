//! Containers unpacked by an external extractor.
//!
//! The engine never reads archive formats itself. An extractor hands over
//! the entries and the container's declared media type; the engine checks
//! the result and deposits it as one data item.

use serde::{Deserialize, Serialize};

use depot_model::{DataFile, DataItem};
use depot_types::BusinessId;

use crate::error::MappingError;

/// Media types accepted as containers.
pub const CONTAINER_MEDIA_TYPES: &[&str] = &[
    "application/zip",
    "application/x-tar",
    "application/gzip",
    "application/x-gtar",
    "application/x-7z-compressed",
    "inode/directory",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEntry {
    /// Path inside the container.
    pub path: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContainer {
    pub name: String,
    pub media_type: String,
    pub entries: Vec<ContainerEntry>,
}

impl ExtractedContainer {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, path: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.entries.push(ContainerEntry {
            path: path.into(),
            media_type: media_type.into(),
            data,
        });
        self
    }

    pub fn is_container_type(&self) -> bool {
        CONTAINER_MEDIA_TYPES.contains(&self.media_type.as_str())
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        if !self.is_container_type() {
            return Err(MappingError::NotAContainer {
                name: self.name.clone(),
                media_type: self.media_type.clone(),
            });
        }
        if self.entries.is_empty() {
            return Err(MappingError::EmptyContainer(self.name.clone()));
        }
        if let Some(entry) = self.entries.iter().find(|e| e.path.trim().is_empty()) {
            return Err(MappingError::Malformed(format!(
                "container {} has an entry without a path ({} bytes)",
                self.name,
                entry.data.len()
            )));
        }
        Ok(())
    }

    /// Validate and turn the container into a data item under `collection`.
    /// Every entry becomes a new file with an unassigned id.
    pub fn into_data_item(
        self,
        collection: BusinessId,
        id: Option<BusinessId>,
    ) -> Result<DataItem, MappingError> {
        self.validate()?;
        let files = self
            .entries
            .into_iter()
            .map(|entry| {
                DataFile::unassigned(entry.path)
                    .with_media_type(entry.media_type)
                    .with_source(entry.data)
            })
            .collect();
        Ok(DataItem {
            id,
            parent_id: collection,
            name: self.name,
            description: String::new(),
            files,
        })
    }
}

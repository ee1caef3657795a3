use serde::{Deserialize, Serialize};

use depot_types::{ArchiveId, BusinessId};

/// Where a deposited file currently lives in the archive.
///
/// Filled in on retrieval. A file that comes back into a deposit with its
/// linkage intact and no new `source` is carried forward by reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLinkage {
    /// Root record of the file's own version chain.
    pub root: ArchiveId,
    /// State record describing this version of the file.
    pub state: ArchiveId,
    /// Blob holding the file bytes.
    pub content: ArchiveId,
}

/// A single file belonging to a data item or metadata file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    /// Business identifier; allocated on deposit when absent.
    #[serde(default)]
    pub id: Option<BusinessId>,
    pub name: String,
    #[serde(default = "default_media_type")]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    /// New content. `None` means "keep whatever the archive already has".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkage: Option<FileLinkage>,
}

fn default_media_type() -> String {
    "application/octet-stream".into()
}

impl DataFile {
    /// A file with the given identifier and name and no content yet.
    pub fn new(id: BusinessId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            ..Self::unassigned(name)
        }
    }

    /// A file whose identifier will be allocated on deposit.
    pub fn unassigned(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            media_type: default_media_type(),
            size: 0,
            source: None,
            linkage: None,
        }
    }

    /// Attach new content; updates `size`.
    pub fn with_source(mut self, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        self.size = data.len() as u64;
        self.source = Some(data);
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Returns `true` if this file brings new content.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }
}

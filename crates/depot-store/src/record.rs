use serde::{Deserialize, Serialize};
use serde_json::Value;

use depot_types::{ArchiveId, BusinessId, Category};

use crate::error::{StoreError, StoreResult};
use crate::hasher::ContentHasher;

/// Whether a record anchors a business object or describes one version of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Created on first deposit of a business id, never replaced.
    Root,
    /// One version of the object's attributes.
    State,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::State => write!(f, "state"),
        }
    }
}

/// An immutable, content-addressed unit of the archive.
///
/// `parents` carries both the record's own root (always first, for state
/// records) and any structural parent. `successor_of` is the backward
/// lineage link to the previous state of the same business id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivalRecord {
    pub kind: RecordKind,
    pub business_id: BusinessId,
    pub category: Category,
    #[serde(default)]
    pub parents: Vec<ArchiveId>,
    #[serde(default)]
    pub successor_of: Option<ArchiveId>,
    /// Opaque to the archive. `Null` on root records.
    #[serde(default)]
    pub attributes: Value,
    /// Blob holding file bytes, for records that carry content.
    #[serde(default)]
    pub content: Option<ArchiveId>,
}

impl ArchivalRecord {
    /// The root record for a business id.
    pub fn root(business_id: BusinessId, category: Category) -> Self {
        Self {
            kind: RecordKind::Root,
            business_id,
            category,
            parents: Vec::new(),
            successor_of: None,
            attributes: Value::Null,
            content: None,
        }
    }

    /// A state record anchored to `root`, with no lineage yet.
    pub fn state(
        business_id: BusinessId,
        category: Category,
        root: ArchiveId,
        attributes: Value,
    ) -> Self {
        Self {
            kind: RecordKind::State,
            business_id,
            category,
            parents: vec![root],
            successor_of: None,
            attributes,
            content: None,
        }
    }

    /// Add a structural parent link.
    pub fn with_parent(mut self, parent: ArchiveId) -> Self {
        if !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
        self
    }

    /// Mark this state as the successor of `previous`.
    pub fn with_successor_of(mut self, previous: ArchiveId) -> Self {
        self.successor_of = Some(previous);
        self
    }

    pub fn with_content(mut self, blob: ArchiveId) -> Self {
        self.content = Some(blob);
        self
    }

    pub fn is_root(&self) -> bool {
        self.kind == RecordKind::Root
    }

    pub fn is_state(&self) -> bool {
        self.kind == RecordKind::State
    }

    /// Returns `true` if `id` appears in `parents`.
    pub fn links_to(&self, id: &ArchiveId) -> bool {
        self.parents.contains(id)
    }

    /// Parents other than `root`.
    pub fn structural_parents<'a>(
        &'a self,
        root: &'a ArchiveId,
    ) -> impl Iterator<Item = &'a ArchiveId> + 'a {
        self.parents.iter().filter(move |p| *p != root)
    }

    /// Number of lineage relationships (0 for a first state, 1 otherwise).
    pub fn relationship_count(&self) -> usize {
        usize::from(self.successor_of.is_some())
    }

    /// Canonical bytes used for content addressing.
    pub fn canonical_bytes(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Compute the content-addressed id of this record.
    pub fn compute_id(&self) -> StoreResult<ArchiveId> {
        let hasher = match self.kind {
            RecordKind::Root => &ContentHasher::ROOT,
            RecordKind::State => &ContentHasher::STATE,
        };
        Ok(hasher.hash(&self.canonical_bytes()?))
    }
}

/// Raw file content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn compute_id(&self) -> ArchiveId {
        ContentHasher::CONTENT.hash(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

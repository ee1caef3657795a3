use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest business identifier accepted.
pub const MAX_BUSINESS_ID_LEN: usize = 256;

/// Stable identifier of a business object.
///
/// A `BusinessId` is assigned once (by the caller or by an allocator) and
/// never changes across versions. Each new version of the object gets a new
/// [`ArchiveId`](crate::ArchiveId), but keeps its `BusinessId`.
///
/// Identifiers are non-empty, at most [`MAX_BUSINESS_ID_LEN`] bytes, and
/// contain no whitespace or control characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BusinessId(String);

impl BusinessId {
    /// Validate and wrap an identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        let reason = if value.is_empty() {
            Some("identifier is empty")
        } else if value.len() > MAX_BUSINESS_ID_LEN {
            Some("identifier is too long")
        } else if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Some("identifier contains whitespace or control characters")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(TypeError::InvalidBusinessId {
                value,
                reason: reason.into(),
            }),
            None => Ok(Self(value)),
        }
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BusinessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BusinessId({})", self.0)
    }
}

impl fmt::Display for BusinessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BusinessId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BusinessId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BusinessId> for String {
    fn from(id: BusinessId) -> Self {
        id.0
    }
}

/// The kind of business object (or allocation namespace) an identifier names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Collection,
    DataItem,
    DataFile,
    MetadataFile,
    Package,
    Person,
    Project,
}

impl Category {
    /// All categories, in declaration order.
    pub const ALL: [Category; 7] = [
        Self::Collection,
        Self::DataItem,
        Self::DataFile,
        Self::MetadataFile,
        Self::Package,
        Self::Person,
        Self::Project,
    ];

    /// Prefix used by allocators for identifiers of this category.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Collection => "col",
            Self::DataItem => "ds",
            Self::DataFile => "file",
            Self::MetadataFile => "meta",
            Self::Package => "pkg",
            Self::Person => "person",
            Self::Project => "proj",
        }
    }

    /// Snake-case name, as used in serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::DataItem => "data_item",
            Self::DataFile => "data_file",
            Self::MetadataFile => "metadata_file",
            Self::Package => "package",
            Self::Person => "person",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = TypeError;

    /// Accepts the snake-case name, the kebab-case name, or the allocator prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized || c.prefix() == normalized)
            .ok_or_else(|| TypeError::UnknownCategory(s.to_string()))
    }
}

use serde::{Deserialize, Serialize};

use depot_types::{BusinessId, Category};

use crate::file::DataFile;

/// A collection of sub-collections and data items.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub id: Option<BusinessId>,
    /// Enclosing collection, if any. Clearing it detaches the collection on
    /// the next deposit.
    #[serde(default)]
    pub parent_id: Option<BusinessId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Current children (sub-collections and data items), sorted by id.
    ///
    /// Derived on retrieval from the children's own latest state; ignored on
    /// deposit.
    #[serde(default)]
    pub children_ids: Vec<BusinessId>,
}

impl Collection {
    pub fn new(id: BusinessId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: BusinessId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A dataset inside a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItem {
    #[serde(default)]
    pub id: Option<BusinessId>,
    /// The owning collection.
    pub parent_id: BusinessId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered file list. Order is preserved across deposits.
    #[serde(default)]
    pub files: Vec<DataFile>,
}

impl DataItem {
    pub fn new(id: BusinessId, parent_id: BusinessId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            parent_id,
            name: name.into(),
            description: String::new(),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: DataFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Descriptive metadata attached to a collection or data item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFile {
    #[serde(default)]
    pub id: Option<BusinessId>,
    /// The object this metadata describes.
    pub parent_id: BusinessId,
    pub name: String,
    /// Metadata format label, e.g. `"ddi-3.2"` or `"datacite"`.
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub files: Vec<DataFile>,
}

impl MetadataFile {
    pub fn new(id: BusinessId, parent_id: BusinessId, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            parent_id,
            name: name.into(),
            format: String::new(),
            files: Vec::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_file(mut self, file: DataFile) -> Self {
        self.files.push(file);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: Option<BusinessId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub id: Option<BusinessId>,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Any object the engine can deposit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusinessObject {
    Collection(Collection),
    DataItem(DataItem),
    DataFile(DataFile),
    MetadataFile(MetadataFile),
    Project(Project),
    Person(Person),
}

impl BusinessObject {
    pub fn category(&self) -> Category {
        match self {
            Self::Collection(_) => Category::Collection,
            Self::DataItem(_) => Category::DataItem,
            Self::DataFile(_) => Category::DataFile,
            Self::MetadataFile(_) => Category::MetadataFile,
            Self::Project(_) => Category::Project,
            Self::Person(_) => Category::Person,
        }
    }

    pub fn id(&self) -> Option<&BusinessId> {
        match self {
            Self::Collection(o) => o.id.as_ref(),
            Self::DataItem(o) => o.id.as_ref(),
            Self::DataFile(o) => o.id.as_ref(),
            Self::MetadataFile(o) => o.id.as_ref(),
            Self::Project(o) => o.id.as_ref(),
            Self::Person(o) => o.id.as_ref(),
        }
    }

    pub fn set_id(&mut self, id: BusinessId) {
        let slot = match self {
            Self::Collection(o) => &mut o.id,
            Self::DataItem(o) => &mut o.id,
            Self::DataFile(o) => &mut o.id,
            Self::MetadataFile(o) => &mut o.id,
            Self::Project(o) => &mut o.id,
            Self::Person(o) => &mut o.id,
        };
        *slot = Some(id);
    }

    /// The structural parent, if the variant has one.
    pub fn parent_id(&self) -> Option<&BusinessId> {
        match self {
            Self::Collection(o) => o.parent_id.as_ref(),
            Self::DataItem(o) => Some(&o.parent_id),
            Self::MetadataFile(o) => Some(&o.parent_id),
            Self::DataFile(_) | Self::Project(_) | Self::Person(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Collection(o) => &o.name,
            Self::DataItem(o) => &o.name,
            Self::DataFile(o) => &o.name,
            Self::MetadataFile(o) => &o.name,
            Self::Project(o) => &o.name,
            Self::Person(o) => &o.name,
        }
    }

    /// The file list of variants that own files.
    pub fn files(&self) -> Option<&[DataFile]> {
        match self {
            Self::DataItem(o) => Some(&o.files),
            Self::MetadataFile(o) => Some(&o.files),
            _ => None,
        }
    }
}

/// A concrete business object type that can be pulled out of a
/// [`BusinessObject`] by category.
pub trait Archivable: Sized {
    const CATEGORY: Category;

    fn from_object(object: BusinessObject) -> Option<Self>;

    fn into_object(self) -> BusinessObject;
}

macro_rules! archivable {
    ($ty:ident, $category:ident) => {
        impl Archivable for $ty {
            const CATEGORY: Category = Category::$category;

            fn from_object(object: BusinessObject) -> Option<Self> {
                match object {
                    BusinessObject::$ty(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_object(self) -> BusinessObject {
                BusinessObject::$ty(self)
            }
        }

        impl From<$ty> for BusinessObject {
            fn from(inner: $ty) -> Self {
                BusinessObject::$ty(inner)
            }
        }
    };
}

archivable!(Collection, Collection);
archivable!(DataItem, DataItem);
archivable!(DataFile, DataFile);
archivable!(MetadataFile, MetadataFile);
archivable!(Project, Project);
archivable!(Person, Person);

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> BusinessId {
        BusinessId::new(s).unwrap()
    }

    #[test]
    fn accessors_follow_variant() {
        let item: BusinessObject = DataItem::new(id("ds-1"), id("col-1"), "Survey")
            .with_file(DataFile::new(id("file-1"), "a.csv"))
            .into();
        assert_eq!(item.category(), Category::DataItem);
        assert_eq!(item.id(), Some(&id("ds-1")));
        assert_eq!(item.parent_id(), Some(&id("col-1")));
        assert_eq!(item.name(), "Survey");
        assert_eq!(item.files().map(<[DataFile]>::len), Some(1));
    }

    #[test]
    fn top_level_collection_has_no_parent() {
        let col: BusinessObject = Collection::new(id("col-1"), "Root").into();
        assert!(col.parent_id().is_none());
        assert!(col.files().is_none());
    }

    #[test]
    fn set_id_fills_missing_identifier() {
        let mut person = BusinessObject::Person(Person {
            name: "Ada".into(),
            ..Person::default()
        });
        assert!(person.id().is_none());
        person.set_id(id("person-7"));
        assert_eq!(person.id(), Some(&id("person-7")));
    }

    #[test]
    fn archivable_extracts_matching_variant_only() {
        let obj: BusinessObject = Project {
            id: Some(id("proj-1")),
            name: "P".into(),
            description: String::new(),
        }
        .into();
        assert!(Collection::from_object(obj.clone()).is_none());
        let project = Project::from_object(obj).unwrap();
        assert_eq!(project.name, "P");
        assert_eq!(<Project as Archivable>::CATEGORY, Category::Project);
    }

    #[test]
    fn json_is_tagged_by_type() {
        let json = r#"{
            "type": "collection",
            "id": "col-9",
            "name": "Archive",
            "parent_id": "col-1"
        }"#;
        let obj: BusinessObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.category(), Category::Collection);
        assert_eq!(obj.parent_id(), Some(&id("col-1")));

        let back = serde_json::to_value(&obj).unwrap();
        assert_eq!(back["type"], "collection");
    }
}

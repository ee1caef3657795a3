//! Business objects for Depot.
//!
//! These are the caller-owned, in-memory objects that get deposited. The
//! engine owns their archival projection; nothing in this crate touches the
//! archive.
//!
//! - [`Collection`]: container of sub-collections and data items
//! - [`DataItem`]: a dataset inside a collection, with ordered [`DataFile`]s
//! - [`DataFile`]: one file, with optional new content and archive linkage
//! - [`MetadataFile`]: descriptive metadata attached to another object
//! - [`Project`], [`Person`]: standalone descriptive objects
//! - [`BusinessObject`]: the polymorphic wrapper the engine accepts

pub mod file;
pub mod object;

pub use file::{DataFile, FileLinkage};
pub use object::{
    Archivable, BusinessObject, Collection, DataItem, MetadataFile, Person, Project,
};

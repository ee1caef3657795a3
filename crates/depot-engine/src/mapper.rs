//! Conversion between business objects and archive packages.
//!
//! A first deposit of a business id produces a root record and a first state.
//! Later deposits produce only a state, chained to the current head through
//! `successor_of`. Structural parents are linked by their root id, so a
//! parent's later versions never orphan its children.
//!
//! Files of a data item or metadata file have their own root/state chains.
//! The owner's state lists them (id plus pinned file state) in its payload.

use std::collections::HashSet;

use tracing::{debug, warn};

use depot_model::{
    BusinessObject, Collection, DataFile, DataItem, FileLinkage, MetadataFile, Person, Project,
};
use depot_store::{ArchivalRecord, ArchiveStore, Blob, Package, StoreError};
use depot_types::{ArchiveId, BusinessId, Category};

use crate::allocator::IdAllocator;
use crate::error::{EngineError, EngineResult, MappingError};
use crate::payload::{FileEntry, StatePayload};
use crate::reconcile::{reconcile, FileAction, Reconciliation};
use crate::resolver::{BusinessObjectState, VersionResolver};

/// A package ready for submission, plus what the mapper decided.
#[derive(Clone, Debug)]
pub struct MappedPackage {
    pub package: Package,
    /// The deposited object with every id assigned and file linkage filled.
    pub object: BusinessObject,
    pub root: ArchiveId,
    pub subject_state: ArchiveId,
    /// Head this deposit succeeds, for updates.
    pub previous: Option<ArchiveId>,
    pub reconciliation: Option<Reconciliation>,
}

impl MappedPackage {
    pub fn business_id(&self) -> &BusinessId {
        &self.package.subject
    }

    pub fn is_update(&self) -> bool {
        self.previous.is_some()
    }
}

/// Allocations tried before giving up on finding an unused id.
const MAX_ALLOCATION_ATTEMPTS: usize = 16;

/// Categories a structural parent may have.
fn allowed_parents(category: Category) -> &'static [Category] {
    match category {
        Category::Collection | Category::DataItem => &[Category::Collection],
        Category::MetadataFile => &[Category::Collection, Category::DataItem],
        _ => &[],
    }
}

pub struct PackageMapper<'a, S: ArchiveStore + ?Sized> {
    store: &'a S,
    allocator: &'a dyn IdAllocator,
}

impl<'a, S: ArchiveStore + ?Sized> PackageMapper<'a, S> {
    pub fn new(store: &'a S, allocator: &'a dyn IdAllocator) -> Self {
        Self { store, allocator }
    }

    fn resolver(&self) -> VersionResolver<'a, S> {
        VersionResolver::new(self.store)
    }

    /// Map `object` into a package.
    ///
    /// `parent` optionally names the structural parent by archive id (its
    /// root or any of its states); otherwise the object's own `parent_id` is
    /// resolved. Nothing is written to the archive.
    pub fn to_package(
        &self,
        parent: Option<ArchiveId>,
        object: &BusinessObject,
    ) -> EngineResult<MappedPackage> {
        let mut object = object.clone();
        check_attributes(&object)?;
        let category = object.category();
        let business_id = match object.id() {
            Some(id) => id.clone(),
            None => {
                let id = self.allocate_fresh(category)?;
                object.set_id(id.clone());
                id
            }
        };

        let parent_root = self.resolve_parent(&mut object, parent)?;
        if let (Category::Collection, Some(parent_id)) = (category, object.parent_id()) {
            self.check_cycle(&business_id, parent_id)?;
        }

        let prior = match self.resolver().find_latest_state(&business_id) {
            Ok(state) if state.category != category => {
                return Err(MappingError::CategoryMismatch {
                    business_id,
                    expected: category,
                    actual: state.category,
                }
                .into())
            }
            Ok(state) => Some(state),
            Err(EngineError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let package_id = self.allocator.allocate(Category::Package)?;
        let mut package = Package::new(package_id, business_id.clone());
        let root = match &prior {
            Some(state) => state.root,
            None => package.push(ArchivalRecord::root(business_id.clone(), category))?,
        };

        let mut manifest = Vec::new();
        let mut reconciliation = None;
        let mut content = None;
        match &mut object {
            BusinessObject::DataItem(DataItem { files, .. })
            | BusinessObject::MetadataFile(MetadataFile { files, .. }) => {
                let (entries, outcome) = self.map_files(&mut package, root, prior.as_ref(), files)?;
                manifest = entries;
                reconciliation = Some(outcome);
            }
            BusinessObject::DataFile(file) => {
                content = Some(self.standalone_content(&mut package, &business_id, file, prior.as_ref())?);
            }
            _ => {}
        }

        let payload = payload_for(&object, manifest)?;
        let mut state =
            ArchivalRecord::state(business_id.clone(), category, root, payload.to_value()?);
        if let Some(parent_root) = parent_root {
            state = state.with_parent(parent_root);
        }
        if let Some(prior) = &prior {
            state = state.with_successor_of(prior.head);
        }
        if let Some(content) = content {
            state = state.with_content(content);
        }
        let subject_state = package.push(state)?;

        if let (BusinessObject::DataFile(file), Some(content)) = (&mut object, content) {
            file.linkage = Some(FileLinkage {
                root,
                state: subject_state,
                content,
            });
        }

        debug!(
            business_id = %business_id,
            %category,
            package = %package.id,
            records = package.len(),
            update = prior.is_some(),
            "mapped object to package"
        );
        Ok(MappedPackage {
            package,
            object,
            root,
            subject_state,
            previous: prior.map(|s| s.head),
            reconciliation,
        })
    }

    /// Rebuild the business object a package deposits.
    ///
    /// Records the package refers to but does not carry (carried-forward
    /// files) are read from the archive.
    pub fn from_package(&self, package: &Package) -> EngineResult<BusinessObject> {
        let (id, record) = package.subject_state().ok_or_else(|| {
            MappingError::Malformed(format!("package {} has no state for its subject", package.id))
        })?;
        self.object_from_record(&id, record, Some(package))
    }

    /// Rebuild the business object captured by a resolved state.
    pub fn from_state(&self, state: &BusinessObjectState) -> EngineResult<BusinessObject> {
        self.object_from_record(&state.head, &state.record, None)
    }

    /// The files listed by an owner's state record.
    pub fn files_of(&self, id: &ArchiveId, record: &ArchivalRecord) -> EngineResult<Vec<DataFile>> {
        let payload = StatePayload::from_record(*id, record)?;
        self.load_files(payload.files(), None)
    }

    fn resolve_parent(
        &self,
        object: &mut BusinessObject,
        parent: Option<ArchiveId>,
    ) -> EngineResult<Option<ArchiveId>> {
        let category = object.category();
        let declared = object.parent_id().cloned();
        let (parent_id, parent_root) = match (parent, declared) {
            (Some(archive_id), declared) => {
                let record = self.store.read(&archive_id)?.ok_or_else(|| {
                    MappingError::Malformed(format!(
                        "parent record {} is not in the archive",
                        archive_id.short_hex()
                    ))
                })?;
                if let Some(declared) = declared {
                    if declared != record.business_id {
                        return Err(MappingError::Malformed(format!(
                            "object declares parent {declared} but parent record belongs to {}",
                            record.business_id
                        ))
                        .into());
                    }
                }
                let root = if record.is_root() {
                    archive_id
                } else {
                    self.store
                        .root_of(&record.business_id)?
                        .ok_or_else(|| MappingError::UnresolvableParent(record.business_id.clone()))?
                };
                (record.business_id, root)
            }
            (None, Some(parent_id)) => {
                let root = self
                    .store
                    .root_of(&parent_id)?
                    .ok_or_else(|| MappingError::UnresolvableParent(parent_id.clone()))?;
                (parent_id, root)
            }
            (None, None) => return Ok(None),
        };

        let allowed = allowed_parents(category);
        if allowed.is_empty() {
            return Err(
                MappingError::Malformed(format!("a {category} cannot have a structural parent")).into(),
            );
        }
        let parent_category = self
            .store
            .read(&parent_root)?
            .map(|r| r.category)
            .ok_or_else(|| MappingError::UnresolvableParent(parent_id.clone()))?;
        if !allowed.contains(&parent_category) {
            return Err(MappingError::WrongParentCategory {
                parent: parent_id,
                expected: allowed.to_vec(),
                actual: parent_category,
            }
            .into());
        }

        match object {
            BusinessObject::Collection(c) => c.parent_id = Some(parent_id),
            BusinessObject::DataItem(d) => d.parent_id = parent_id,
            BusinessObject::MetadataFile(m) => m.parent_id = parent_id,
            _ => {}
        }
        Ok(Some(parent_root))
    }

    /// Walk the current ancestors of `parent` looking for `id`.
    fn check_cycle(&self, id: &BusinessId, parent: &BusinessId) -> EngineResult<()> {
        let mut seen = HashSet::new();
        let mut current = Some(parent.clone());
        while let Some(ancestor) = current {
            if ancestor == *id {
                return Err(MappingError::CyclicParent(id.clone()).into());
            }
            if !seen.insert(ancestor.clone()) {
                break;
            }
            current = match self.resolver().find_latest_state(&ancestor) {
                Ok(state) => StatePayload::from_record(state.head, &state.record)?
                    .parent_id()
                    .cloned(),
                Err(EngineError::NotFound { .. }) => None,
                Err(e) => return Err(e),
            };
        }
        Ok(())
    }

    /// Assign ids, reconcile against the prior version, and push records for
    /// every new or replaced file. Rewrites `files` to the archived view.
    fn map_files(
        &self,
        package: &mut Package,
        owner_root: ArchiveId,
        prior: Option<&BusinessObjectState>,
        files: &mut Vec<DataFile>,
    ) -> EngineResult<(Vec<FileEntry>, Reconciliation)> {
        let mut seen = HashSet::new();
        for file in files.iter_mut() {
            if file.name.trim().is_empty() {
                return Err(MappingError::Malformed("file name is empty".into()).into());
            }
            let file_id = match &file.id {
                Some(id) => id.clone(),
                None => {
                    let id = self.allocate_fresh(Category::DataFile)?;
                    file.id = Some(id.clone());
                    id
                }
            };
            if !seen.insert(file_id.clone()) {
                return Err(MappingError::DuplicateFile(file_id).into());
            }
        }

        let prior_files = match prior {
            Some(state) => self.files_of(&state.head, &state.record)?,
            None => Vec::new(),
        };
        let reconciliation = reconcile(&prior_files, files);

        let mut entries = Vec::with_capacity(reconciliation.files.len());
        let mut archived = Vec::with_capacity(reconciliation.files.len());
        for reconciled in &reconciliation.files {
            let file = &reconciled.file;
            let file_id = file
                .id
                .clone()
                .ok_or_else(|| MappingError::Malformed(format!("file {} has no id", file.name)))?;
            let stored = match (reconciled.action, reconciled.prior) {
                (FileAction::CarryForward, Some(_)) => file.clone(),
                (FileAction::Replace, Some(_)) => {
                    // The pinned state may be behind the chain head if the
                    // file was updated through another owner or on its own.
                    let head = self.file_head(&file_id)?;
                    let linkage = self.push_file_state(
                        package,
                        owner_root,
                        &file_id,
                        file,
                        head.root,
                        Some(head.head),
                    )?;
                    archived_view(file, linkage)
                }
                (FileAction::CarryForward | FileAction::Replace, None) => {
                    return Err(MappingError::Malformed(format!(
                        "prior version of file {file_id} has no archive linkage"
                    ))
                    .into())
                }
                (FileAction::Add, _) => self.add_file(package, owner_root, &file_id, file)?,
            };
            let linkage = stored.linkage.ok_or_else(|| {
                MappingError::Malformed(format!("file {file_id} was not linked to the archive"))
            })?;
            entries.push(FileEntry {
                business_id: file_id,
                state: linkage.state,
            });
            archived.push(stored);
        }
        *files = archived;
        Ok((entries, reconciliation))
    }

    /// A file new to this owner. If the archive already knows the id (a file
    /// dropped earlier and now listed again) its chain is continued, or its
    /// current version reused when no content is supplied.
    fn add_file(
        &self,
        package: &mut Package,
        owner_root: ArchiveId,
        file_id: &BusinessId,
        file: &DataFile,
    ) -> EngineResult<DataFile> {
        match self.file_head(file_id) {
            Ok(existing) if file.has_source() => {
                let linkage = self.push_file_state(
                    package,
                    owner_root,
                    file_id,
                    file,
                    existing.root,
                    Some(existing.head),
                )?;
                Ok(archived_view(file, linkage))
            }
            Ok(existing) => file_from_record(&existing.head, &existing.record),
            Err(EngineError::NotFound { .. }) => {
                if !file.has_source() {
                    return Err(MappingError::MissingContent(file_id.clone()).into());
                }
                let root = package.push(ArchivalRecord::root(file_id.clone(), Category::DataFile))?;
                let linkage = self.push_file_state(package, owner_root, file_id, file, root, None)?;
                Ok(archived_view(file, linkage))
            }
            Err(e) => Err(e),
        }
    }

    /// Current head of a file chain.
    fn file_head(&self, file_id: &BusinessId) -> EngineResult<BusinessObjectState> {
        let head = self.resolver().find_latest_state(file_id)?;
        if head.category != Category::DataFile {
            return Err(MappingError::CategoryMismatch {
                business_id: file_id.clone(),
                expected: Category::DataFile,
                actual: head.category,
            }
            .into());
        }
        Ok(head)
    }

    /// Allocate an id the archive has never seen. Ids that already have a
    /// root are skipped.
    fn allocate_fresh(&self, category: Category) -> EngineResult<BusinessId> {
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let id = self.allocator.allocate(category)?;
            if self.store.root_of(&id)?.is_none() {
                return Ok(id);
            }
            warn!(business_id = %id, "allocated identifier already archived, skipping");
        }
        Err(EngineError::AllocationFailure(format!(
            "no unused {category} identifier after {MAX_ALLOCATION_ATTEMPTS} attempts"
        )))
    }

    fn push_file_state(
        &self,
        package: &mut Package,
        owner_root: ArchiveId,
        file_id: &BusinessId,
        file: &DataFile,
        root: ArchiveId,
        previous: Option<ArchiveId>,
    ) -> EngineResult<FileLinkage> {
        let data = file
            .source
            .clone()
            .ok_or_else(|| MappingError::MissingContent(file_id.clone()))?;
        let payload = StatePayload::DataFile {
            name: file.name.clone(),
            media_type: file.media_type.clone(),
            size: data.len() as u64,
        };
        let content = package.push_blob(Blob::new(data));
        let mut record = ArchivalRecord::state(file_id.clone(), Category::DataFile, root, payload.to_value()?)
            .with_parent(owner_root)
            .with_content(content);
        if let Some(previous) = previous {
            record = record.with_successor_of(previous);
        }
        let state = package.push(record)?;
        debug!(file = %file_id, replaced = previous.is_some(), "mapped file");
        Ok(FileLinkage { root, state, content })
    }

    /// Content blob for a data file deposited on its own.
    fn standalone_content(
        &self,
        package: &mut Package,
        business_id: &BusinessId,
        file: &mut DataFile,
        prior: Option<&BusinessObjectState>,
    ) -> EngineResult<ArchiveId> {
        if let Some(data) = file.source.take() {
            file.size = data.len() as u64;
            return Ok(package.push_blob(Blob::new(data)));
        }
        let prior = prior.ok_or_else(|| MappingError::MissingContent(business_id.clone()))?;
        if let StatePayload::DataFile { size, .. } = StatePayload::from_record(prior.head, &prior.record)? {
            file.size = size;
        }
        prior
            .record
            .content
            .ok_or_else(|| EngineError::corrupt(prior.head, "file state without content"))
    }

    fn load(&self, id: &ArchiveId, package: Option<&Package>) -> EngineResult<ArchivalRecord> {
        if let Some(record) = package.and_then(|p| p.get(id)) {
            return Ok(record.clone());
        }
        Ok(self.store.read(id)?.ok_or(StoreError::NotFound(*id))?)
    }

    fn load_files(&self, entries: &[FileEntry], package: Option<&Package>) -> EngineResult<Vec<DataFile>> {
        entries
            .iter()
            .map(|entry| {
                let record = self.load(&entry.state, package)?;
                file_from_record(&entry.state, &record)
            })
            .collect()
    }

    fn object_from_record(
        &self,
        id: &ArchiveId,
        record: &ArchivalRecord,
        package: Option<&Package>,
    ) -> EngineResult<BusinessObject> {
        let business_id = Some(record.business_id.clone());
        let object = match StatePayload::from_record(*id, record)? {
            StatePayload::Collection {
                name,
                description,
                parent_id,
            } => BusinessObject::Collection(Collection {
                id: business_id,
                parent_id,
                name,
                description,
                children_ids: Vec::new(),
            }),
            StatePayload::DataItem {
                name,
                description,
                parent_id,
                files,
            } => BusinessObject::DataItem(DataItem {
                id: business_id,
                parent_id,
                name,
                description,
                files: self.load_files(&files, package)?,
            }),
            StatePayload::DataFile { .. } => BusinessObject::DataFile(file_from_record(id, record)?),
            StatePayload::MetadataFile {
                name,
                format,
                parent_id,
                files,
            } => BusinessObject::MetadataFile(MetadataFile {
                id: business_id,
                parent_id,
                name,
                format,
                files: self.load_files(&files, package)?,
            }),
            StatePayload::Project { name, description } => BusinessObject::Project(Project {
                id: business_id,
                name,
                description,
            }),
            StatePayload::Person { name, email } => BusinessObject::Person(Person {
                id: business_id,
                name,
                email,
            }),
        };
        Ok(object)
    }
}

/// A proposed file as it reads back once stored under `linkage`.
fn archived_view(file: &DataFile, linkage: FileLinkage) -> DataFile {
    DataFile {
        size: file.source.as_ref().map_or(file.size, |s| s.len() as u64),
        source: None,
        linkage: Some(linkage),
        ..file.clone()
    }
}

fn file_from_record(id: &ArchiveId, record: &ArchivalRecord) -> EngineResult<DataFile> {
    let StatePayload::DataFile {
        name,
        media_type,
        size,
    } = StatePayload::from_record(*id, record)?
    else {
        return Err(EngineError::corrupt(*id, "manifest entry is not a file"));
    };
    let root = record
        .parents
        .first()
        .copied()
        .ok_or_else(|| EngineError::corrupt(*id, "state record without root"))?;
    let content = record
        .content
        .ok_or_else(|| EngineError::corrupt(*id, "file state without content"))?;
    Ok(DataFile {
        id: Some(record.business_id.clone()),
        name,
        media_type,
        size,
        source: None,
        linkage: Some(FileLinkage {
            root,
            state: *id,
            content,
        }),
    })
}

fn check_attributes(object: &BusinessObject) -> Result<(), MappingError> {
    if object.name().trim().is_empty() {
        return Err(MappingError::Malformed(format!("{} name is empty", object.category())));
    }
    if let BusinessObject::DataFile(file) = object {
        if file.media_type.trim().is_empty() {
            return Err(MappingError::Malformed("media type is empty".into()));
        }
    }
    Ok(())
}

fn payload_for(object: &BusinessObject, files: Vec<FileEntry>) -> EngineResult<StatePayload> {
    Ok(match object {
        BusinessObject::Collection(c) => StatePayload::Collection {
            name: c.name.clone(),
            description: c.description.clone(),
            parent_id: c.parent_id.clone(),
        },
        BusinessObject::DataItem(d) => StatePayload::DataItem {
            name: d.name.clone(),
            description: d.description.clone(),
            parent_id: d.parent_id.clone(),
            files,
        },
        BusinessObject::DataFile(f) => StatePayload::DataFile {
            name: f.name.clone(),
            media_type: f.media_type.clone(),
            size: f.size,
        },
        BusinessObject::MetadataFile(m) => StatePayload::MetadataFile {
            name: m.name.clone(),
            format: m.format.clone(),
            parent_id: m.parent_id.clone(),
            files,
        },
        BusinessObject::Project(p) => StatePayload::Project {
            name: p.name.clone(),
            description: p.description.clone(),
        },
        BusinessObject::Person(p) => StatePayload::Person {
            name: p.name.clone(),
            email: p.email.clone(),
        },
    })
}

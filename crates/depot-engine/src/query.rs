//! Retrieval of archived business objects.
//!
//! Lookups by business id always resolve the chain head. Lookups by deposit
//! id return the exact state that deposit wrote. Children are resolved one
//! by one against their own current state, never from a cached list.

use std::collections::BTreeSet;

use serde::Serialize;

use depot_model::{Archivable, BusinessObject, Collection, DataItem, MetadataFile};
use depot_store::{ArchiveStore, IngestBackend};
use depot_types::{ArchiveId, BusinessId, Category, DepositId};

use crate::allocator::IdAllocator;
use crate::error::{EngineError, EngineResult};
use crate::mapper::PackageMapper;
use crate::resolver::{BusinessObjectState, VersionResolver};
use crate::submitter::{DepositStatus, DepositSubmitter};

/// How to find an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// The current version.
    Business(BusinessId),
    /// The version a specific deposit wrote.
    Deposit(DepositId),
}

impl From<BusinessId> for Lookup {
    fn from(id: BusinessId) -> Self {
        Self::Business(id)
    }
}

impl From<DepositId> for Lookup {
    fn from(id: DepositId) -> Self {
        Self::Deposit(id)
    }
}

/// One page of results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchResult<T> {
    pub items: Vec<T>,
    /// Matches before pagination.
    pub total: usize,
    pub offset: usize,
    /// `None` when every item from `offset` on was requested.
    pub limit: Option<usize>,
}

impl<T> SearchResult<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            offset: 0,
            limit: None,
        }
    }

    pub fn single(item: T) -> Self {
        Self {
            items: vec![item],
            total: 1,
            offset: 0,
            limit: None,
        }
    }

    /// Cut one page out of `items`. A negative `limit` means all.
    pub fn paginate(items: Vec<T>, limit: i64, offset: usize) -> Self {
        let total = items.len();
        let limit = usize::try_from(limit).ok();
        let items = items
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Self {
            items,
            total,
            offset,
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn into_first(self) -> Option<T> {
        self.items.into_iter().next()
    }
}

pub struct ArchiveQuery<'a, S, B>
where
    S: ArchiveStore + ?Sized,
    B: IngestBackend + ?Sized,
{
    store: &'a S,
    mapper: PackageMapper<'a, S>,
    deposits: &'a DepositSubmitter<B>,
}

impl<'a, S, B> ArchiveQuery<'a, S, B>
where
    S: ArchiveStore + ?Sized,
    B: IngestBackend + ?Sized,
{
    pub fn new(store: &'a S, allocator: &'a dyn IdAllocator, deposits: &'a DepositSubmitter<B>) -> Self {
        Self {
            store,
            mapper: PackageMapper::new(store, allocator),
            deposits,
        }
    }

    fn resolver(&self) -> VersionResolver<'a, S> {
        VersionResolver::new(self.store)
    }

    /// Typed retrieval. An object of another category yields an empty result.
    pub fn retrieve<T: Archivable>(&self, lookup: impl Into<Lookup>) -> EngineResult<SearchResult<T>> {
        let found = self.retrieve_object(T::CATEGORY, lookup)?;
        Ok(match found.into_first().and_then(T::from_object) {
            Some(item) => SearchResult::single(item),
            None => SearchResult::empty(),
        })
    }

    /// Untyped retrieval.
    ///
    /// A business id with no archived object is `NotFound`. A deposit that
    /// has not (or not successfully) completed yields an empty result.
    pub fn retrieve_object(
        &self,
        category: Category,
        lookup: impl Into<Lookup>,
    ) -> EngineResult<SearchResult<BusinessObject>> {
        let state = match lookup.into() {
            Lookup::Business(business_id) => self.resolver().find_latest_state(&business_id)?,
            Lookup::Deposit(deposit_id) => {
                let deposit = self.deposits.record(&deposit_id)?;
                if deposit.status != DepositStatus::Deposited {
                    return Ok(SearchResult::empty());
                }
                self.resolver().state_of(&deposit.subject_state)?
            }
        };
        if state.category != category {
            return Ok(SearchResult::empty());
        }
        let mut object = self.mapper.from_state(&state)?;
        if let BusinessObject::Collection(collection) = &mut object {
            collection.children_ids = self.children_ids(&state)?;
        }
        Ok(SearchResult::single(object))
    }

    /// Current data items of a collection, ordered by business id.
    /// A negative `limit` returns everything from `offset` on.
    pub fn retrieve_children(
        &self,
        collection_id: &BusinessId,
        limit: i64,
        offset: usize,
    ) -> EngineResult<SearchResult<DataItem>> {
        let parent = self.require(collection_id, &[Category::Collection])?;
        let children = self.current_children(&parent.root, Category::DataItem)?;
        Ok(SearchResult::paginate(self.objects(children)?, limit, offset))
    }

    /// Current sub-collections of a collection, ordered by business id.
    pub fn retrieve_sub_collections(
        &self,
        collection_id: &BusinessId,
        limit: i64,
        offset: usize,
    ) -> EngineResult<SearchResult<Collection>> {
        let parent = self.require(collection_id, &[Category::Collection])?;
        let children = self.current_children(&parent.root, Category::Collection)?;
        let mut collections: Vec<Collection> = self.objects(children.clone())?;
        for (collection, state) in collections.iter_mut().zip(&children) {
            collection.children_ids = self.children_ids(state)?;
        }
        Ok(SearchResult::paginate(collections, limit, offset))
    }

    /// Metadata files currently describing a collection or data item.
    pub fn retrieve_metadata(&self, subject_id: &BusinessId) -> EngineResult<SearchResult<MetadataFile>> {
        let subject = self.require(subject_id, &[Category::Collection, Category::DataItem])?;
        let children = self.current_children(&subject.root, Category::MetadataFile)?;
        Ok(SearchResult::paginate(self.objects(children)?, -1, 0))
    }

    /// Resolve `business_id` and require one of `categories`.
    fn require(&self, business_id: &BusinessId, categories: &[Category]) -> EngineResult<BusinessObjectState> {
        let state = self.resolver().find_latest_state(business_id)?;
        if !categories.contains(&state.category) {
            return Err(EngineError::not_found(business_id));
        }
        Ok(state)
    }

    /// Objects of `category` whose current state links `parent_root`.
    fn current_children(
        &self,
        parent_root: &ArchiveId,
        category: Category,
    ) -> EngineResult<Vec<BusinessObjectState>> {
        let candidates: BTreeSet<BusinessId> = self
            .store
            .read_batch(&self.store.referencing(parent_root)?)?
            .into_iter()
            .flatten()
            .filter(|r| r.is_state() && r.category == category)
            .map(|r| r.business_id)
            .collect();

        let mut children = Vec::with_capacity(candidates.len());
        for business_id in candidates {
            let state = self.resolver().find_latest_state(&business_id)?;
            if state.record.structural_parents(&state.root).any(|p| p == parent_root) {
                children.push(state);
            }
        }
        Ok(children)
    }

    fn children_ids(&self, parent: &BusinessObjectState) -> EngineResult<Vec<BusinessId>> {
        let mut ids: Vec<BusinessId> = self
            .current_children(&parent.root, Category::Collection)?
            .into_iter()
            .chain(self.current_children(&parent.root, Category::DataItem)?)
            .map(|s| s.business_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn objects<T: Archivable>(&self, states: Vec<BusinessObjectState>) -> EngineResult<Vec<T>> {
        let mut items = Vec::with_capacity(states.len());
        for state in &states {
            if let Some(item) = T::from_object(self.mapper.from_state(state)?) {
                items.push(item);
            }
        }
        Ok(items)
    }
}

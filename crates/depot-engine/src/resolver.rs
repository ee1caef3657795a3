//! Resolution of a business id to its current state record.
//!
//! The root index gives the root record. Every state of the object lists
//! the root in `parents`, so the root's referencing set holds the whole
//! chain (plus the states of structural children, which are filtered out by
//! business id). The head is the state nobody names as its predecessor.

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use depot_store::{ArchivalRecord, ArchiveStore, StoreError};
use depot_types::{ArchiveId, BusinessId, Category};

use crate::error::{EngineError, EngineResult};

/// A resolved view of one business object at one version.
///
/// Derived on demand; stale as soon as a newer deposit completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BusinessObjectState {
    pub business_id: BusinessId,
    pub category: Category,
    pub root: ArchiveId,
    /// The resolved state record. The chain head when resolved by business id.
    pub head: ArchiveId,
    pub record: ArchivalRecord,
    /// Position in the chain, starting at 1 for the first version.
    pub version: usize,
}

pub struct VersionResolver<'a, S: ArchiveStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ArchiveStore + ?Sized> VersionResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Resolve the current state of `business_id`.
    pub fn find_latest_state(&self, business_id: &BusinessId) -> EngineResult<BusinessObjectState> {
        let root = self
            .store
            .root_of(business_id)?
            .ok_or_else(|| EngineError::not_found(business_id))?;
        let states = self.chain_members(business_id, &root)?;
        if states.is_empty() {
            return Err(EngineError::not_found(business_id));
        }

        let predecessors: HashSet<ArchiveId> =
            states.iter().filter_map(|(_, r)| r.successor_of).collect();
        let mut heads: Vec<(ArchiveId, ArchivalRecord)> = states
            .into_iter()
            .filter(|(id, _)| !predecessors.contains(id))
            .collect();

        match heads.len() {
            1 => {
                let (head, record) = heads.remove(0);
                let version = self.chain_length(&head, &record)?;
                Ok(BusinessObjectState {
                    business_id: business_id.clone(),
                    category: record.category,
                    root,
                    head,
                    record,
                    version,
                })
            }
            0 => Err(EngineError::corrupt(root, "state chain has no head")),
            _ => {
                let mut heads: Vec<ArchiveId> = heads.into_iter().map(|(id, _)| id).collect();
                heads.sort();
                warn!(%business_id, heads = heads.len(), "ambiguous version");
                Err(EngineError::AmbiguousVersion {
                    business_id: business_id.clone(),
                    heads,
                })
            }
        }
    }

    /// The state a specific record captures, without looking for newer ones.
    pub fn state_of(&self, record_id: &ArchiveId) -> EngineResult<BusinessObjectState> {
        let record = self
            .store
            .read(record_id)?
            .ok_or(StoreError::NotFound(*record_id))?;
        if !record.is_state() {
            return Err(EngineError::corrupt(*record_id, "not a state record"));
        }
        let root = self
            .store
            .root_of(&record.business_id)?
            .ok_or_else(|| EngineError::not_found(&record.business_id))?;
        let version = self.chain_length(record_id, &record)?;
        Ok(BusinessObjectState {
            business_id: record.business_id.clone(),
            category: record.category,
            root,
            head: *record_id,
            record,
            version,
        })
    }

    /// Every version of `business_id`, newest first.
    pub fn history(&self, business_id: &BusinessId) -> EngineResult<Vec<BusinessObjectState>> {
        let latest = self.find_latest_state(business_id)?;
        let mut history = Vec::with_capacity(latest.version);
        let mut previous = latest.record.successor_of;
        let root = latest.root;
        let mut version = latest.version;
        history.push(latest);

        while let Some(id) = previous {
            let record = self
                .store
                .read(&id)?
                .ok_or_else(|| EngineError::corrupt(id, "predecessor missing from archive"))?;
            version = version.saturating_sub(1);
            previous = record.successor_of;
            history.push(BusinessObjectState {
                business_id: business_id.clone(),
                category: record.category,
                root,
                head: id,
                record,
                version,
            });
        }
        Ok(history)
    }

    /// Root id of `business_id`, if it was ever deposited.
    pub fn root_of(&self, business_id: &BusinessId) -> EngineResult<Option<ArchiveId>> {
        Ok(self.store.root_of(business_id)?)
    }

    fn chain_members(
        &self,
        business_id: &BusinessId,
        root: &ArchiveId,
    ) -> EngineResult<Vec<(ArchiveId, ArchivalRecord)>> {
        let ids = self.store.referencing(root)?;
        let records = self.store.read_batch(&ids)?;
        Ok(ids
            .into_iter()
            .zip(records)
            .filter_map(|(id, record)| record.map(|r| (id, r)))
            .filter(|(_, r)| r.is_state() && r.business_id == *business_id)
            .collect())
    }

    /// Number of states from the first version up to `record`.
    fn chain_length(&self, id: &ArchiveId, record: &ArchivalRecord) -> EngineResult<usize> {
        let mut length = 1;
        let mut seen = HashSet::from([*id]);
        let mut previous = record.successor_of;
        while let Some(prev) = previous {
            if !seen.insert(prev) {
                return Err(EngineError::corrupt(*id, "successor chain loops"));
            }
            let prior = self
                .store
                .read(&prev)?
                .ok_or_else(|| EngineError::corrupt(prev, "predecessor missing from archive"))?;
            length += 1;
            previous = prior.successor_of;
        }
        Ok(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_store::{ArchiveConfig, InMemoryArchive, Package};
    use serde_json::json;

    fn id(s: &str) -> BusinessId {
        BusinessId::new(s).unwrap()
    }

    /// Write a chain of `n` versions of `business` and return the state ids.
    fn chain(archive: &InMemoryArchive, business: &str, n: usize) -> (ArchiveId, Vec<ArchiveId>) {
        let mut package = Package::new(id("pkg-0"), id(business));
        let root = package
            .push(ArchivalRecord::root(id(business), Category::Collection))
            .unwrap();
        let first = package
            .push(ArchivalRecord::state(id(business), Category::Collection, root, json!({"v": 1})))
            .unwrap();
        archive.ingest_now(package).unwrap();

        let mut states = vec![first];
        for v in 2..=n {
            let mut package = Package::new(id(&format!("pkg-{v}")), id(business));
            let previous = *states.last().unwrap();
            let state = package
                .push(
                    ArchivalRecord::state(id(business), Category::Collection, root, json!({"v": v}))
                        .with_successor_of(previous),
                )
                .unwrap();
            archive.ingest_now(package).unwrap();
            states.push(state);
        }
        (root, states)
    }

    #[test]
    fn unknown_business_id_is_not_found() {
        let archive = InMemoryArchive::new();
        let resolver = VersionResolver::new(&archive);
        assert!(matches!(
            resolver.find_latest_state(&id("col-404")),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn head_is_latest_version() {
        let archive = InMemoryArchive::new();
        let (root, states) = chain(&archive, "col-1", 4);
        let resolver = VersionResolver::new(&archive);
        let state = resolver.find_latest_state(&id("col-1")).unwrap();
        assert_eq!(state.root, root);
        assert_eq!(state.head, states[3]);
        assert_eq!(state.version, 4);
        assert_eq!(state.record.attributes["v"], 4);
    }

    #[test]
    fn history_runs_newest_to_oldest() {
        let archive = InMemoryArchive::new();
        let (_, states) = chain(&archive, "col-1", 3);
        let resolver = VersionResolver::new(&archive);
        let history = resolver.history(&id("col-1")).unwrap();
        let heads: Vec<ArchiveId> = history.iter().map(|s| s.head).collect();
        assert_eq!(heads, vec![states[2], states[1], states[0]]);
        let versions: Vec<usize> = history.iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    #[test]
    fn state_of_pins_a_version() {
        let archive = InMemoryArchive::new();
        let (_, states) = chain(&archive, "col-1", 3);
        let resolver = VersionResolver::new(&archive);
        let pinned = resolver.state_of(&states[1]).unwrap();
        assert_eq!(pinned.version, 2);
        assert_eq!(pinned.head, states[1]);
    }

    #[test]
    fn fork_is_ambiguous() {
        let archive = InMemoryArchive::with_config(ArchiveConfig::immediate());
        let (root, states) = chain(&archive, "col-1", 1);
        for name in ["a", "b"] {
            let mut package = Package::new(id("pkg-x"), id("col-1"));
            package
                .push(
                    ArchivalRecord::state(id("col-1"), Category::Collection, root, json!({"v": name}))
                        .with_successor_of(states[0]),
                )
                .unwrap();
            archive.ingest_now(package).unwrap();
        }
        let resolver = VersionResolver::new(&archive);
        match resolver.find_latest_state(&id("col-1")) {
            Err(EngineError::AmbiguousVersion { heads, .. }) => assert_eq!(heads.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn child_states_do_not_count_as_versions() {
        let archive = InMemoryArchive::new();
        let (root, states) = chain(&archive, "col-1", 2);

        let mut package = Package::new(id("pkg-c"), id("ds-1"));
        let child_root = package
            .push(ArchivalRecord::root(id("ds-1"), Category::DataItem))
            .unwrap();
        package
            .push(
                ArchivalRecord::state(id("ds-1"), Category::DataItem, child_root, json!({}))
                    .with_parent(root),
            )
            .unwrap();
        archive.ingest_now(package).unwrap();

        let state = VersionResolver::new(&archive)
            .find_latest_state(&id("col-1"))
            .unwrap();
        assert_eq!(state.head, states[1]);
    }
}

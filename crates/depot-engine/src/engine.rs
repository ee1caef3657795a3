use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use depot_model::BusinessObject;
use depot_store::{ArchiveStore, InMemoryArchive, IngestBackend};
use depot_types::{ArchiveId, BusinessId, Category, DepositId};

use crate::allocator::IdAllocator;
use crate::config::EngineConfig;
use crate::container::ExtractedContainer;
use crate::error::EngineResult;
use crate::mapper::PackageMapper;
use crate::poller::{wait_for, AdvanceReport, PollPolicy, PollingDriver, WaitOutcome};
use crate::query::ArchiveQuery;
use crate::resolver::VersionResolver;
use crate::submitter::{DepositRecord, DepositStatus, DepositSubmitter};

/// What a successful submission hands back.
#[derive(Clone, Debug, Serialize)]
pub struct DepositReceipt {
    pub deposit_id: DepositId,
    pub business_id: BusinessId,
    pub category: Category,
    pub root: ArchiveId,
    /// The state record this deposit writes once applied.
    pub subject_state: ArchiveId,
    /// The submitted object with allocated ids and file linkage filled in.
    pub object: BusinessObject,
}

/// High-level entry point tying the components to one archive.
pub struct DepositEngine<A: ArchiveStore + IngestBackend> {
    archive: Arc<A>,
    allocator: Arc<dyn IdAllocator>,
    submitter: Arc<DepositSubmitter<A>>,
    driver: PollingDriver<A>,
    poll: PollPolicy,
}

impl<A: ArchiveStore + IngestBackend> DepositEngine<A> {
    pub fn new(archive: Arc<A>, allocator: Arc<dyn IdAllocator>) -> Self {
        let submitter = Arc::new(DepositSubmitter::new(Arc::clone(&archive)));
        let driver = PollingDriver::new(Arc::clone(&submitter));
        Self {
            archive,
            allocator,
            submitter,
            driver,
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn allocator(&self) -> &dyn IdAllocator {
        self.allocator.as_ref()
    }

    pub fn submitter(&self) -> &DepositSubmitter<A> {
        &self.submitter
    }

    pub fn driver(&self) -> &PollingDriver<A> {
        &self.driver
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    // ---- Deposits ----

    /// Map and submit an object. Its structural parent comes from its own
    /// `parent_id`.
    pub fn deposit(&self, object: impl Into<BusinessObject>) -> EngineResult<DepositReceipt> {
        self.submit(None, object.into())
    }

    /// Map and submit an object under the parent named by `parent`, a root or
    /// state id of that parent.
    pub fn deposit_under(
        &self,
        parent: ArchiveId,
        object: impl Into<BusinessObject>,
    ) -> EngineResult<DepositReceipt> {
        self.submit(Some(parent), object.into())
    }

    /// Deposit an extracted container as one data item in `collection`,
    /// allocating the item id unless `id` is given.
    ///
    /// The container is checked before anything is allocated or submitted.
    pub fn deposit_container(
        &self,
        collection: &BusinessId,
        id: Option<BusinessId>,
        container: ExtractedContainer,
    ) -> EngineResult<DepositReceipt> {
        let entries = container.entries.len();
        let item = container.into_data_item(collection.clone(), id)?;
        info!(%collection, name = %item.name, entries, "depositing container");
        self.deposit(item)
    }

    fn submit(&self, parent: Option<ArchiveId>, object: BusinessObject) -> EngineResult<DepositReceipt> {
        let mapped = self.mapper().to_package(parent, &object)?;
        let business_id = mapped.business_id().clone();
        let category = mapped.object.category();
        let deposit_id = self.submitter.submit(mapped.package)?;
        Ok(DepositReceipt {
            deposit_id,
            business_id,
            category,
            root: mapped.root,
            subject_state: mapped.subject_state,
            object: mapped.object,
        })
    }

    // ---- Tracking ----

    pub fn status(&self, deposit_id: &DepositId) -> EngineResult<DepositStatus> {
        self.submitter.status(deposit_id)
    }

    pub fn record(&self, deposit_id: &DepositId) -> EngineResult<DepositRecord> {
        self.submitter.record(deposit_id)
    }

    /// One polling tick over every pending deposit.
    pub fn advance(&self) -> EngineResult<AdvanceReport> {
        self.driver.advance()
    }

    /// Poll `deposit_id` with the engine's policy until it is final.
    pub async fn wait(&self, deposit_id: &DepositId) -> EngineResult<WaitOutcome> {
        wait_for(&self.driver, deposit_id, &self.poll).await
    }

    /// Deposit and wait for the outcome.
    pub async fn deposit_and_wait(
        &self,
        object: impl Into<BusinessObject>,
    ) -> EngineResult<(DepositReceipt, WaitOutcome)> {
        let receipt = self.deposit(object)?;
        let outcome = self.wait(&receipt.deposit_id).await?;
        Ok((receipt, outcome))
    }

    // ---- Components ----

    pub fn resolver(&self) -> VersionResolver<'_, A> {
        VersionResolver::new(self.archive.as_ref())
    }

    pub fn mapper(&self) -> PackageMapper<'_, A> {
        PackageMapper::new(self.archive.as_ref(), self.allocator.as_ref())
    }

    pub fn query(&self) -> ArchiveQuery<'_, A, A> {
        ArchiveQuery::new(self.archive.as_ref(), self.allocator.as_ref(), &self.submitter)
    }
}

impl DepositEngine<InMemoryArchive> {
    /// An engine over a fresh in-memory archive.
    pub fn from_config(config: &EngineConfig) -> Self {
        let archive = Arc::new(InMemoryArchive::with_config(config.archive.clone()));
        Self::new(archive, config.allocator.build()).with_poll_policy(config.poll.clone())
    }

    /// An engine over an existing archive, such as a loaded snapshot. Every
    /// archived business id is reserved with the configured allocator.
    pub fn open(archive: InMemoryArchive, config: &EngineConfig) -> EngineResult<Self> {
        let allocator = config.allocator.build();
        let roots = archive.roots()?;
        for (business_id, _) in &roots {
            allocator.reserve(business_id);
        }
        debug!(roots = roots.len(), "reserved archived identifiers");
        Ok(Self::new(Arc::new(archive), allocator).with_poll_policy(config.poll.clone()))
    }

    pub fn in_memory() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl<A: ArchiveStore + IngestBackend> std::fmt::Debug for DepositEngine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepositEngine")
            .field("submitter", &self.submitter)
            .field("poll", &self.poll)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SequentialAllocator;
    use crate::error::{EngineError, MappingError};
    use depot_model::{Collection, DataFile, DataItem, MetadataFile};
    use depot_store::{ArchiveConfig, ConflictPolicy};

    fn id(s: &str) -> BusinessId {
        BusinessId::new(s).unwrap()
    }

    fn engine_with(config: ArchiveConfig) -> DepositEngine<InMemoryArchive> {
        DepositEngine::new(
            Arc::new(InMemoryArchive::with_config(config)),
            Arc::new(SequentialAllocator::starting_at(100)),
        )
        .with_poll_policy(PollPolicy::fixed(5, 1))
    }

    fn engine() -> DepositEngine<InMemoryArchive> {
        engine_with(ArchiveConfig::immediate())
    }

    fn settle(engine: &DepositEngine<InMemoryArchive>) {
        for _ in 0..10 {
            if engine.advance().unwrap().is_idle() {
                return;
            }
        }
        panic!("deposits did not settle");
    }

    fn deposit_ok(engine: &DepositEngine<InMemoryArchive>, object: impl Into<BusinessObject>) -> DepositReceipt {
        let receipt = engine.deposit(object).unwrap();
        settle(engine);
        let record = engine.record(&receipt.deposit_id).unwrap();
        assert_eq!(record.status, DepositStatus::Deposited, "{:?}", record.failure);
        receipt
    }

    fn item(business: &str, parent: &str, name: &str) -> DataItem {
        DataItem::new(id(business), id(parent), name)
            .with_file(DataFile::new(id(&format!("file-{business}")), "data.csv").with_source(b"a,b\n1,2".to_vec()))
    }

    fn child_ids(engine: &DepositEngine<InMemoryArchive>, collection: &str) -> Vec<BusinessId> {
        engine
            .query()
            .retrieve_children(&id(collection), -1, 0)
            .unwrap()
            .items
            .into_iter()
            .filter_map(|i| i.id)
            .collect()
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    #[test]
    fn rename_keeps_one_child_and_root() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "Collection 1"));
        let first = deposit_ok(&engine, item("ds-1", "col-1", "ds-1"));

        let children = engine.query().retrieve_children(&id("col-1"), -1, 0).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children.items[0].id, Some(id("ds-1")));

        let renamed = DataItem::new(id("ds-1"), id("col-1"), "ds-1-v2")
            .with_file(DataFile::new(id("file-ds-1"), "data.csv"));
        let second = deposit_ok(&engine, renamed);

        let children = engine.query().retrieve_children(&id("col-1"), -1, 0).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children.items[0].name, "ds-1-v2");
        assert_eq!(children.items[0].files.len(), 1);

        let current = engine.query().retrieve::<DataItem>(id("ds-1")).unwrap();
        assert_eq!(current.items[0].name, "ds-1-v2");
        let state = engine.resolver().find_latest_state(&id("ds-1")).unwrap();
        assert_eq!(state.root, first.root);
        assert_eq!(second.root, first.root);

        let original = engine.query().retrieve::<DataItem>(first.deposit_id).unwrap();
        assert_eq!(original.items[0].name, "ds-1");
    }

    #[test]
    fn empty_container_writes_nothing() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "Collection 1"));
        let records = engine.archive().len();

        let err = engine
            .deposit_container(&id("col-1"), None, ExtractedContainer::new("empty.zip", "application/zip"))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Mapping(MappingError::EmptyContainer(_))
        ));
        settle(&engine);
        assert_eq!(engine.archive().len(), records);
        assert_eq!(engine.submitter().deposits().unwrap().len(), 1);
        assert!(child_ids(&engine, "col-1").is_empty());
    }

    #[test]
    fn container_becomes_one_data_item() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "Collection 1"));
        let container = ExtractedContainer::new("survey.zip", "application/zip")
            .with_entry("a.csv", "text/csv", b"1".to_vec())
            .with_entry("b.csv", "text/csv", b"2".to_vec());
        let receipt = engine.deposit_container(&id("col-1"), None, container).unwrap();
        settle(&engine);

        assert_eq!(receipt.category, Category::DataItem);
        assert_eq!(child_ids(&engine, "col-1"), vec![receipt.business_id.clone()]);
        let item = engine
            .query()
            .retrieve::<DataItem>(receipt.business_id)
            .unwrap()
            .into_first()
            .unwrap();
        assert_eq!(item.files.len(), 2);
        assert!(item.files.iter().all(|f| f.linkage.is_some()));
    }

    // -----------------------------------------------------------------------
    // Version chains
    // -----------------------------------------------------------------------

    #[test]
    fn root_is_stable_across_updates() {
        let engine = engine();
        let first = deposit_ok(&engine, Collection::new(id("col-1"), "v1"));
        for name in ["v2", "v3", "v4"] {
            let receipt = deposit_ok(&engine, Collection::new(id("col-1"), name));
            assert_eq!(receipt.root, first.root);
        }
        assert_eq!(engine.resolver().root_of(&id("col-1")).unwrap(), Some(first.root));
    }

    #[test]
    fn history_is_an_unbroken_chain() {
        let engine = engine();
        let receipts: Vec<DepositReceipt> = ["v1", "v2", "v3"]
            .into_iter()
            .map(|name| deposit_ok(&engine, Collection::new(id("col-1"), name)))
            .collect();

        let history = engine.resolver().history(&id("col-1")).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(
            history.iter().map(|s| s.version).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
        for (newer, older) in history.iter().zip(history.iter().skip(1)) {
            assert_eq!(newer.record.successor_of, Some(older.head));
        }
        assert!(history[2].record.successor_of.is_none());
        assert_eq!(history[0].head, receipts[2].subject_state);
        assert_eq!(history[2].head, receipts[0].subject_state);
    }

    #[test]
    fn carried_forward_file_adds_only_the_owner_state() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "c"));
        let first = deposit_ok(&engine, item("ds-1", "col-1", "first"));
        let blobs = engine.archive().blob_count();
        let before = first.object.files().unwrap()[0].linkage.clone();

        let update = DataItem::new(id("ds-1"), id("col-1"), "second")
            .with_file(DataFile::new(id("file-ds-1"), "data.csv"));
        let second = deposit_ok(&engine, update);

        assert_eq!(engine.archive().blob_count(), blobs);
        assert_eq!(engine.record(&second.deposit_id).unwrap().records.len(), 1);
        let after = engine
            .query()
            .retrieve::<DataItem>(id("ds-1"))
            .unwrap()
            .into_first()
            .unwrap();
        assert_eq!(after.files[0].linkage, before);
        assert_eq!(after.files[0].size, 7);
    }

    #[test]
    fn concurrent_updates_fork_under_last_writer_wins() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "v1"));
        engine.deposit(Collection::new(id("col-1"), "left")).unwrap();
        engine.deposit(Collection::new(id("col-1"), "right")).unwrap();
        settle(&engine);

        match engine.resolver().find_latest_state(&id("col-1")) {
            Err(EngineError::AmbiguousVersion { heads, .. }) => assert_eq!(heads.len(), 2),
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn stale_update_fails_under_reject_stale() {
        let engine = engine_with(ArchiveConfig::immediate().with_conflict_policy(ConflictPolicy::RejectStale));
        deposit_ok(&engine, Collection::new(id("col-1"), "v1"));
        let left = engine.deposit(Collection::new(id("col-1"), "left")).unwrap();
        let right = engine.deposit(Collection::new(id("col-1"), "right")).unwrap();

        assert_eq!(engine.submitter().check(&left.deposit_id).unwrap(), DepositStatus::Deposited);
        assert_eq!(engine.submitter().check(&right.deposit_id).unwrap(), DepositStatus::Failed);
        let failure = engine.record(&right.deposit_id).unwrap().failure.unwrap();
        assert!(failure.contains("stale predecessor"), "{failure}");

        let current = engine
            .query()
            .retrieve::<Collection>(id("col-1"))
            .unwrap()
            .into_first()
            .unwrap();
        assert_eq!(current.name, "left");
    }

    #[test]
    fn owner_replaces_file_updated_on_its_own() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "c"));
        deposit_ok(&engine, item("ds-1", "col-1", "item"));
        let standalone = deposit_ok(
            &engine,
            DataFile::new(id("file-ds-1"), "data.csv").with_source(b"v2".to_vec()),
        );

        let replaced = DataItem::new(id("ds-1"), id("col-1"), "item")
            .with_file(DataFile::new(id("file-ds-1"), "data.csv").with_source(b"v3".to_vec()));
        let receipt = deposit_ok(&engine, replaced);

        let head = engine.resolver().find_latest_state(&id("file-ds-1")).unwrap();
        assert_eq!(head.version, 3);
        assert_eq!(head.record.successor_of, Some(standalone.subject_state));
        let linkage = receipt.object.files().unwrap()[0].linkage.unwrap();
        assert_eq!(linkage.state, head.head);
        assert_eq!(linkage.root, standalone.root);
    }

    // -----------------------------------------------------------------------
    // Children
    // -----------------------------------------------------------------------

    #[test]
    fn moved_item_leaves_old_parent() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "one"));
        deposit_ok(&engine, Collection::new(id("col-2"), "two"));
        deposit_ok(&engine, item("ds-1", "col-1", "item"));
        assert_eq!(child_ids(&engine, "col-1"), vec![id("ds-1")]);

        let moved = DataItem::new(id("ds-1"), id("col-2"), "item")
            .with_file(DataFile::new(id("file-ds-1"), "data.csv"));
        deposit_ok(&engine, moved);
        assert!(child_ids(&engine, "col-1").is_empty());
        assert_eq!(child_ids(&engine, "col-2"), vec![id("ds-1")]);
    }

    #[test]
    fn parent_update_keeps_children() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "one"));
        deposit_ok(&engine, item("ds-1", "col-1", "item"));
        deposit_ok(&engine, Collection::new(id("col-1"), "one, renamed"));
        assert_eq!(child_ids(&engine, "col-1"), vec![id("ds-1")]);
    }

    #[test]
    fn pages_cover_all_children_in_order() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "c"));
        for n in [5, 2, 7, 1, 4, 6, 3] {
            let business = format!("ds-{n}");
            deposit_ok(&engine, item(&business, "col-1", &business));
        }

        let all = child_ids(&engine, "col-1");
        assert_eq!(all.len(), 7);
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);

        let mut paged = Vec::new();
        let mut offset = 0;
        loop {
            let page = engine.query().retrieve_children(&id("col-1"), 3, offset).unwrap();
            assert_eq!(page.total, 7);
            if page.is_empty() {
                break;
            }
            offset += page.len();
            paged.extend(page.items.into_iter().filter_map(|i| i.id));
        }
        assert_eq!(paged, all);
    }

    #[test]
    fn single_item_pages_walk_every_child() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "c"));
        for n in 1..=5 {
            let business = format!("ds-{n}");
            deposit_ok(&engine, item(&business, "col-1", &business));
        }

        let all = child_ids(&engine, "col-1");
        let walked: Vec<BusinessId> = (0..all.len())
            .flat_map(|offset| {
                let page = engine.query().retrieve_children(&id("col-1"), 1, offset).unwrap();
                assert_eq!(page.len(), 1);
                page.items.into_iter().filter_map(|i| i.id)
            })
            .collect();
        assert_eq!(walked, all);
        assert!(engine.query().retrieve_children(&id("col-1"), 1, all.len()).unwrap().is_empty());
    }

    #[test]
    fn pages_are_stable_while_siblings_change() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "c"));
        for n in 1..=6 {
            let business = format!("ds-{n}");
            deposit_ok(&engine, item(&business, "col-1", &business));
        }
        let all = child_ids(&engine, "col-1");

        let mut paged = Vec::new();
        for (page_index, sibling) in ["ds-5", "ds-1", "ds-3"].into_iter().enumerate() {
            let page = engine
                .query()
                .retrieve_children(&id("col-1"), 2, page_index * 2)
                .unwrap();
            paged.extend(page.items.into_iter().filter_map(|i| i.id));

            let renamed = DataItem::new(id(sibling), id("col-1"), format!("{sibling} renamed"))
                .with_file(DataFile::new(id(&format!("file-{sibling}")), "data.csv"));
            deposit_ok(&engine, renamed);
        }

        assert_eq!(paged, all);
        let current = engine.query().retrieve_children(&id("col-1"), -1, 0).unwrap();
        assert_eq!(current.total, 6);
        assert_eq!(
            current.items.iter().filter(|i| i.name.ends_with("renamed")).count(),
            3
        );
    }

    #[test]
    fn sub_collection_can_be_unparented() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "top"));
        deposit_ok(&engine, Collection::new(id("col-2"), "sub").with_parent(id("col-1")));

        let subs = engine.query().retrieve_sub_collections(&id("col-1"), -1, 0).unwrap();
        assert_eq!(subs.len(), 1);
        let top = engine
            .query()
            .retrieve::<Collection>(id("col-1"))
            .unwrap()
            .into_first()
            .unwrap();
        assert_eq!(top.children_ids, vec![id("col-2")]);

        deposit_ok(&engine, Collection::new(id("col-2"), "sub"));
        assert!(engine
            .query()
            .retrieve_sub_collections(&id("col-1"), -1, 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn metadata_is_listed_for_its_subject() {
        let engine = engine();
        deposit_ok(&engine, Collection::new(id("col-1"), "c"));
        let metadata = MetadataFile::new(id("meta-1"), id("col-1"), "README")
            .with_format("text/markdown")
            .with_file(DataFile::new(id("file-m"), "README.md").with_source(b"# hi".to_vec()));
        deposit_ok(&engine, metadata);

        let found = engine.query().retrieve_metadata(&id("col-1")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.items[0].format, "text/markdown");
        assert!(child_ids(&engine, "col-1").is_empty());
    }

    #[test]
    fn deposit_under_archive_id() {
        let engine = engine();
        let parent = deposit_ok(&engine, Collection::new(id("col-1"), "c"));
        let sub = Collection {
            name: "sub".into(),
            ..Collection::default()
        };
        let receipt = engine.deposit_under(parent.subject_state, sub).unwrap();
        settle(&engine);
        assert!(receipt.business_id.as_str().starts_with("col-"));
        let subs = engine.query().retrieve_sub_collections(&id("col-1"), -1, 0).unwrap();
        assert_eq!(subs.items[0].parent_id, Some(id("col-1")));
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    #[test]
    fn allocation_failure_submits_nothing() {
        let engine = DepositEngine::new(
            Arc::new(InMemoryArchive::with_config(ArchiveConfig::immediate())),
            Arc::new(SequentialAllocator::new().with_limit(1)),
        );
        let err = engine.deposit(Collection {
            name: "needs ids".into(),
            ..Collection::default()
        });
        assert!(matches!(err, Err(EngineError::AllocationFailure(_))));
        assert!(engine.submitter().deposits().unwrap().is_empty());
        assert_eq!(engine.archive().pending_ingests(), 0);
        assert!(engine.archive().is_empty());
    }

    #[test]
    fn allocated_id_never_takes_over_an_archived_object() {
        let engine = DepositEngine::new(
            Arc::new(InMemoryArchive::with_config(ArchiveConfig::immediate())),
            Arc::new(SequentialAllocator::new()),
        );
        let existing = deposit_ok(&engine, Collection::new(id("col-2"), "caller assigned"));
        let fresh = deposit_ok(
            &engine,
            Collection {
                name: "brand new".into(),
                ..Collection::default()
            },
        );

        assert_ne!(fresh.business_id, existing.business_id);
        assert_eq!(fresh.business_id.as_str(), "col-3");
        assert_ne!(fresh.root, existing.root);
        let kept = engine
            .query()
            .retrieve::<Collection>(id("col-2"))
            .unwrap()
            .into_first()
            .unwrap();
        assert_eq!(kept.name, "caller assigned");
        assert_eq!(engine.resolver().history(&id("col-2")).unwrap().len(), 1);
    }

    #[test]
    fn open_reserves_archived_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.json");
        let config = EngineConfig::from_toml_str(
            "[archive]\ningest_latency = 0\n[allocator]\nstrategy = \"sequential\"\n",
        )
        .unwrap();

        let first = DepositEngine::from_config(&config);
        deposit_ok(&first, Collection::new(id("col-5"), "caller assigned"));
        first.archive().save(&path).unwrap();

        let archive = InMemoryArchive::load(&path, config.archive.clone()).unwrap();
        let reopened = DepositEngine::open(archive, &config).unwrap();
        let receipt = deposit_ok(
            &reopened,
            Collection {
                name: "after restart".into(),
                ..Collection::default()
            },
        );
        assert_eq!(receipt.business_id.as_str(), "col-6");
    }

    #[test]
    fn offline_archive_is_a_submission_error() {
        let engine = engine();
        engine.archive().set_available(false);
        let err = engine.deposit(Collection::new(id("col-1"), "c")).unwrap_err();
        assert!(matches!(err, EngineError::Submission(_)));
        assert!(engine.submitter().deposits().unwrap().is_empty());
    }

    #[test]
    fn unknown_parent_fails_mapping() {
        let engine = engine();
        let err = engine.deposit(item("ds-1", "col-9", "orphan")).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Mapping(MappingError::UnresolvableParent(_))
        ));
    }

    #[test]
    fn deposit_lookup_is_empty_until_deposited() {
        let engine = engine_with(ArchiveConfig::default().with_latency(2));
        let receipt = engine.deposit(Collection::new(id("col-1"), "c")).unwrap();
        assert!(engine
            .query()
            .retrieve::<Collection>(receipt.deposit_id)
            .unwrap()
            .is_empty());
        assert!(matches!(
            engine.query().retrieve::<Collection>(id("col-1")),
            Err(EngineError::NotFound { .. })
        ));

        settle(&engine);
        assert_eq!(
            engine.query().retrieve::<Collection>(receipt.deposit_id).unwrap().len(),
            1
        );
    }

    // -----------------------------------------------------------------------
    // Async helpers and configuration
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn deposit_and_wait_completes() {
        let engine = engine_with(ArchiveConfig::default().with_latency(1));
        let (receipt, outcome) = engine
            .deposit_and_wait(Collection::new(id("col-1"), "c"))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Deposited);
        assert_eq!(engine.status(&receipt.deposit_id).unwrap(), DepositStatus::Deposited);
    }

    #[test]
    fn from_config_uses_configured_allocator() {
        let config = EngineConfig::from_toml_str(
            "[archive]\ningest_latency = 0\n[allocator]\nstrategy = \"sequential\"\nnamespace = \"lab\"\n",
        )
        .unwrap();
        let engine = DepositEngine::from_config(&config);
        let receipt = engine
            .deposit(Collection {
                name: "c".into(),
                ..Collection::default()
            })
            .unwrap();
        assert_eq!(receipt.business_id.as_str(), "lab.col-1");
        settle(&engine);
        assert_eq!(engine.status(&receipt.deposit_id).unwrap(), DepositStatus::Deposited);
    }
}

//! Business identifier allocation.
//!
//! Identifiers take the form `<prefix>-<suffix>` where the prefix comes from
//! [`Category::prefix`], optionally preceded by a namespace:
//! `<namespace>.<prefix>-<suffix>`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use depot_types::{BusinessId, Category};

use crate::error::{EngineError, EngineResult};

/// Issues business identifiers for new objects.
///
/// An implementation must never hand out the same identifier twice.
pub trait IdAllocator: Send + Sync {
    fn allocate(&self, category: Category) -> EngineResult<BusinessId>;

    /// Note an id already in use, so it is never handed out. Allocators
    /// whose ids cannot collide may ignore this.
    fn reserve(&self, _existing: &BusinessId) {}
}

fn format_id(namespace: Option<&str>, category: Category, suffix: &str) -> EngineResult<BusinessId> {
    let raw = match namespace {
        Some(ns) => format!("{ns}.{}-{suffix}", category.prefix()),
        None => format!("{}-{suffix}", category.prefix()),
    };
    BusinessId::new(raw).map_err(|e| EngineError::AllocationFailure(e.to_string()))
}

/// Allocator backed by UUIDv7 suffixes.
#[derive(Clone, Debug, Default)]
pub struct UuidAllocator {
    namespace: Option<String>,
}

impl UuidAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
        }
    }
}

impl IdAllocator for UuidAllocator {
    fn allocate(&self, category: Category) -> EngineResult<BusinessId> {
        let suffix = uuid::Uuid::now_v7().simple().to_string();
        let id = format_id(self.namespace.as_deref(), category, &suffix)?;
        debug!(%category, business_id = %id, "allocated identifier");
        Ok(id)
    }
}

/// Allocator handing out `1, 2, 3, ...` across all categories.
///
/// With a limit set, allocation fails once the limit is reached.
#[derive(Debug)]
pub struct SequentialAllocator {
    namespace: Option<String>,
    next: AtomicU64,
    limit: Option<u64>,
}

impl SequentialAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            namespace: None,
            next: AtomicU64::new(first),
            limit: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Refuse to allocate numbers above `limit`.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Default for SequentialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator for SequentialAllocator {
    fn allocate(&self, category: Category) -> EngineResult<BusinessId> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.limit {
            if n > limit {
                return Err(EngineError::AllocationFailure(format!(
                    "sequence exhausted at {limit}"
                )));
            }
        }
        format_id(self.namespace.as_deref(), category, &n.to_string())
    }

    fn reserve(&self, existing: &BusinessId) {
        if let Some(n) = self.sequence_number(existing) {
            self.next.fetch_max(n.saturating_add(1), Ordering::SeqCst);
        }
    }
}

impl SequentialAllocator {
    /// The counter value behind an id this allocator could have issued.
    fn sequence_number(&self, id: &BusinessId) -> Option<u64> {
        let raw = id.as_str();
        let local = match &self.namespace {
            Some(ns) => raw.strip_prefix(ns.as_str())?.strip_prefix('.')?,
            None if raw.contains('.') => return None,
            None => raw,
        };
        let (prefix, suffix) = local.rsplit_once('-')?;
        if !Category::ALL.iter().any(|c| c.prefix() == prefix) {
            return None;
        }
        suffix.parse().ok()
    }
}

/// Which allocator to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorStrategy {
    #[default]
    Uuid,
    Sequential,
}

/// `[allocator]` section of the engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub strategy: AllocatorStrategy,
    pub namespace: Option<String>,
}

impl AllocatorConfig {
    pub fn build(&self) -> Arc<dyn IdAllocator> {
        match (self.strategy, &self.namespace) {
            (AllocatorStrategy::Uuid, Some(ns)) => Arc::new(UuidAllocator::with_namespace(ns.clone())),
            (AllocatorStrategy::Uuid, None) => Arc::new(UuidAllocator::new()),
            (AllocatorStrategy::Sequential, Some(ns)) => {
                Arc::new(SequentialAllocator::new().with_namespace(ns.clone()))
            }
            (AllocatorStrategy::Sequential, None) => Arc::new(SequentialAllocator::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuid_ids_carry_category_prefix() {
        let allocator = UuidAllocator::new();
        let id = allocator.allocate(Category::DataItem).unwrap();
        assert!(id.as_str().starts_with("ds-"));
        let id = allocator.allocate(Category::Package).unwrap();
        assert!(id.as_str().starts_with("pkg-"));
    }

    #[test]
    fn uuid_ids_are_never_reused() {
        let allocator = UuidAllocator::with_namespace("lab");
        let ids: HashSet<BusinessId> = (0..500)
            .map(|_| allocator.allocate(Category::DataFile).unwrap())
            .collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.as_str().starts_with("lab.file-")));
    }

    #[test]
    fn sequential_counts_across_categories() {
        let allocator = SequentialAllocator::new();
        assert_eq!(allocator.allocate(Category::Collection).unwrap().as_str(), "col-1");
        assert_eq!(allocator.allocate(Category::DataItem).unwrap().as_str(), "ds-2");
        assert_eq!(allocator.allocate(Category::Person).unwrap().as_str(), "person-3");
    }

    #[test]
    fn exhausted_sequence_fails() {
        let allocator = SequentialAllocator::starting_at(9).with_limit(9);
        assert!(allocator.allocate(Category::Collection).is_ok());
        assert!(matches!(
            allocator.allocate(Category::Collection),
            Err(EngineError::AllocationFailure(_))
        ));
    }

    #[test]
    fn invalid_namespace_is_an_allocation_failure() {
        let allocator = UuidAllocator::with_namespace("has space");
        assert!(matches!(
            allocator.allocate(Category::Project),
            Err(EngineError::AllocationFailure(_))
        ));
    }

    #[test]
    fn reserved_ids_are_skipped() {
        let allocator = SequentialAllocator::new();
        allocator.reserve(&BusinessId::new("col-7").unwrap());
        allocator.reserve(&BusinessId::new("ds-3").unwrap());
        assert_eq!(allocator.allocate(Category::Collection).unwrap().as_str(), "col-8");
    }

    #[test]
    fn foreign_ids_do_not_move_the_sequence() {
        let allocator = SequentialAllocator::new().with_namespace("lab");
        allocator.reserve(&BusinessId::new("col-50").unwrap());
        allocator.reserve(&BusinessId::new("other.col-60").unwrap());
        allocator.reserve(&BusinessId::new("lab.survey-70").unwrap());
        assert_eq!(allocator.allocate(Category::Collection).unwrap().as_str(), "lab.col-1");
        allocator.reserve(&BusinessId::new("lab.ds-40").unwrap());
        assert_eq!(allocator.allocate(Category::DataItem).unwrap().as_str(), "lab.ds-41");
    }

    #[test]
    fn uuid_allocator_ignores_reservations() {
        let allocator = UuidAllocator::new();
        allocator.reserve(&BusinessId::new("col-1").unwrap());
        assert!(allocator.allocate(Category::Collection).is_ok());
    }

    #[test]
    fn config_builds_requested_strategy() {
        let config = AllocatorConfig {
            strategy: AllocatorStrategy::Sequential,
            namespace: Some("t".into()),
        };
        let allocator = config.build();
        assert_eq!(allocator.allocate(Category::MetadataFile).unwrap().as_str(), "t.meta-1");
    }
}

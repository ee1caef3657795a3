//! Package validation run by the archive before applying a package.
//!
//! A package that fails any check is rejected as a whole. The reason string
//! is what the depositor eventually sees as the failure cause.

use std::collections::{HashMap, HashSet};

use depot_types::{ArchiveId, BusinessId};

use crate::config::ConflictPolicy;
use crate::memory::ArchiveState;
use crate::package::Package;
use crate::record::ArchivalRecord;

pub(crate) fn check_package(
    state: &ArchiveState,
    package: &Package,
    policy: ConflictPolicy,
) -> Result<(), String> {
    if package.is_empty() {
        return Err("package contains no records".into());
    }

    let mut view = View {
        state,
        in_package: HashMap::new(),
    };
    for entry in &package.entries {
        entry.verify().map_err(|e| e.to_string())?;
        view.in_package.insert(entry.id, &entry.record);
    }

    let blobs: HashSet<ArchiveId> = package.blobs.iter().map(|b| b.compute_id()).collect();

    let new_roots = check_roots(state, package)?;

    let mut claimed_predecessors: HashSet<ArchiveId> = HashSet::new();
    for entry in package.entries.iter().filter(|e| e.record.is_state()) {
        let record = &entry.record;
        let business = &record.business_id;

        let root = new_roots
            .get(business)
            .or_else(|| state.roots.get(business))
            .ok_or_else(|| format!("no root record for {business}"))?;
        if !record.links_to(root) {
            return Err(format!("state record for {business} does not reference its root"));
        }
        if let Some(root_record) = view.get(root) {
            if root_record.category != record.category {
                return Err(format!(
                    "state record for {business} is a {} but its root is a {}",
                    record.category, root_record.category
                ));
            }
        }

        for parent in &record.parents {
            if view.get(parent).is_none() {
                return Err(format!(
                    "dangling parent {} on state record for {business}",
                    parent.short_hex()
                ));
            }
        }

        match record.successor_of {
            Some(previous) => {
                check_predecessor(&view, business, &previous, policy)?;
                if !claimed_predecessors.insert(previous) {
                    return Err(format!(
                        "two state records for {business} succeed {}",
                        previous.short_hex()
                    ));
                }
            }
            None => {
                if !new_roots.contains_key(business) && has_states(state, root, business) {
                    return Err(format!(
                        "first-version state for {business} would fork its existing history"
                    ));
                }
            }
        }

        if let Some(content) = &record.content {
            if !blobs.contains(content) && !state.blobs.contains_key(content) {
                return Err(format!(
                    "missing content blob {} for {business}",
                    content.short_hex()
                ));
            }
        }
    }

    Ok(())
}

/// Records visible to a package: its own plus everything already stored.
struct View<'a> {
    state: &'a ArchiveState,
    in_package: HashMap<ArchiveId, &'a ArchivalRecord>,
}

impl<'a> View<'a> {
    fn get(&self, id: &ArchiveId) -> Option<&'a ArchivalRecord> {
        self.in_package
            .get(id)
            .copied()
            .or_else(|| self.state.records.get(id))
    }
}

/// Check root records and return the roots this package introduces.
fn check_roots<'a>(
    state: &ArchiveState,
    package: &'a Package,
) -> Result<HashMap<&'a BusinessId, ArchiveId>, String> {
    let mut new_roots = HashMap::new();
    for entry in package.entries.iter().filter(|e| e.record.is_root()) {
        let record = &entry.record;
        let business = &record.business_id;
        if !record.parents.is_empty() || record.successor_of.is_some() {
            return Err(format!("root record for {business} carries relationships"));
        }
        if state.roots.contains_key(business) {
            return Err(format!("root record already exists for {business}"));
        }
        if new_roots.insert(business, entry.id).is_some() {
            return Err(format!("package contains two root records for {business}"));
        }
        let has_state = package
            .entries
            .iter()
            .any(|e| e.record.is_state() && e.record.business_id == *business);
        if !has_state {
            return Err(format!("root record for {business} has no state record"));
        }
    }
    Ok(new_roots)
}

fn check_predecessor(
    view: &View<'_>,
    business: &BusinessId,
    previous: &ArchiveId,
    policy: ConflictPolicy,
) -> Result<(), String> {
    let prior = view.get(previous).ok_or_else(|| {
        format!(
            "predecessor {} of {business} not found",
            previous.short_hex()
        )
    })?;
    if !prior.is_state() || prior.business_id != *business {
        return Err(format!(
            "predecessor {} of {business} belongs to another object",
            previous.short_hex()
        ));
    }
    let taken = view
        .state
        .successors
        .get(previous)
        .is_some_and(|s| !s.is_empty());
    if taken && policy == ConflictPolicy::RejectStale {
        return Err(format!(
            "stale predecessor: {} of {business} already has a successor",
            previous.short_hex()
        ));
    }
    Ok(())
}

fn has_states(state: &ArchiveState, root: &ArchiveId, business: &BusinessId) -> bool {
    state
        .referencing
        .get(root)
        .into_iter()
        .flatten()
        .filter_map(|id| state.records.get(id))
        .any(|r| r.is_state() && r.business_id == *business)
}

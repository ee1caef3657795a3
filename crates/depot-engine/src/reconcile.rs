//! Per-file replace-or-carry-forward decisions for updated file owners.

use depot_model::{DataFile, FileLinkage};

/// What happens to one proposed file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileAction {
    /// Same id, no new content: the prior descriptor is reused as is.
    CarryForward,
    /// Same id, new content: a new state in the file's own chain.
    Replace,
    /// Not in the prior set.
    Add,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconciledFile {
    pub action: FileAction,
    pub file: DataFile,
    /// Archive linkage of the prior version, for carried and replaced files.
    pub prior: Option<FileLinkage>,
}

/// Outcome of reconciling a proposed file list against the prior one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// In proposed order.
    pub files: Vec<ReconciledFile>,
    /// Prior files absent from the proposal, in prior order.
    pub dropped: Vec<DataFile>,
}

impl Reconciliation {
    pub fn count(&self, action: FileAction) -> usize {
        self.files.iter().filter(|f| f.action == action).count()
    }

    /// The resulting file list.
    pub fn into_files(self) -> Vec<DataFile> {
        self.files.into_iter().map(|f| f.file).collect()
    }
}

/// Decide, per file id, whether each proposed file carries the prior version
/// forward, replaces it, or is new. Proposed files without an id are
/// additions.
pub fn reconcile(prior: &[DataFile], proposed: &[DataFile]) -> Reconciliation {
    let find_prior = |file: &DataFile| {
        file.id
            .as_ref()
            .and_then(|id| prior.iter().find(|p| p.id.as_ref() == Some(id)))
    };

    let files = proposed
        .iter()
        .map(|file| match find_prior(file) {
            Some(previous) if !file.has_source() => ReconciledFile {
                action: FileAction::CarryForward,
                file: previous.clone(),
                prior: previous.linkage,
            },
            Some(previous) => ReconciledFile {
                action: FileAction::Replace,
                file: file.clone(),
                prior: previous.linkage,
            },
            None => ReconciledFile {
                action: FileAction::Add,
                file: file.clone(),
                prior: None,
            },
        })
        .collect();

    let dropped = prior
        .iter()
        .filter(|p| !proposed.iter().any(|f| f.id.is_some() && f.id == p.id))
        .cloned()
        .collect();

    Reconciliation { files, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_types::{ArchiveId, BusinessId};
    use proptest::prelude::*;

    fn id(s: &str) -> BusinessId {
        BusinessId::new(s).unwrap()
    }

    fn archived(name: &str, n: u8) -> DataFile {
        let mut file = DataFile::new(id(name), format!("{name}.dat"));
        file.size = u64::from(n);
        file.linkage = Some(FileLinkage {
            root: ArchiveId::from_bytes(&[n, 0]),
            state: ArchiveId::from_bytes(&[n, 1]),
            content: ArchiveId::from_bytes(&[n, 2]),
        });
        file
    }

    #[test]
    fn unchanged_file_is_carried_forward() {
        let prior = vec![archived("file-1", 1)];
        let proposed = vec![DataFile::new(id("file-1"), "renamed-but-ignored.dat")];
        let result = reconcile(&prior, &proposed);
        assert_eq!(result.files[0].action, FileAction::CarryForward);
        assert_eq!(result.files[0].file, prior[0]);
        assert!(result.dropped.is_empty());
    }

    #[test]
    fn new_source_replaces() {
        let prior = vec![archived("file-1", 1)];
        let proposed = vec![DataFile::new(id("file-1"), "file-1.dat").with_source(b"v2".to_vec())];
        let result = reconcile(&prior, &proposed);
        assert_eq!(result.files[0].action, FileAction::Replace);
        assert_eq!(result.files[0].prior, prior[0].linkage);
        assert!(result.files[0].file.has_source());
    }

    #[test]
    fn unknown_and_unassigned_files_are_added() {
        let prior = vec![archived("file-1", 1)];
        let proposed = vec![
            DataFile::new(id("file-2"), "b").with_source(b"b".to_vec()),
            DataFile::unassigned("c").with_source(b"c".to_vec()),
        ];
        let result = reconcile(&prior, &proposed);
        assert_eq!(result.count(FileAction::Add), 2);
        assert_eq!(result.dropped, prior);
    }

    #[test]
    fn result_follows_proposed_order() {
        let prior = vec![archived("file-1", 1), archived("file-2", 2)];
        let proposed = vec![
            DataFile::new(id("file-2"), "x"),
            DataFile::new(id("file-1"), "y"),
        ];
        let names: Vec<String> = reconcile(&prior, &proposed)
            .into_files()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["file-2.dat", "file-1.dat"]);
    }

    proptest! {
        #[test]
        fn resubmitting_without_sources_is_identity(count in 0usize..12) {
            let prior: Vec<DataFile> = (0..count)
                .map(|i| archived(&format!("file-{i}"), i as u8))
                .collect();
            let proposed: Vec<DataFile> = prior
                .iter()
                .map(|f| DataFile { source: None, linkage: None, ..f.clone() })
                .collect();
            let result = reconcile(&prior, &proposed);
            prop_assert_eq!(result.count(FileAction::CarryForward), count);
            prop_assert!(result.dropped.is_empty());
            prop_assert_eq!(result.into_files(), prior);
        }

        #[test]
        fn every_prior_file_is_kept_or_dropped(keep in proptest::collection::vec(any::<bool>(), 0..12)) {
            let prior: Vec<DataFile> = (0..keep.len())
                .map(|i| archived(&format!("file-{i}"), i as u8))
                .collect();
            let proposed: Vec<DataFile> = prior
                .iter()
                .zip(&keep)
                .filter(|(_, k)| **k)
                .map(|(f, _)| f.clone())
                .collect();
            let result = reconcile(&prior, &proposed);
            prop_assert_eq!(result.files.len() + result.dropped.len(), prior.len());
            for dropped in &result.dropped {
                prop_assert!(!proposed.iter().any(|f| f.id == dropped.id));
            }
        }
    }
}

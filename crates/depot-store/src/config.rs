use serde::{Deserialize, Serialize};

/// How the archive treats a state record whose predecessor already has a
/// successor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Accept it. The chain forks and resolution of that business id reports
    /// an ambiguous version until someone repairs it.
    #[default]
    LastWriterWins,
    /// Reject the package.
    RejectStale,
}

/// Configuration for [`InMemoryArchive`](crate::InMemoryArchive).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Number of progress checks a package spends in flight before the
    /// archive processes it. `0` processes it on the first check.
    pub ingest_latency: u32,
    pub conflict_policy: ConflictPolicy,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            ingest_latency: 1,
            conflict_policy: ConflictPolicy::LastWriterWins,
        }
    }
}

impl ArchiveConfig {
    /// Process every package on its first progress check.
    pub fn immediate() -> Self {
        Self {
            ingest_latency: 0,
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, ingest_latency: u32) -> Self {
        self.ingest_latency = ingest_latency;
        self
    }

    pub fn with_conflict_policy(mut self, conflict_policy: ConflictPolicy) -> Self {
        self.conflict_policy = conflict_policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ArchiveConfig::default();
        assert_eq!(config.ingest_latency, 1);
        assert_eq!(config.conflict_policy, ConflictPolicy::LastWriterWins);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: ArchiveConfig =
            serde_json::from_str(r#"{"conflict_policy":"reject_stale"}"#).unwrap();
        assert_eq!(config.ingest_latency, 1);
        assert_eq!(config.conflict_policy, ConflictPolicy::RejectStale);
    }
}

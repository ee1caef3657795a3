use std::path::Path;

use serde::{Deserialize, Serialize};

use depot_store::ArchiveConfig;

use crate::allocator::AllocatorConfig;
use crate::error::{EngineError, EngineResult};
use crate::poller::PollPolicy;

/// Engine configuration, usually read from a TOML file:
///
/// ```toml
/// [archive]
/// ingest_latency = 1
/// conflict_policy = "reject_stale"
///
/// [poll]
/// max_attempts = 20
/// interval_ms = 50
///
/// [allocator]
/// strategy = "uuid"
/// namespace = "lab"
/// ```
///
/// Every section and key is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub archive: ArchiveConfig,
    pub poll: PollPolicy,
    pub allocator: AllocatorConfig,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
    }
}

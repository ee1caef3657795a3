use depot_types::ArchiveId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g. `"depot-root-v1"`) that is prepended
/// to every hash computation, so a root record and a blob with identical bytes
/// never share an id.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for root records.
    pub const ROOT: Self = Self {
        domain: "depot-root-v1",
    };
    /// Hasher for state records.
    pub const STATE: Self = Self {
        domain: "depot-state-v1",
    };
    /// Hasher for file content blobs.
    pub const CONTENT: Self = Self {
        domain: "depot-content-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ArchiveId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ArchiveId::from_hash(*hasher.finalize().as_bytes())
    }
}

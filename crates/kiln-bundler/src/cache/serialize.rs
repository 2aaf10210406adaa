//! Serializable cache entries.

use serde::{Deserialize, Serialize};

/// Current cache format version. Increment when format changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Cache metadata for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Module keys rendered into the artifact, in chunk order.
    pub modules: Vec<String>,

    /// Unix timestamp when the artifact was built.
    pub built_at: u64,

    /// Cache format version.
    pub format_version: u32,
}

impl CacheMetadata {
    pub fn new(modules: Vec<String>) -> Self {
        Self {
            modules,
            built_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            format_version: CACHE_FORMAT_VERSION,
        }
    }

    /// Check if this metadata is compatible with current version.
    pub fn is_compatible(&self) -> bool {
        self.format_version == CACHE_FORMAT_VERSION
    }
}

/// A built chunk artifact. The metadata is informational; the bytes are what
/// gets written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub metadata: CacheMetadata,
    pub bytes: Vec<u8>,
}

impl CacheEntry {
    pub fn new(modules: Vec<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata: CacheMetadata::new(modules),
            bytes: bytes.into(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

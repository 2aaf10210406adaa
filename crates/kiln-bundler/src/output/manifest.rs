//! The `manifest.json` written next to the artifacts.

use std::path::Path;

use indexmap::IndexMap;
use kiln_graph::ContentHash;
use serde::{Deserialize, Serialize};

use crate::chunk::{ChunkGraph, ChunkKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestChunk {
    pub filename: String,
    /// Full hex content hash.
    pub hash: String,
    pub kind: ChunkKind,
    /// Member module keys, in chunk order.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Chunks loaded before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Chunks fetched by dynamic imports inside this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub async_dependencies: Vec<String>,
}

/// Build hash, every emitted chunk and the entry → chunk mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub hash: String,
    pub chunks: IndexMap<String, ManifestChunk>,
    /// Entry name → entry chunk id.
    #[serde(default)]
    pub entries: IndexMap<String, String>,
}

impl BuildManifest {
    /// Collect the manifest of a hashed chunk graph. Chunks without a hash or
    /// a filename are left out.
    pub fn collect(
        chunks: &ChunkGraph,
        build_hash: &ContentHash,
        filenames: &IndexMap<String, String>,
        root: &Path,
    ) -> Self {
        let mut manifest = Self {
            hash: build_hash.to_hex(),
            ..Self::default()
        };

        for chunk in chunks.chunks() {
            let (Some(filename), Some(hash)) = (filenames.get(&chunk.id), &chunk.hash) else {
                continue;
            };
            manifest.chunks.insert(
                chunk.id.clone(),
                ManifestChunk {
                    filename: filename.clone(),
                    hash: hash.to_hex(),
                    kind: chunk.kind,
                    modules: chunk.modules.iter().map(|id| id.relative_key(root)).collect(),
                    dependencies: chunk.static_dependencies().map(str::to_string).collect(),
                    async_dependencies: chunk.async_dependencies().map(str::to_string).collect(),
                },
            );
            if chunk.kind == ChunkKind::Entry {
                manifest.entries.insert(chunk.name.clone(), chunk.id.clone());
            }
        }
        manifest
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.chunks.values().map(|chunk| chunk.filename.as_str())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_a_written_manifest() {
        let json = r#"{
            "hash": "ab",
            "chunks": {
                "runtime": { "filename": "runtime.js", "hash": "01", "kind": "runtime" },
                "app": {
                    "filename": "app.js",
                    "hash": "02",
                    "kind": "entry",
                    "modules": ["src/a.js"],
                    "dependencies": ["runtime"],
                    "async_dependencies": ["extra"]
                }
            },
            "entries": { "app": "app" }
        }"#;
        let manifest = BuildManifest::from_json(json).unwrap();
        assert_eq!(manifest.chunks["app"].kind, ChunkKind::Entry);
        assert!(manifest.chunks["runtime"].dependencies.is_empty());
        assert_eq!(manifest.filenames().collect::<Vec<_>>(), ["runtime.js", "app.js"]);

        let again = BuildManifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(again, manifest);
    }
}

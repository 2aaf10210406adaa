//! Build output: rendering, filename templates, the manifest and the writer.

pub mod manifest;
pub mod render;
pub mod template;
pub mod writer;

pub use manifest::{BuildManifest, ManifestChunk};
pub use render::{
    ChunkPayload, RenderedModule, RuntimeChunkInfo, RuntimeEntry, RuntimeManifest, parse_chunk,
    parse_runtime_manifest, render_chunk, render_runtime,
};
pub use template::{DEFAULT_HASH_LENGTH, FilenameTemplate, TemplateContext};
pub use writer::{OutputWriter, WriteReport, validate_output_path};

use std::sync::Arc;

use kiln_graph::ContentHash;

use crate::cache::CacheEntry;
use crate::chunk::{ChunkGraph, ChunkKind};

/// One emitted file.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub chunk: String,
    pub kind: ChunkKind,
    pub filename: String,
    pub hash: ContentHash,
    pub content: Arc<CacheEntry>,
}

impl Artifact {
    pub fn text(&self) -> Option<&str> {
        self.content.as_str()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub modules: usize,
    /// Modules left after tree shaking.
    pub included: usize,
    pub chunks: usize,
    /// Artifacts rendered by this build rather than taken from the cache.
    pub rendered: usize,
}

/// A finished build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub chunks: ChunkGraph,
    /// In chunk creation order, runtime first.
    pub artifacts: Vec<Artifact>,
    pub manifest: BuildManifest,
    pub build_hash: ContentHash,
    pub stats: BuildStats,
}

impl BuildOutput {
    pub fn artifact(&self, chunk: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|artifact| artifact.chunk == chunk)
    }

    pub fn artifact_by_filename(&self, filename: &str) -> Option<&Artifact> {
        self.artifacts
            .iter()
            .find(|artifact| artifact.filename == filename)
    }

    /// Content hashes of every artifact, for cache garbage collection.
    pub fn live_hashes(&self) -> impl Iterator<Item = ContentHash> + '_ {
        self.artifacts.iter().map(|artifact| artifact.hash)
    }

    /// The runtime manifest embedded in the runtime chunk.
    pub fn runtime_manifest(&self) -> Option<RuntimeManifest> {
        let runtime = self.artifact(self.chunks.runtime_id())?;
        parse_runtime_manifest(runtime.text()?)
    }
}

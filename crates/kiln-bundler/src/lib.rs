#![cfg_attr(docsrs, feature(doc_cfg))]

//! # kiln-bundler
//!
//! Chunk partitioning, content hashing, the artifact cache and build
//! orchestration, on top of the `kiln-graph` module graph.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kiln_bundler::{Bundler, NativeRuntime};
//! use kiln_config::ConfigLoader;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new(".").load()?;
//! let bundler = Bundler::new(config, Arc::new(NativeRuntime::new()))?;
//!
//! let output = bundler.build().await?;
//! for artifact in &output.artifacts {
//!     println!("{} {}", artifact.filename, artifact.hash.short(8));
//! }
//!
//! // Later, from a file watcher:
//! let rebuild = bundler.rebuild(&[std::path::PathBuf::from("src/page.js")]).await?;
//! println!("{}", rebuild.payload.to_json()?);
//! # Ok(()) }
//! ```
//!
//! ## Pipeline
//!
//! 1. [`GraphBuilder`] resolves the entries and builds the [`ModuleGraph`].
//! 2. [`TreeShaker`] computes live exports and drops dead modules.
//! 3. [`Partitioner`] splits what is left into runtime, vendor, entry and
//!    async chunks.
//! 4. [`ContentHasher`] hashes every chunk from its inputs.
//! 5. Each chunk is rendered through the [`CacheStore`], keyed by its hash.
//! 6. [`OutputWriter`] writes the artifacts and `manifest.json`.

// Re-export everything from the graph crate
pub use kiln_graph::*;

pub mod bundler;
pub mod cache;
pub mod chunk;
pub mod error;
pub mod hash;
pub mod output;
pub mod partition;

#[cfg(feature = "logging")]
pub mod logging;

pub use bundler::{Bundler, Rebuild};
pub use cache::{CacheEntry, CacheError, CacheMetadata, CacheStats, CacheStore};
pub use chunk::{Chunk, ChunkDependency, ChunkGraph, ChunkKind};
pub use error::{BuildError, Error, PartitionInvariantError, Result};
pub use hash::{ContentHasher, HASH_FORMAT_VERSION};
pub use output::{
    Artifact, BuildManifest, BuildOutput, BuildStats, FilenameTemplate, ManifestChunk,
    OutputWriter, RuntimeManifest,
};
pub use partition::{PartitionOptions, Partitioner};

#[cfg(feature = "logging")]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

//! # kiln-graph
//!
//! Module resolution, dependency graph construction and tree shaking for the
//! kiln bundler.
//!
//! The crate is organised around a single shared [`ModuleGraph`]:
//!
//! - [`ModuleResolver`] maps import specifiers to [`ModuleId`]s.
//! - [`AssetPipeline`] turns file bytes into [`LoadedModule`]s through
//!   registered [`Loader`]s (the built-in [`ScriptLoader`] handles scripts).
//! - [`GraphBuilder`] walks the entries breadth-first and fills the graph.
//! - [`TreeShaker`] computes live exports and the modules that can be dropped.
//!
//! All file access goes through the [`Runtime`] trait so the same code runs
//! against the native file system or an in-memory tree.

pub mod builder;
pub mod cancel;
pub mod error;
pub mod graph;
pub mod hash;
pub mod module;
pub mod module_id;
pub mod package_json;
pub mod pipeline;
pub mod resolver;
pub mod runtime;
pub mod tree_shaker;

#[cfg(test)]
mod tests;

pub use builder::{BuilderOptions, EntryPoint, GraphBuilder, RebuildOutcome};
pub use cancel::{CancellationSource, CancellationToken};
pub use error::{GraphError, ParseError, ResolutionError, TransformError};
pub use graph::ModuleGraph;
pub use hash::ContentHash;
pub use module::{
    DependencyEdge, DependencyKind, Export, ExportKind, ImportedBindings, Module, ModuleBuilder,
};
pub use module_id::{ModuleId, ModuleIdError};
pub use pipeline::script::ScriptLoader;
pub use pipeline::{AssetPipeline, BuildMode, DependencyDecl, LoadContext, LoadedModule, Loader};
pub use resolver::{ModuleResolver, ResolverConfig};
pub use runtime::{Runtime, RuntimeError, RuntimeResult};
pub use tree_shaker::{LiveExports, ShakeResult, TreeShaker};

#[cfg(not(target_family = "wasm"))]
pub use runtime::native::NativeRuntime;

#[cfg(any(test, feature = "test-utils"))]
pub use runtime::memory::MemoryRuntime;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

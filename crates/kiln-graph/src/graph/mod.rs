//! Shared module graph.
//!
//! [`ModuleGraph`] is a cheap handle (`Arc<RwLock<..>>`) over the modules of
//! one build. Methods are split across files by concern; each file adds an
//! `impl ModuleGraph` block.

mod construction;
mod inner;
mod mutations;
mod queries;
mod traversal;

pub use inner::ModuleGraph;

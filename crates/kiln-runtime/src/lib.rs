//! # kiln-runtime
//!
//! The module runtime that bundled code executes against.
//!
//! - [`Registry`] holds module definitions and instances. It is an explicit
//!   value owned by the runtime chunk and handed to every module factory
//!   through a [`ModuleContext`].
//! - [`ExportTable`] is a shared, mutable export object. Importers keep the
//!   handle and read bindings at use time, which is what makes cyclic imports
//!   and in-place hot replacement work.
//! - [`DynamicImporter`] loads the chunks behind a lazy import as an async
//!   task.
//! - [`HmrRuntime`] applies incremental updates, falling back to a full
//!   reload when an update cannot be accepted.

pub mod error;
pub mod exports;
pub mod hmr;
pub mod loader;
pub mod registry;

pub use error::{EvalError, HmrError, LoadError, TransportError};
pub use exports::ExportTable;
pub use hmr::{
    ApplyOutcome, HmrPayload, HmrRuntime, HmrStatus, HmrUpdate, InMemoryTransport, ManifestEntry,
    ModuleSource, ModuleUpdate, UpdateManifest, UpdateTransport,
};
pub use loader::{ChunkFetcher, ChunkMap, DynamicImporter, FetchedChunk};
pub use registry::{
    AcceptEvent, FnFactory, HotContext, ModuleCompiler, ModuleContext, ModuleDefinition,
    ModuleFactory, Registry,
};

/// Identifier of a module at runtime (the key the bundler emitted for it).
pub type ModuleKey = String;

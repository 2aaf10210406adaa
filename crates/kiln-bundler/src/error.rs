//! Error types for kiln-bundler operations.
//!
//! Every variant of [`Error`] carries a stable diagnostic code
//! (`kiln::resolution`, `kiln::parse`, ...) through [`miette::Diagnostic`], so
//! front ends can match on kinds without parsing messages.

use std::fmt;
use std::path::PathBuf;

use kiln_config::ConfigError;
use kiln_graph::{GraphError, ModuleId, RuntimeError};
use miette::Diagnostic;

use crate::cache::CacheError;

/// Result type alias for kiln-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A broken chunk graph. Never expected from a valid, tree-shaken graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PartitionInvariantError {
    #[error("included module '{0}' was not assigned to any chunk")]
    Unassigned(ModuleId),

    #[error("runtime chunk '{0}' is missing")]
    MissingRuntime(String),

    #[error("runtime chunk '{0}' must not depend on other chunks")]
    RuntimeHasDependencies(String),

    #[error("chunk '{0}' does not depend on the runtime chunk")]
    Detached(String),

    #[error("chunk '{chunk}' depends on unknown chunk '{dependency}'")]
    UnknownDependency { chunk: String, dependency: String },
}

/// A failed chunk artifact build. Never stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("failed to render chunk '{chunk}': {message}")]
    Render { chunk: String, message: String },

    #[error("chunk build cancelled")]
    Cancelled,
}

/// Error types for kiln-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Resolution, read, parse or transform failure while building the graph.
    #[error(transparent)]
    Graph(GraphError),

    #[error("chunk partitioning failed: {0}")]
    Partition(#[from] PartitionInvariantError),

    #[error(transparent)]
    Build(BuildError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("chunks '{first}' and '{second}' both emit '{filename}'")]
    FilenameConflict {
        filename: String,
        first: String,
        second: String,
    },

    #[error("invalid filename template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// Invalid output path (e.g., directory traversal attempt).
    #[error("invalid output path: {0}")]
    InvalidOutputPath(String),

    #[error("failed to write '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Superseded by a newer build before committing.
    #[error("build cancelled")]
    Cancelled,

    #[error("no previous build to rebuild from")]
    NoPreviousBuild,
}

impl From<GraphError> for Error {
    fn from(err: GraphError) -> Self {
        if err.is_cancelled() {
            Self::Cancelled
        } else {
            Self::Graph(err)
        }
    }
}

impl From<BuildError> for Error {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Cancelled => Self::Cancelled,
            err => Self::Build(err),
        }
    }
}

impl From<RuntimeError> for Error {
    fn from(err: RuntimeError) -> Self {
        Self::Graph(GraphError::Runtime(err))
    }
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Graph(err) => match err {
                GraphError::Resolution(_) => "kiln::resolution",
                GraphError::Parse { .. } => "kiln::parse",
                GraphError::Transform { .. } => "kiln::transform",
                GraphError::Read { .. } | GraphError::Runtime(_) => "kiln::io",
                GraphError::Cancelled => "kiln::cancelled",
                _ => "kiln::graph",
            },
            Self::Partition(_) => "kiln::partition_invariant",
            Self::Build(_) => "kiln::build",
            Self::Cache(_) => "kiln::cache",
            Self::Config(_) => "kiln::config",
            Self::FilenameConflict { .. } => "kiln::filename_conflict",
            Self::InvalidTemplate { .. } => "kiln::template",
            Self::InvalidOutputPath(_) => "kiln::output_path",
            Self::Write { .. } => "kiln::io",
            Self::Manifest(_) => "kiln::manifest",
            Self::Cancelled => "kiln::cancelled",
            Self::NoPreviousBuild => "kiln::no_previous_build",
        }
    }

    fn help_text(&self) -> Option<String> {
        match self {
            Self::Graph(GraphError::Resolution(_)) => {
                Some("check the specifier and the resolve.extensions / resolve.roots settings".into())
            }
            Self::Partition(_) => Some("this is a bug in kiln; please report it".into()),
            Self::Config(err) => err.hint().map(str::to_string),
            Self::FilenameConflict { .. } => {
                Some("add [name], [id] or [contenthash] to the output filename templates".into())
            }
            Self::NoPreviousBuild => Some("run a full build before rebuilding".into()),
            _ => None,
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(Error::code(self)))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help_text()
            .map(|help| Box::new(help) as Box<dyn fmt::Display + 'a>)
    }
}

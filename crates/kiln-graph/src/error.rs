//! Error types for graph construction.

use std::fmt;
use std::path::PathBuf;

use crate::module_id::{ModuleId, ModuleIdError};
use crate::runtime::RuntimeError;

/// A specifier that matched no file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot resolve '{specifier}' from {}{}", ImporterDisplay(.importer.as_ref()), TriedDisplay(.tried))]
pub struct ResolutionError {
    pub specifier: String,
    /// `None` for entry specifiers.
    pub importer: Option<ModuleId>,
    /// Every candidate path, in the order it was tried.
    pub tried: Vec<PathBuf>,
}

struct ImporterDisplay<'a>(Option<&'a ModuleId>);

impl fmt::Display for ImporterDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(importer) => write!(f, "'{importer}'"),
            None => f.write_str("the entry list"),
        }
    }
}

struct TriedDisplay<'a>(&'a [PathBuf]);

impl fmt::Display for TriedDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        f.write_str(" (tried: ")?;
        for (i, path) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", path.display())?;
        }
        f.write_str(")")
    }
}

/// Malformed source, with a 1-based position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at {line}:{column}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    /// Build an error for the byte `offset` of `source`.
    pub fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let offset = offset.min(source.len());
        let before = &source.as_bytes()[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        let column = String::from_utf8_lossy(&before[line_start..]).chars().count() + 1;

        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

/// Failures raised by loaders.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("no loader registered for extension '{extension}'")]
    NoLoader { extension: String },

    #[error("source is not valid UTF-8")]
    InvalidUtf8,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{loader} loader failed: {message}")]
    Failed { loader: String, message: String },
}

/// Errors from graph construction and mutation.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("failed to parse '{module}': {source}")]
    Parse {
        module: ModuleId,
        #[source]
        source: ParseError,
    },

    #[error("failed to transform '{module}': {source}")]
    Transform {
        module: ModuleId,
        #[source]
        source: TransformError,
    },

    #[error("failed to read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: RuntimeError,
    },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    InvalidModuleId(#[from] ModuleIdError),

    #[error("at least one entry is required")]
    NoEntries,

    #[error("duplicate entry name '{0}'")]
    DuplicateEntry(String),

    #[error("module not found in graph: {0}")]
    UnknownModule(ModuleId),

    #[error("edge from '{from}' points at '{to}', which is not in the graph")]
    DanglingEdge { from: ModuleId, to: ModuleId },

    #[error("build cancelled")]
    Cancelled,
}

impl GraphError {
    /// Wrap a loader failure for `module`, lifting parse errors.
    pub fn from_transform(module: ModuleId, error: TransformError) -> Self {
        match error {
            TransformError::Parse(source) => Self::Parse { module, source },
            source => Self::Transform { module, source },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

//! Module identity.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use path_clean::PathClean;
use serde::{Deserialize, Serialize};

/// Identity of a resolved module: an absolute, lexically cleaned path plus an
/// optional query string (`/src/logo.svg?raw`).
///
/// Two specifiers that resolve to the same file with different queries are
/// different modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId {
    path: PathBuf,
    query: Option<String>,
}

/// Errors raised when constructing a [`ModuleId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleIdError {
    #[error("module path is empty")]
    Empty,

    #[error("module path must be absolute: {0}")]
    NotAbsolute(PathBuf),
}

impl ModuleId {
    /// Create an identity without a query.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ModuleIdError> {
        Self::with_query(path, None)
    }

    /// Create an identity with an optional query. An empty query is dropped.
    pub fn with_query(
        path: impl Into<PathBuf>,
        query: Option<String>,
    ) -> Result<Self, ModuleIdError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(ModuleIdError::Empty);
        }
        if !path.is_absolute() {
            return Err(ModuleIdError::NotAbsolute(path));
        }

        Ok(Self {
            path: path.clean(),
            query: query.filter(|q| !q.is_empty()),
        })
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// File extension without the leading dot, if any.
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }

    pub fn file_stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|stem| stem.to_str())
    }

    /// Directory containing the module.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(&self.path)
    }

    /// Whether any path component is a `node_modules` directory.
    pub fn is_in_node_modules(&self) -> bool {
        self.path
            .components()
            .any(|c| matches!(c, Component::Normal(name) if name == "node_modules"))
    }

    /// Stable, machine-independent key relative to `root`, using `/` as the
    /// separator. Falls back to the absolute path for modules outside `root`.
    pub fn relative_key(&self, root: &Path) -> String {
        let (path, outside) = match self.path.strip_prefix(root) {
            Ok(relative) => (relative, false),
            Err(_) => (self.path.as_path(), true),
        };
        let mut key = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        if outside {
            key.insert(0, '/');
        }
        if let Some(query) = &self.query {
            key.push('?');
            key.push_str(query);
        }
        key
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())?;
        if let Some(query) = &self.query {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

impl FromStr for ModuleId {
    type Err = ModuleIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('?') {
            Some((path, query)) => Self::with_query(path, Some(query.to_string())),
            None => Self::new(s),
        }
    }
}

impl TryFrom<String> for ModuleId {
    type Error = ModuleIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleId> for String {
    fn from(id: ModuleId) -> Self {
        id.to_string()
    }
}

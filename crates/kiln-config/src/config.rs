//! The configuration model.
//!
//! Every section has serde defaults, so a `kiln.toml` only needs the values
//! it changes:
//!
//! ```toml
//! mode = "development"
//!
//! [entries]
//! app = "./src/a.js"
//! print = "./src/b.js"
//!
//! [output]
//! filename = "[name].[contenthash:8].js"
//! ```

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Build mode, mirrored into `process.env.NODE_ENV`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Development,
}

impl Mode {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Production => "production",
            Self::Development => "development",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    /// Entry name → module specifier, in declaration order.
    pub entries: IndexMap<String, String>,
    pub output: OutputConfig,
    pub resolve: ResolveConfig,
    pub mode: Mode,
    pub optimization: OptimizationConfig,
    pub cache: CacheConfig,
    /// Size of the compile and render pools. Defaults to the CPU count.
    pub workers: Option<usize>,
}

impl KilnConfig {
    /// Parse a TOML document on top of the defaults. Does not validate.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Programmatic configuration (from a database or an API request).
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|err| ConfigError::InvalidValue {
            field: "config".to_string(),
            hint: Some(err.to_string()),
        })
    }

    pub fn entry(mut self, name: impl Into<String>, specifier: impl Into<String>) -> Self {
        self.entries.insert(name.into(), specifier.into());
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory, relative to the project root.
    pub dir: PathBuf,
    /// Template for entry, vendor and runtime chunks.
    pub filename: String,
    /// Template for async chunks. Falls back to `filename`.
    pub chunk_filename: Option<String>,
    /// Manifest file name inside `dir`.
    pub manifest: String,
    /// Remove files emitted by the previous build that are no longer emitted.
    pub clean: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dist"),
            filename: "[name].js".to_string(),
            chunk_filename: None,
            manifest: "manifest.json".to_string(),
            clean: false,
        }
    }
}

impl OutputConfig {
    /// Template used for async chunks.
    pub fn chunk_filename(&self) -> &str {
        self.chunk_filename.as_deref().unwrap_or(&self.filename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Tried in order after the exact path.
    pub extensions: Vec<String>,
    /// Searched in order for bare specifiers.
    pub roots: Vec<PathBuf>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: vec![
                ".mjs".to_string(),
                ".js".to_string(),
                ".jsx".to_string(),
                ".cjs".to_string(),
            ],
            roots: vec![PathBuf::from("node_modules")],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Id of the runtime chunk.
    pub runtime_chunk: String,
    /// Id of the chunk holding modules shared by several entries.
    pub vendor_chunk: String,
    /// Also move every module under `node_modules` into the vendor chunk.
    pub split_node_modules: bool,
    /// Drop side-effect-free modules with no used export.
    pub tree_shaking: bool,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            runtime_chunk: "runtime".to_string(),
            vendor_chunk: "vendor".to_string(),
            split_node_modules: false,
            tree_shaking: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory of the persistent artifact cache. `None` keeps artifacts in
    /// memory only.
    pub dir: Option<PathBuf>,
    /// Build generations an unreferenced artifact survives.
    pub max_idle_generations: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            max_idle_generations: 5,
        }
    }
}

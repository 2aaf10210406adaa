//! Layered config loading.
//!
//! Layers, later ones winning:
//!
//! 1. built-in defaults
//! 2. `kiln.toml` in the project root
//! 3. `KILN_*` environment variables, with `__` separating nested keys
//!    (`KILN_OUTPUT__DIR=build`, `KILN_MODE=development`)

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};
use crate::validation::{ConfigValidator, SchemaValidator};

pub const CONFIG_FILE: &str = "kiln.toml";
pub const ENV_PREFIX: &str = "KILN_";

/// Finds and loads the configuration of one project.
///
/// ```no_run
/// use kiln_config::ConfigLoader;
///
/// let config = ConfigLoader::new(".").load().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    root: PathBuf,
    file: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Use an explicit config file instead of `<root>/kiln.toml`. Unlike the
    /// default file, an explicit one must exist.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// The config file that would be read, if it exists.
    pub fn find(&self) -> Option<PathBuf> {
        let path = self.config_path();
        path.is_file().then_some(path)
    }

    fn config_path(&self) -> PathBuf {
        match &self.file {
            Some(file) if file.is_absolute() => file.clone(),
            Some(file) => self.root.join(file),
            None => self.root.join(CONFIG_FILE),
        }
    }

    /// All layers merged, before extraction.
    pub fn figment(&self) -> Figment {
        Figment::from(Serialized::defaults(KilnConfig::default()))
            .merge(Toml::file(self.config_path()))
            .merge(Env::prefixed(&self.env_prefix).split("__"))
    }

    /// Load without validating.
    pub fn load_unchecked(&self) -> Result<KilnConfig> {
        if self.file.is_some() && self.find().is_none() {
            return Err(ConfigError::NotFound(self.config_path()));
        }
        let config: KilnConfig = self.figment().extract()?;
        tracing::debug!(
            root = %self.root.display(),
            file = self.find().is_some(),
            entries = config.entries.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Load and validate.
    pub fn load(&self) -> Result<KilnConfig> {
        let config = self.load_unchecked()?;
        SchemaValidator.validate(&config)?;
        Ok(config)
    }
}

/// Load the configuration of the current directory.
pub fn discover() -> Result<KilnConfig> {
    let root = std::env::current_dir()?;
    ConfigLoader::new(root).load()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_returns_none_without_file() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigLoader::new(dir.path()).find().is_none());
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = TempDir::new().unwrap();
        let err = ConfigLoader::new(dir.path())
            .file("custom.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(path) if path.ends_with("custom.toml")));
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("custom.toml"),
            "[entries]\nmain = \"./index.js\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new(dir.path())
            .env_prefix("KILN_UNIT_EXPLICIT_")
            .file("custom.toml")
            .load()
            .unwrap();
        assert_eq!(config.entries["main"], "./index.js");
    }
}

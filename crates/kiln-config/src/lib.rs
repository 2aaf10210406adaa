//! # kiln-config
//!
//! Build configuration for the kiln bundler: the serde model, layered loading
//! (defaults, `kiln.toml`, `KILN_*` environment) and schema validation.

pub mod config;
pub mod discovery;
pub mod error;
pub mod validation;

pub use config::{CacheConfig, KilnConfig, Mode, OptimizationConfig, OutputConfig, ResolveConfig};
pub use discovery::{CONFIG_FILE, ConfigLoader, ENV_PREFIX, discover};
pub use error::{ConfigError, Result};
pub use validation::{ConfigValidator, SchemaValidator};

//! Config validation.
//!
//! Only the shape of the configuration is checked here. Entry specifiers are
//! resolved (and fail) during the build, where the resolver knows the roots
//! and extensions.

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

/// A validation strategy.
pub trait ConfigValidator {
    fn validate(&self, config: &KilnConfig) -> Result<()>;
}

/// Schema-only validation (no filesystem checks).
///
/// ```
/// use kiln_config::{ConfigValidator, KilnConfig, SchemaValidator};
///
/// let config = KilnConfig::default().entry("app", "./src/index.js");
/// SchemaValidator.validate(&config).unwrap();
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &KilnConfig) -> Result<()> {
        if config.entries.is_empty() {
            return Err(ConfigError::NoEntries);
        }
        for (name, specifier) in &config.entries {
            if name.trim().is_empty() {
                return Err(ConfigError::schema(
                    "entry names cannot be empty",
                    "give every entry a name, e.g. app = \"./src/index.js\"",
                ));
            }
            if specifier.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("entries.{name}"),
                    hint: Some("the module specifier is empty".to_string()),
                });
            }
        }

        let output = &config.output;
        if output.dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output.dir".to_string(),
                hint: Some("use \".\" for the project root".to_string()),
            });
        }
        check_template("output.filename", &output.filename)?;
        if let Some(template) = &output.chunk_filename {
            check_template("output.chunk_filename", template)?;
        }
        if output.manifest.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output.manifest".to_string(),
                hint: None,
            });
        }

        for extension in &config.resolve.extensions {
            if extension.trim_start_matches('.').is_empty() {
                return Err(ConfigError::schema(
                    "resolve.extensions contains an empty extension",
                    "remove empty strings from resolve.extensions",
                ));
            }
        }

        let optimization = &config.optimization;
        if optimization.runtime_chunk.is_empty() || optimization.vendor_chunk.is_empty() {
            return Err(ConfigError::schema(
                "chunk ids cannot be empty",
                "set optimization.runtime_chunk and optimization.vendor_chunk",
            ));
        }
        if optimization.runtime_chunk == optimization.vendor_chunk {
            return Err(ConfigError::schema(
                "the runtime and vendor chunks need different ids",
                "rename optimization.vendor_chunk",
            ));
        }
        for reserved in [&optimization.runtime_chunk, &optimization.vendor_chunk] {
            if config.entries.contains_key(reserved) {
                return Err(ConfigError::schema(
                    format!("entry name '{reserved}' is reserved for a generated chunk"),
                    "rename the entry or the generated chunk under [optimization]",
                ));
            }
        }

        if config.workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "workers".to_string(),
                hint: Some("use at least 1 worker, or omit it to use every CPU".to_string()),
            });
        }

        Ok(())
    }
}

/// Brackets must be balanced; placeholder names are checked when the
/// template is compiled.
fn check_template(field: &str, template: &str) -> Result<()> {
    if template.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            hint: Some("the filename template is empty".to_string()),
        });
    }
    let mut open = false;
    for c in template.chars() {
        match (c, open) {
            ('[', false) => open = true,
            (']', true) => open = false,
            ('[', true) | (']', false) => {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    hint: Some(format!("unbalanced brackets in '{template}'")),
                });
            }
            _ => {}
        }
    }
    if open {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            hint: Some(format!("unclosed placeholder in '{template}'")),
        });
    }
    Ok(())
}

//! Loader capability and the extension lookup table.
//!
//! The graph builder never interprets file contents itself. It hands the raw
//! bytes to the [`AssetPipeline`], which dispatches on the file extension to a
//! registered [`Loader`]. Loaders for styles, images or data files live
//! outside this crate; only the [`script::ScriptLoader`] is built in.

pub mod script;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::module::{DependencyKind, Export, ImportedBindings};
use crate::module_id::ModuleId;

/// Build mode, mirrored into `process.env.NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Production,
    Development,
}

impl BuildMode {
    /// Value of `process.env.NODE_ENV` for this mode.
    pub fn node_env(self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.node_env())
    }
}

/// What a loader knows about the module it is transforming.
#[derive(Debug, Clone, Copy)]
pub struct LoadContext<'a> {
    pub module: &'a ModuleId,
    pub mode: BuildMode,
}

/// A dependency declared by a loader, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyDecl {
    pub specifier: String,
    pub kind: DependencyKind,
    pub bindings: ImportedBindings,
    pub chunk_name: Option<String>,
}

impl DependencyDecl {
    pub fn new(specifier: impl Into<String>, kind: DependencyKind, bindings: ImportedBindings) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
            bindings,
            chunk_name: None,
        }
    }
}

/// Output of a loader.
#[derive(Debug, Clone, Default)]
pub struct LoadedModule {
    /// Normalized source.
    pub source: String,
    /// Dependencies in source order.
    pub dependencies: Vec<DependencyDecl>,
    pub exports: Vec<Export>,
    /// `Some` when the loader knows; otherwise the nearest package.json decides.
    pub side_effect_free: Option<bool>,
}

/// A format-specific transform capability.
#[async_trait]
pub trait Loader: Send + Sync + fmt::Debug {
    /// Short name used in error messages.
    fn name(&self) -> &str;

    async fn transform(
        &self,
        bytes: &[u8],
        extension: &str,
        ctx: &LoadContext<'_>,
    ) -> Result<LoadedModule, TransformError>;
}

/// Extension → loader table.
#[derive(Debug, Clone, Default)]
pub struct AssetPipeline {
    loaders: FxHashMap<String, Arc<dyn Loader>>,
}

fn normalize(extension: &str) -> String {
    extension.trim_start_matches('.').to_ascii_lowercase()
}

impl AssetPipeline {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with the built-in script loader registered for `js`, `mjs`,
    /// `cjs` and `jsx`.
    pub fn with_defaults() -> Self {
        let script: Arc<dyn Loader> = Arc::new(script::ScriptLoader::new());
        let mut pipeline = Self::new();
        for ext in script::SCRIPT_EXTENSIONS {
            pipeline.register(ext, Arc::clone(&script));
        }
        pipeline
    }

    /// Register `loader` for `extension`, replacing any previous loader.
    pub fn register(&mut self, extension: &str, loader: Arc<dyn Loader>) -> &mut Self {
        self.loaders.insert(normalize(extension), loader);
        self
    }

    pub fn with_loader(mut self, extension: &str, loader: Arc<dyn Loader>) -> Self {
        self.register(extension, loader);
        self
    }

    pub fn loader_for(&self, extension: &str) -> Option<&Arc<dyn Loader>> {
        self.loaders.get(&normalize(extension))
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    /// Dispatch `bytes` to the loader registered for `extension`.
    pub async fn transform(
        &self,
        bytes: &[u8],
        extension: &str,
        ctx: &LoadContext<'_>,
    ) -> Result<LoadedModule, TransformError> {
        let loader = self
            .loader_for(extension)
            .ok_or_else(|| TransformError::NoLoader {
                extension: normalize(extension),
            })?;

        tracing::trace!(module = %ctx.module, loader = loader.name(), "transform");
        loader.transform(bytes, &normalize(extension), ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct UpperLoader;

    #[async_trait]
    impl Loader for UpperLoader {
        fn name(&self) -> &str {
            "upper"
        }

        async fn transform(
            &self,
            bytes: &[u8],
            _extension: &str,
            _ctx: &LoadContext<'_>,
        ) -> Result<LoadedModule, TransformError> {
            let text = std::str::from_utf8(bytes).map_err(|_| TransformError::InvalidUtf8)?;
            Ok(LoadedModule {
                source: format!("export default {:?};", text.to_uppercase()),
                exports: vec![Export::local("default")],
                side_effect_free: Some(true),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn dispatches_by_extension() {
        let pipeline = AssetPipeline::with_defaults().with_loader(".TXT", Arc::new(UpperLoader));
        let id = ModuleId::new("/p/readme.txt").unwrap();
        let ctx = LoadContext {
            module: &id,
            mode: BuildMode::Production,
        };

        let loaded = pipeline.transform(b"hi", "txt", &ctx).await.unwrap();
        assert_eq!(loaded.source, "export default \"HI\";");
        assert_eq!(loaded.side_effect_free, Some(true));
        assert!(pipeline.loader_for("mjs").is_some());
    }

    #[tokio::test]
    async fn unknown_extension_has_no_loader() {
        let pipeline = AssetPipeline::with_defaults();
        let id = ModuleId::new("/p/style.css").unwrap();
        let ctx = LoadContext {
            module: &id,
            mode: BuildMode::Development,
        };

        let err = pipeline.transform(b"a{}", "css", &ctx).await.unwrap_err();
        assert_eq!(
            err,
            TransformError::NoLoader {
                extension: "css".into()
            }
        );
    }
}

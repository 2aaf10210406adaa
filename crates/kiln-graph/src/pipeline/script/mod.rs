//! Built-in loader for JavaScript sources.

pub(crate) mod parse;
mod prune;
pub(crate) mod scan;

use async_trait::async_trait;
use oxc_allocator::Allocator;

pub use prune::strip_unused_exports;

use super::{LoadContext, LoadedModule, Loader};
use crate::error::TransformError;
use crate::tree_shaker::guards;

/// Extensions the script loader is registered for by
/// [`AssetPipeline::with_defaults`](super::AssetPipeline::with_defaults).
pub const SCRIPT_EXTENSIONS: [&str; 4] = ["js", "mjs", "cjs", "jsx"];

/// Loader for ES modules and CommonJS scripts.
///
/// Normalizes line endings, parses the module, strips environment-guarded
/// blocks that are dead in production, and extracts imports and exports
/// from the syntax tree. The source itself is otherwise passed through.
/// JSX is accepted in every extension but `.cjs`, which parses as a script.
#[derive(Debug, Clone, Default)]
pub struct ScriptLoader;

impl ScriptLoader {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core of [`Loader::transform`].
    pub fn load(&self, text: &str, ctx: &LoadContext<'_>) -> Result<LoadedModule, TransformError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let normalized = if text.contains('\r') {
            text.replace("\r\n", "\n")
        } else {
            text.to_string()
        };

        let source_type = parse::source_type(ctx.module.extension());
        let source = if ctx.mode.is_production() {
            guards::eliminate_dead_branches(&normalized, source_type, ctx.mode)?
        } else {
            normalized
        };

        let found = {
            let allocator = Allocator::default();
            let program = parse::parse(&allocator, &source, source_type)?;
            scan::scan(&program, &source)
        };

        Ok(LoadedModule {
            source,
            dependencies: found.dependencies,
            exports: found.exports,
            side_effect_free: None,
        })
    }
}

#[async_trait]
impl Loader for ScriptLoader {
    fn name(&self) -> &str {
        "script"
    }

    async fn transform(
        &self,
        bytes: &[u8],
        _extension: &str,
        ctx: &LoadContext<'_>,
    ) -> Result<LoadedModule, TransformError> {
        let text = std::str::from_utf8(bytes).map_err(|_| TransformError::InvalidUtf8)?;
        self.load(text, ctx)
    }
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::module_id::ModuleId;

/// How a dependency is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// `import x from "./x"`: available before the importer runs.
    Static,
    /// `import("./x")`: loaded on demand.
    Dynamic,
}

/// Bindings an importer consumes from its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportedBindings {
    /// Every export (namespace imports, dynamic imports, `require`).
    All,
    /// The listed export names. An empty list is a side-effect-only import.
    Named(Vec<String>),
}

impl ImportedBindings {
    /// `import "./polyfill"`.
    pub fn side_effect_only() -> Self {
        Self::Named(Vec::new())
    }

    pub fn is_side_effect_only(&self) -> bool {
        matches!(self, Self::Named(names) if names.is_empty())
    }

    /// Union of two binding sets.
    pub fn merge(&mut self, other: &ImportedBindings) {
        match (&mut *self, other) {
            (Self::All, _) => {}
            (_, Self::All) => *self = Self::All,
            (Self::Named(names), Self::Named(more)) => {
                for name in more {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
    }
}

/// A dependency edge from `source` to the module named by `specifier`.
///
/// `target` is `None` until the specifier is resolved; edges stored in a
/// built graph are always resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: ModuleId,
    pub specifier: String,
    pub target: Option<ModuleId>,
    pub kind: DependencyKind,
    pub bindings: ImportedBindings,
    /// Name hint from a `webpackChunkName` magic comment.
    pub chunk_name: Option<String>,
}

impl DependencyEdge {
    pub fn is_static(&self) -> bool {
        self.kind == DependencyKind::Static
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == DependencyKind::Dynamic
    }
}

/// How an export binding is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportKind {
    /// Declared in this module.
    Local,
    /// `export { imported as name } from "specifier"`. `imported` is `*` for
    /// `export * as name from "specifier"`.
    ReExport { specifier: String, imported: String },
    /// `export * from "specifier"`.
    Star { specifier: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    /// Exported name; `*` for star re-exports.
    pub name: String,
    pub kind: ExportKind,
}

impl Export {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExportKind::Local,
        }
    }

    pub fn re_export(
        name: impl Into<String>,
        specifier: impl Into<String>,
        imported: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ExportKind::ReExport {
                specifier: specifier.into(),
                imported: imported.into(),
            },
        }
    }

    pub fn star(specifier: impl Into<String>) -> Self {
        Self {
            name: "*".to_string(),
            kind: ExportKind::Star {
                specifier: specifier.into(),
            },
        }
    }

    pub fn is_star(&self) -> bool {
        matches!(self.kind, ExportKind::Star { .. })
    }
}

/// A compiled module.
///
/// Dependency and export lists are wrapped in `Arc` so modules can be handed
/// out of the graph cheaply.
#[derive(Debug, Clone)]
pub struct Module {
    pub id: ModuleId,
    /// Normalized source produced by the loader.
    pub source: Arc<str>,
    pub dependencies: Arc<Vec<DependencyEdge>>,
    pub exports: Arc<Vec<Export>>,
    pub side_effect_free: bool,
    /// BLAKE3 of `source`.
    pub content_hash: ContentHash,
    pub is_entry: bool,
}

impl Module {
    pub fn builder(id: ModuleId, source: impl Into<Arc<str>>) -> ModuleBuilder {
        ModuleBuilder {
            id,
            source: source.into(),
            dependencies: Vec::new(),
            exports: Vec::new(),
            side_effect_free: false,
            is_entry: false,
        }
    }

    pub fn static_dependencies(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.dependencies.iter().filter(|edge| edge.is_static())
    }

    pub fn dynamic_dependencies(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.dependencies.iter().filter(|edge| edge.is_dynamic())
    }

    /// Resolved target of the first edge with the given specifier.
    pub fn target_of(&self, specifier: &str) -> Option<&ModuleId> {
        self.dependencies
            .iter()
            .find(|edge| edge.specifier == specifier)
            .and_then(|edge| edge.target.as_ref())
    }

    /// Named (non-star) export declaration.
    pub fn find_export(&self, name: &str) -> Option<&Export> {
        self.exports
            .iter()
            .find(|export| !export.is_star() && export.name == name)
    }

    pub fn star_exports(&self) -> impl Iterator<Item = &str> {
        self.exports.iter().filter_map(|export| match &export.kind {
            ExportKind::Star { specifier } => Some(specifier.as_str()),
            _ => None,
        })
    }

    /// Names of all non-star exports in declaration order.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports
            .iter()
            .filter(|export| !export.is_star())
            .map(|export| export.name.as_str())
    }

    /// Same code and same outgoing edges.
    pub fn same_shape(&self, other: &Module) -> bool {
        self.content_hash == other.content_hash && self.dependencies == other.dependencies
    }
}

/// Builder for [`Module`]; the content hash is computed in [`ModuleBuilder::build`].
#[derive(Debug)]
pub struct ModuleBuilder {
    id: ModuleId,
    source: Arc<str>,
    dependencies: Vec<DependencyEdge>,
    exports: Vec<Export>,
    side_effect_free: bool,
    is_entry: bool,
}

impl ModuleBuilder {
    pub fn dependencies(mut self, dependencies: Vec<DependencyEdge>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Add a resolved edge.
    pub fn dependency(
        mut self,
        target: ModuleId,
        specifier: impl Into<String>,
        kind: DependencyKind,
        bindings: ImportedBindings,
    ) -> Self {
        self.dependencies.push(DependencyEdge {
            source: self.id.clone(),
            specifier: specifier.into(),
            target: Some(target),
            kind,
            bindings,
            chunk_name: None,
        });
        self
    }

    pub fn exports(mut self, exports: Vec<Export>) -> Self {
        self.exports = exports;
        self
    }

    pub fn export(mut self, export: Export) -> Self {
        self.exports.push(export);
        self
    }

    pub fn side_effect_free(mut self, side_effect_free: bool) -> Self {
        self.side_effect_free = side_effect_free;
        self
    }

    pub fn entry(mut self, is_entry: bool) -> Self {
        self.is_entry = is_entry;
        self
    }

    pub fn build(self) -> Module {
        Module {
            content_hash: ContentHash::of(self.source.as_bytes()),
            id: self.id,
            source: self.source,
            dependencies: Arc::new(self.dependencies),
            exports: Arc::new(self.exports),
            side_effect_free: self.side_effect_free,
            is_entry: self.is_entry,
        }
    }
}

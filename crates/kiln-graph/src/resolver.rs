//! Module resolution.
//!
//! Maps an import specifier to a [`ModuleId`]. Candidates are probed through
//! the [`Runtime`] in a fixed order and the first existing file wins:
//!
//! 1. the exact path
//! 2. the path with each configured extension appended
//! 3. the `main` field of a directory's `package.json`
//! 4. `index` plus each configured extension inside the directory
//!
//! Relative specifiers are resolved against the importer's directory,
//! absolute ones are used as is and bare ones are searched under each root
//! directory (`node_modules` by default).

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use path_clean::PathClean;

use crate::error::ResolutionError;
use crate::module_id::ModuleId;
use crate::package_json::PackageJson;
use crate::runtime::Runtime;

/// Resolution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Extensions tried in order, each with a leading dot.
    pub extensions: Vec<String>,
    /// Directories searched for bare specifiers. Relative roots are joined to
    /// the working directory.
    pub roots: Vec<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".mjs".into(), ".js".into(), ".jsx".into(), ".cjs".into()],
            roots: vec![PathBuf::from("node_modules")],
        }
    }
}

impl ResolverConfig {
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        self
    }

    pub fn roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }
}

fn normalize_extension(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

/// Split `./logo.svg?raw` into the request and its query.
pub fn split_query(specifier: &str) -> (&str, Option<&str>) {
    match specifier.split_once('?') {
        Some((request, query)) => (request, Some(query)),
        None => (specifier, None),
    }
}

fn is_relative(request: &str) -> bool {
    request == "."
        || request == ".."
        || request.starts_with("./")
        || request.starts_with("../")
}

#[derive(Debug, Clone)]
pub struct ModuleResolver {
    config: ResolverConfig,
    cwd: PathBuf,
}

impl ModuleResolver {
    pub fn new(config: ResolverConfig, cwd: impl Into<PathBuf>) -> Self {
        Self {
            config,
            cwd: cwd.into(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Resolve `specifier` as imported from `importer` (`None` for entries,
    /// which resolve against the working directory).
    pub async fn resolve(
        &self,
        specifier: &str,
        importer: Option<&ModuleId>,
        runtime: &dyn Runtime,
    ) -> Result<ModuleId, ResolutionError> {
        let (request, query) = split_query(specifier);
        let mut tried = Vec::new();

        for base in self.candidate_bases(request, importer) {
            if let Some(found) = self.probe(&base, runtime, &mut tried).await {
                tracing::trace!(specifier, resolved = %found.display(), "resolved");
                return ModuleId::with_query(found, query.map(str::to_string)).map_err(|_| {
                    ResolutionError {
                        specifier: specifier.to_string(),
                        importer: importer.cloned(),
                        tried: tried.clone(),
                    }
                });
            }
        }

        Err(ResolutionError {
            specifier: specifier.to_string(),
            importer: importer.cloned(),
            tried,
        })
    }

    fn candidate_bases(&self, request: &str, importer: Option<&ModuleId>) -> Vec<PathBuf> {
        if request.is_empty() {
            return Vec::new();
        }
        if is_relative(request) {
            let dir = importer.map_or(self.cwd.as_path(), ModuleId::dir);
            return vec![dir.join(request).clean()];
        }
        if Path::new(request).is_absolute() {
            return vec![PathBuf::from(request).clean()];
        }

        self.config
            .roots
            .iter()
            .map(|root| {
                let root = if root.is_absolute() {
                    root.clone()
                } else {
                    self.cwd.join(root)
                };
                root.join(request).clean()
            })
            .collect()
    }

    /// Probe one base path in resolution order.
    async fn probe(
        &self,
        base: &Path,
        runtime: &dyn Runtime,
        tried: &mut Vec<PathBuf>,
    ) -> Option<PathBuf> {
        if let Some(found) = self.probe_file(base, runtime, tried).await {
            return Some(found);
        }

        if !runtime.is_dir(base).await {
            return None;
        }

        if let Some(package) = PackageJson::load(runtime, base).await {
            if let Some(main) = package.main.as_deref().filter(|main| !main.is_empty()) {
                let main = base.join(main).clean();
                if let Some(found) = self.probe_file(&main, runtime, tried).await {
                    return Some(found);
                }
                if let Some(found) = self.probe_index(&main, runtime, tried).await {
                    return Some(found);
                }
            }
        }

        self.probe_index(base, runtime, tried).await
    }

    /// The exact path, then the path with each extension appended.
    async fn probe_file(
        &self,
        path: &Path,
        runtime: &dyn Runtime,
        tried: &mut Vec<PathBuf>,
    ) -> Option<PathBuf> {
        tried.push(path.to_path_buf());
        if runtime.is_file(path).await {
            return Some(path.to_path_buf());
        }

        for ext in &self.config.extensions {
            let mut with_ext = OsString::from(path.as_os_str());
            with_ext.push(ext);
            let candidate = PathBuf::from(with_ext);
            tried.push(candidate.clone());
            if runtime.is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    async fn probe_index(
        &self,
        dir: &Path,
        runtime: &dyn Runtime,
        tried: &mut Vec<PathBuf>,
    ) -> Option<PathBuf> {
        for ext in &self.config.extensions {
            let candidate = dir.join(format!("index{ext}"));
            tried.push(candidate.clone());
            if runtime.is_file(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::memory::MemoryRuntime;

    fn resolver() -> ModuleResolver {
        ModuleResolver::new(
            ResolverConfig::default().extensions([".js", "mjs"]),
            "/project",
        )
    }

    fn importer(path: &str) -> ModuleId {
        ModuleId::new(path).unwrap()
    }

    #[tokio::test]
    async fn exact_file_before_extensions() {
        let runtime = MemoryRuntime::new("/project")
            .with_file("src/util", "")
            .with_file("src/util.js", "");

        let id = resolver()
            .resolve("./util", Some(&importer("/project/src/a.js")), &runtime)
            .await
            .unwrap();
        assert_eq!(id.as_path(), Path::new("/project/src/util"));
    }

    #[tokio::test]
    async fn extensions_in_configured_order() {
        let runtime = MemoryRuntime::new("/project")
            .with_file("src/util.mjs", "")
            .with_file("src/util.js", "");

        let id = resolver()
            .resolve("./util", Some(&importer("/project/src/a.js")), &runtime)
            .await
            .unwrap();
        assert_eq!(id.as_path(), Path::new("/project/src/util.js"));
    }

    #[tokio::test]
    async fn package_main_before_index() {
        let runtime = MemoryRuntime::new("/project")
            .with_file("node_modules/lodash/package.json", r#"{"main": "lodash.js"}"#)
            .with_file("node_modules/lodash/lodash.js", "")
            .with_file("node_modules/lodash/index.js", "");

        let id = resolver()
            .resolve("lodash", Some(&importer("/project/src/a.js")), &runtime)
            .await
            .unwrap();
        assert_eq!(id.as_path(), Path::new("/project/node_modules/lodash/lodash.js"));
    }

    #[tokio::test]
    async fn directory_index_fallback() {
        let runtime = MemoryRuntime::new("/project").with_file("src/components/index.js", "");

        let id = resolver()
            .resolve("./components", Some(&importer("/project/src/a.js")), &runtime)
            .await
            .unwrap();
        assert_eq!(id.as_path(), Path::new("/project/src/components/index.js"));
    }

    #[tokio::test]
    async fn roots_searched_in_order() {
        let resolver = ModuleResolver::new(
            ResolverConfig::default()
                .extensions([".js"])
                .roots(["node_modules", "src"]),
            "/project",
        );
        let runtime = MemoryRuntime::new("/project")
            .with_file("src/print.js", "")
            .with_file("node_modules/print.js", "");

        let id = resolver.resolve("print", None, &runtime).await.unwrap();
        assert_eq!(id.as_path(), Path::new("/project/node_modules/print.js"));

        runtime.remove("node_modules/print.js");
        let id = resolver.resolve("print", None, &runtime).await.unwrap();
        assert_eq!(id.as_path(), Path::new("/project/src/print.js"));
    }

    #[tokio::test]
    async fn query_is_carried_onto_identity() {
        let runtime = MemoryRuntime::new("/project").with_file("src/data.js", "");

        let id = resolver()
            .resolve("./src/data?raw", None, &runtime)
            .await
            .unwrap();
        assert_eq!(id.as_path(), Path::new("/project/src/data.js"));
        assert_eq!(id.query(), Some("raw"));
    }

    #[tokio::test]
    async fn failure_lists_every_candidate() {
        let runtime = MemoryRuntime::new("/project");

        let err = resolver()
            .resolve("./missing", Some(&importer("/project/src/a.js")), &runtime)
            .await
            .unwrap_err();
        assert_eq!(err.specifier, "./missing");
        assert_eq!(
            err.tried,
            vec![
                PathBuf::from("/project/src/missing"),
                PathBuf::from("/project/src/missing.js"),
                PathBuf::from("/project/src/missing.mjs"),
            ]
        );
    }
}

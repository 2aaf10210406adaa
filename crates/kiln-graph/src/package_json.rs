//! `package.json` fields that affect resolution and tree shaking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use rustc_hash::FxBuildHasher;
use serde::Deserialize;

use crate::module_id::ModuleId;
use crate::runtime::Runtime;

/// Maximum accepted package.json size (10MB)
const MAX_PACKAGE_JSON_SIZE: u64 = 10 * 1024 * 1024;

/// The subset of package.json the bundler reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    pub name: Option<String>,
    pub main: Option<String>,
    #[serde(default, rename = "sideEffects")]
    pub side_effects: Option<SideEffects>,
    /// Directory containing the file.
    #[serde(skip)]
    pub dir: PathBuf,
}

/// The `sideEffects` field: a flag, or the file patterns that keep effects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SideEffects {
    Flag(bool),
    Patterns(Vec<String>),
}

impl PackageJson {
    /// Load and parse `dir/package.json`. Returns `None` when the file is
    /// missing, too large or not valid JSON.
    pub async fn load(runtime: &dyn Runtime, dir: &Path) -> Option<Self> {
        let path = dir.join("package.json");
        let meta = runtime.metadata(&path).await.ok()?;
        if !meta.is_file || meta.size > MAX_PACKAGE_JSON_SIZE {
            return None;
        }

        let bytes = runtime.read_file(&path).await.ok()?;
        match serde_json::from_slice::<PackageJson>(&bytes) {
            Ok(mut package) => {
                package.dir = dir.to_path_buf();
                Some(package)
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "ignoring malformed package.json");
                None
            }
        }
    }

    /// Whether `path` (inside this package) is free of side effects.
    pub fn is_side_effect_free(&self, path: &Path) -> bool {
        match &self.side_effects {
            None | Some(SideEffects::Flag(true)) => false,
            Some(SideEffects::Flag(false)) => true,
            Some(SideEffects::Patterns(patterns)) => {
                let relative = path.strip_prefix(&self.dir).unwrap_or(path);
                let relative = relative.to_string_lossy().replace('\\', "/");
                !patterns.iter().any(|pattern| matches_pattern(pattern, &relative))
            }
        }
    }
}

/// Match a `sideEffects` glob against a package-relative path. Patterns
/// without a `/` match the file name anywhere in the package.
fn matches_pattern(pattern: &str, relative: &str) -> bool {
    let pattern = pattern.trim_start_matches("./");
    let (pattern, subject) = if pattern.contains('/') {
        (pattern.to_string(), relative)
    } else {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        (pattern.to_string(), name)
    };

    match glob_to_regex(&pattern) {
        Ok(regex) => regex.is_match(subject),
        Err(_) => false,
    }
}

fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out)
}

/// Per-directory cache of the nearest package.json, shared by the builder's
/// concurrent compile tasks.
#[derive(Debug, Default)]
pub struct PackageScopes {
    by_dir: DashMap<PathBuf, Option<Arc<PackageJson>>, FxBuildHasher>,
}

impl PackageScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nearest package.json at or above `dir`.
    pub async fn nearest(&self, runtime: &dyn Runtime, dir: &Path) -> Option<Arc<PackageJson>> {
        let mut visited = Vec::new();
        let mut found = None;

        for candidate in dir.ancestors() {
            if let Some(cached) = self.by_dir.get(candidate) {
                found = cached.clone();
                break;
            }
            visited.push(candidate.to_path_buf());
            if let Some(package) = PackageJson::load(runtime, candidate).await {
                found = Some(Arc::new(package));
                break;
            }
        }

        for dir in visited {
            self.by_dir.insert(dir, found.clone());
        }
        found
    }

    /// Side-effect flag for `module` from the nearest package.json.
    pub async fn side_effect_free(&self, runtime: &dyn Runtime, module: &ModuleId) -> bool {
        match self.nearest(runtime, module.dir()).await {
            Some(package) => package.is_side_effect_free(module.as_path()),
            None => false,
        }
    }

    pub fn clear(&self) {
        self.by_dir.clear();
    }
}

//! Shared test utilities for kiln-bundler tests
//!
//! Projects live in an in-memory runtime rooted at `/p`; builds write to
//! `/p/dist`.

#![allow(dead_code)]

use std::sync::Arc;

use kiln_bundler::{BuildOutput, Bundler, MemoryRuntime};
use kiln_config::KilnConfig;

pub const ROOT: &str = "/p";
pub const DIST: &str = "/p/dist";

pub fn project(files: &[(&str, &str)]) -> MemoryRuntime {
    let runtime = MemoryRuntime::new(ROOT);
    for (path, content) in files {
        runtime.insert(path, content);
    }
    runtime
}

/// Entries `app` (`src/a.js`) and `print` (`src/b.js`) share `src/shared.js`;
/// `app` lazily imports `src/extra.js`.
pub fn two_entry_app() -> MemoryRuntime {
    project(&[
        (
            "src/a.js",
            "import { greet } from \"./shared.js\";\nimport(\"./extra.js\").then((m) => m.extra());\ngreet(\"a\");\n",
        ),
        (
            "src/b.js",
            "import { greet } from \"./shared.js\";\ngreet(\"b\");\n",
        ),
        (
            "src/shared.js",
            "export function greet(name) {\n  return `hello ${name}`;\n}\n",
        ),
        ("src/extra.js", "export function extra() {}\n"),
    ])
}

pub fn two_entry_config() -> KilnConfig {
    KilnConfig::default()
        .entry("app", "./src/a.js")
        .entry("print", "./src/b.js")
}

pub fn bundler(runtime: &MemoryRuntime, config: KilnConfig) -> Bundler {
    Bundler::new(config, Arc::new(runtime.clone())).unwrap()
}

/// Chunk ids in manifest order.
pub fn chunk_ids(output: &BuildOutput) -> Vec<String> {
    output.manifest.chunks.keys().cloned().collect()
}

pub fn chunk_modules(output: &BuildOutput, chunk: &str) -> Vec<String> {
    output
        .manifest
        .chunks
        .get(chunk)
        .map(|chunk| chunk.modules.clone())
        .unwrap_or_default()
}

/// Chunk id → content hash, in manifest order.
pub fn chunk_hashes(output: &BuildOutput) -> Vec<(String, String)> {
    output
        .manifest
        .chunks
        .iter()
        .map(|(id, chunk)| (id.clone(), chunk.hash.clone()))
        .collect()
}

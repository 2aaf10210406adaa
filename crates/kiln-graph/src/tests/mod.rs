//! Whole-crate tests against the in-memory runtime.

mod builder_tests;

use std::sync::Arc;

use crate::{
    AssetPipeline, BuildMode, CancellationToken, EntryPoint, GraphBuilder, MemoryRuntime,
    ModuleGraph, ModuleId, ModuleResolver, ResolverConfig, Result,
};

pub(crate) fn project(files: &[(&str, &str)]) -> MemoryRuntime {
    let runtime = MemoryRuntime::new("/p");
    for (path, content) in files {
        runtime.insert(path, content);
    }
    runtime
}

pub(crate) fn builder(runtime: &MemoryRuntime) -> GraphBuilder {
    GraphBuilder::new(
        Arc::new(runtime.clone()),
        Arc::new(ModuleResolver::new(ResolverConfig::default(), "/p")),
        Arc::new(AssetPipeline::with_defaults()),
    )
}

pub(crate) fn id(path: &str) -> ModuleId {
    ModuleId::new(path).unwrap()
}

pub(crate) fn entries(list: &[(&str, &str)]) -> Vec<EntryPoint> {
    list.iter()
        .map(|(name, specifier)| EntryPoint::new(*name, *specifier))
        .collect()
}

pub(crate) async fn build(runtime: &MemoryRuntime, list: &[(&str, &str)]) -> Result<ModuleGraph> {
    builder(runtime)
        .build(&entries(list), &CancellationToken::never())
        .await
}

pub(crate) async fn build_in(
    runtime: &MemoryRuntime,
    mode: BuildMode,
    list: &[(&str, &str)],
) -> Result<ModuleGraph> {
    builder(runtime)
        .mode(mode)
        .build(&entries(list), &CancellationToken::never())
        .await
}

/// Two entries sharing one module, one of them with a lazy import.
pub(crate) fn two_entry_app() -> MemoryRuntime {
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

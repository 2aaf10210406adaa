//! GraphBuilder behavior: discovery order, cycles, failures, rebuilds.

use super::*;
use crate::{CancellationSource, DependencyKind, GraphError, ImportedBindings, RebuildOutcome};

#[tokio::test]
async fn builds_two_entry_graph_in_discovery_order() {
    let runtime = two_entry_app();
    let graph = build(&runtime, &[("app", "./src/a.js"), ("print", "./src/b.js")])
        .await
        .unwrap();

    assert_eq!(
        graph.module_ids(),
        vec![
            id("/p/src/a.js"),
            id("/p/src/b.js"),
            id("/p/src/shared.js"),
            id("/p/src/extra.js"),
        ]
    );
    assert_eq!(
        graph.entries(),
        vec![
            ("app".to_string(), id("/p/src/a.js")),
            ("print".to_string(), id("/p/src/b.js")),
        ]
    );

    let edges = graph.dependencies(&id("/p/src/a.js"));
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0].kind, DependencyKind::Static);
    assert_eq!(
        edges[0].bindings,
        ImportedBindings::Named(vec!["greet".to_string()])
    );
    assert_eq!(edges[1].kind, DependencyKind::Dynamic);
    assert_eq!(edges[1].target, Some(id("/p/src/extra.js")));

    assert_eq!(
        graph.dependents(&id("/p/src/shared.js")),
        vec![id("/p/src/a.js"), id("/p/src/b.js")]
    );
    // Dynamic edges are not part of the static dependent index.
    assert!(graph.dependents(&id("/p/src/extra.js")).is_empty());

    let a = graph.module(&id("/p/src/a.js")).unwrap();
    assert!(a.is_entry);
    assert!(!graph.module(&id("/p/src/shared.js")).unwrap().is_entry);
}

#[tokio::test]
async fn cycles_are_recorded_once() {
    let runtime = project(&[
        ("src/x.js", "import { y } from './y.js';\nexport const x = () => y;\n"),
        ("src/y.js", "import { x } from './x.js';\nexport const y = () => x;\n"),
    ]);
    let graph = build(&runtime, &[("main", "./src/x.js")]).await.unwrap();

    assert_eq!(graph.len(), 2);
    assert_eq!(graph.dependents(&id("/p/src/x.js")), vec![id("/p/src/y.js")]);
    assert_eq!(graph.dependents(&id("/p/src/y.js")), vec![id("/p/src/x.js")]);
    graph.validate().unwrap();
}

#[tokio::test]
async fn unresolvable_import_aborts_build() {
    let runtime = project(&[("src/a.js", "import './missing';\n")]);
    let err = build(&runtime, &[("main", "./src/a.js")]).await.unwrap_err();

    match err {
        GraphError::Resolution(err) => {
            assert_eq!(err.specifier, "./missing");
            assert_eq!(err.importer, Some(id("/p/src/a.js")));
            assert!(err.tried.contains(&"/p/src/missing.js".into()));
        }
        other => panic!("expected resolution error, got {other:?}"),
    }
}

#[tokio::test]
async fn unresolvable_entry_aborts_build() {
    let runtime = project(&[]);
    let err = build(&runtime, &[("main", "./src/nope.js")]).await.unwrap_err();
    assert!(matches!(err, GraphError::Resolution(ref e) if e.importer.is_none()));
}

#[tokio::test]
async fn parse_error_names_the_module() {
    let runtime = project(&[
        ("src/a.js", "import './bad.js';\n"),
        ("src/bad.js", "export const list = [1, 2;\n"),
    ]);
    let err = build(&runtime, &[("main", "./src/a.js")]).await.unwrap_err();

    match err {
        GraphError::Parse { module, source } => {
            assert_eq!(module, id("/p/src/bad.js"));
            assert_eq!(source.line, 1);
        }
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_extension_is_a_transform_error() {
    let runtime = project(&[
        ("src/a.js", "import './style.css';\n"),
        ("src/style.css", "body {}\n"),
    ]);
    let err = build(&runtime, &[("main", "./src/a.js")]).await.unwrap_err();
    assert!(matches!(err, GraphError::Transform { ref module, .. } if *module == id("/p/src/style.css")));
}

#[tokio::test]
async fn requires_an_entry() {
    let runtime = project(&[]);
    let err = build(&runtime, &[]).await.unwrap_err();
    assert!(matches!(err, GraphError::NoEntries));
}

#[tokio::test]
async fn duplicate_entry_names_are_rejected() {
    let runtime = two_entry_app();
    let err = build(&runtime, &[("app", "./src/a.js"), ("app", "./src/b.js")])
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::DuplicateEntry(ref name) if name == "app"));
}

#[tokio::test]
async fn cancelled_token_stops_the_build() {
    let runtime = two_entry_app();
    let source = CancellationSource::new();
    let token = source.next_token();
    source.next_token();

    let err = builder(&runtime)
        .build(&entries(&[("app", "./src/a.js")]), &token)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn discovery_order_does_not_depend_on_concurrency() {
    let mut files = vec![(
        "src/index.js".to_string(),
        (0..24)
            .map(|i| format!("import './m{i}.js';\n"))
            .collect::<String>(),
    )];
    for i in 0..24 {
        files.push((
            format!("src/m{i}.js"),
            format!("import './leaf{}.js';\nexport const m{i} = {i};\n", i % 5),
        ));
    }
    for i in 0..5 {
        files.push((format!("src/leaf{i}.js"), format!("export const leaf = {i};\n")));
    }
    let borrowed: Vec<(&str, &str)> = files
        .iter()
        .map(|(path, content)| (path.as_str(), content.as_str()))
        .collect();
    let runtime = project(&borrowed);
    let list = entries(&[("main", "./src/index.js")]);

    let serial = builder(&runtime)
        .concurrency(1)
        .build(&list, &CancellationToken::never())
        .await
        .unwrap();
    let parallel = builder(&runtime)
        .concurrency(16)
        .build(&list, &CancellationToken::never())
        .await
        .unwrap();

    assert_eq!(serial.len(), 30);
    assert_eq!(serial.module_ids(), parallel.module_ids());
}

#[tokio::test]
async fn package_side_effects_flag_is_applied() {
    let runtime = project(&[
        ("src/a.js", "import { pick } from 'lib';\npick();\n"),
        (
            "node_modules/lib/package.json",
            r#"{ "name": "lib", "main": "main.js", "sideEffects": false }"#,
        ),
        ("node_modules/lib/main.js", "export function pick() {}\n"),
    ]);
    let graph = build(&runtime, &[("main", "./src/a.js")]).await.unwrap();

    let lib = graph.module(&id("/p/node_modules/lib/main.js")).unwrap();
    assert!(lib.side_effect_free);
    assert!(!graph.module(&id("/p/src/a.js")).unwrap().side_effect_free);
}

#[tokio::test]
async fn production_builds_skip_development_only_imports() {
    let runtime = project(&[(
        "src/a.js",
        "if (process.env.NODE_ENV !== 'production') {\n  import('./devtools.js');\n}\nexport const a = 1;\n",
    )]);

    let prod = build_in(&runtime, BuildMode::Production, &[("main", "./src/a.js")])
        .await
        .unwrap();
    assert_eq!(prod.len(), 1);

    // The dev build needs the file.
    runtime.insert("src/devtools.js", "export const tools = true;\n");
    let dev = build_in(&runtime, BuildMode::Development, &[("main", "./src/a.js")])
        .await
        .unwrap();
    assert!(dev.contains(&id("/p/src/devtools.js")));
}

#[tokio::test]
async fn rebuild_patches_one_module() {
    let runtime = two_entry_app();
    let builder = builder(&runtime);
    let graph = builder
        .build(
            &entries(&[("app", "./src/a.js"), ("print", "./src/b.js")]),
            &CancellationToken::never(),
        )
        .await
        .unwrap();

    runtime.insert(
        "src/a.js",
        "import { greet } from './shared.js';\nimport { late } from './late.js';\ngreet(late);\n",
    );
    runtime.insert("src/late.js", "export const late = 'late';\n");

    let outcome = builder
        .rebuild_module(&graph, &id("/p/src/a.js"), &CancellationToken::never())
        .await
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.added, vec![id("/p/src/late.js")]);
    assert_eq!(outcome.removed, vec![id("/p/src/extra.js")]);
    // The patched module keeps its place in discovery order.
    assert_eq!(graph.discovery_index(&id("/p/src/a.js")), Some(0));
    assert_eq!(
        graph.dependents(&id("/p/src/late.js")),
        vec![id("/p/src/a.js")]
    );
    assert!(graph.module(&id("/p/src/a.js")).unwrap().is_entry);
}

#[tokio::test]
async fn rebuild_without_changes_is_a_no_op() {
    let runtime = two_entry_app();
    let builder = builder(&runtime);
    let graph = builder
        .build(&entries(&[("app", "./src/a.js")]), &CancellationToken::never())
        .await
        .unwrap();

    let outcome = builder
        .rebuild_module(&graph, &id("/p/src/shared.js"), &CancellationToken::never())
        .await
        .unwrap();
    assert_eq!(outcome, RebuildOutcome::default());
    assert_eq!(graph.len(), 3);
}

#[tokio::test]
async fn rebuild_of_unknown_module_fails() {
    let runtime = two_entry_app();
    let builder = builder(&runtime);
    let graph = builder
        .build(&entries(&[("app", "./src/a.js")]), &CancellationToken::never())
        .await
        .unwrap();

    let err = builder
        .rebuild_module(&graph, &id("/p/src/b.js"), &CancellationToken::never())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::UnknownModule(_)));
}

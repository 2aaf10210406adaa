//! Import and export extraction over the parsed program.

use std::sync::LazyLock;

use oxc_ast::ast::{
    Argument, BindingPattern, BindingPatternKind, CallExpression, Declaration,
    ExportAllDeclaration, ExportDefaultDeclaration, ExportNamedDeclaration, Expression,
    ImportDeclaration, ImportDeclarationSpecifier, ImportExpression, ModuleExportName, Program,
};
use oxc_ast_visit::{Visit, walk};
use oxc_span::{GetSpan, Span};
use regex::Regex;

use crate::module::{DependencyKind, Export, ImportedBindings};
use crate::pipeline::DependencyDecl;

static CHUNK_NAME: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r#"(?:webpackChunkName|chunkName)\s*:\s*["']([^"']+)["']"#)
});

/// Imports and exports found in a module.
#[derive(Debug, Default)]
pub(crate) struct Scan {
    pub dependencies: Vec<DependencyDecl>,
    pub exports: Vec<Export>,
}

/// Extract dependencies and exports, in source order. Repeated imports of
/// the same specifier and kind are merged into one declaration.
pub(crate) fn scan(program: &Program<'_>, source: &str) -> Scan {
    let mut collector = Collector {
        source,
        comments: program.comments.iter().map(|comment| comment.span).collect(),
        dependencies: Vec::new(),
        exports: Vec::new(),
    };
    collector.visit_program(program);

    Scan {
        dependencies: merge_dependencies(collector.dependencies),
        exports: dedupe_exports(collector.exports),
    }
}

struct Collector<'s> {
    source: &'s str,
    comments: Vec<Span>,
    dependencies: Vec<DependencyDecl>,
    exports: Vec<Export>,
}

impl Collector<'_> {
    fn depend(&mut self, specifier: &str, kind: DependencyKind, bindings: ImportedBindings) {
        self.dependencies
            .push(DependencyDecl::new(specifier, kind, bindings));
    }

    /// Chunk name from a magic comment between `import(` and the specifier.
    fn chunk_name(&self, within: Span) -> Option<String> {
        let pattern = CHUNK_NAME.as_ref().ok()?;
        self.comments
            .iter()
            .filter(|comment| comment.start >= within.start && comment.end <= within.end)
            .find_map(|comment| {
                pattern
                    .captures(comment.source_text(self.source))
                    .and_then(|caps| caps.get(1))
                    .map(|name| name.as_str().to_string())
            })
    }
}

impl<'a> Visit<'a> for Collector<'_> {
    fn visit_import_declaration(&mut self, it: &ImportDeclaration<'a>) {
        let bindings = match &it.specifiers {
            None => ImportedBindings::side_effect_only(),
            Some(specifiers) => {
                let mut names = Vec::with_capacity(specifiers.len());
                let mut namespace = false;
                for specifier in specifiers {
                    match specifier {
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(_) => {
                            names.push("default".to_string());
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(_) => {
                            namespace = true;
                        }
                        ImportDeclarationSpecifier::ImportSpecifier(named) => {
                            names.push(export_name(&named.imported));
                        }
                    }
                }
                if namespace {
                    ImportedBindings::All
                } else {
                    ImportedBindings::Named(names)
                }
            }
        };
        self.depend(it.source.value.as_str(), DependencyKind::Static, bindings);
    }

    fn visit_export_named_declaration(&mut self, it: &ExportNamedDeclaration<'a>) {
        if let Some(source) = &it.source {
            let specifier = source.value.as_str();
            self.depend(
                specifier,
                DependencyKind::Static,
                ImportedBindings::side_effect_only(),
            );
            for spec in &it.specifiers {
                self.exports.push(Export::re_export(
                    export_name(&spec.exported),
                    specifier,
                    export_name(&spec.local),
                ));
            }
            return;
        }

        if let Some(declaration) = &it.declaration {
            let mut names = Vec::new();
            declaration_names(declaration, &mut names);
            self.exports.extend(names.into_iter().map(Export::local));
        }
        for spec in &it.specifiers {
            self.exports.push(Export::local(export_name(&spec.exported)));
        }
        walk::walk_export_named_declaration(self, it);
    }

    fn visit_export_default_declaration(&mut self, it: &ExportDefaultDeclaration<'a>) {
        self.exports.push(Export::local("default"));
        walk::walk_export_default_declaration(self, it);
    }

    fn visit_export_all_declaration(&mut self, it: &ExportAllDeclaration<'a>) {
        let specifier = it.source.value.as_str();
        self.depend(
            specifier,
            DependencyKind::Static,
            ImportedBindings::side_effect_only(),
        );
        self.exports.push(match &it.exported {
            Some(namespace) => Export::re_export(export_name(namespace), specifier, "*"),
            None => Export::star(specifier),
        });
    }

    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        if let Some(specifier) = literal_specifier(&it.source) {
            let mut decl = DependencyDecl::new(specifier, DependencyKind::Dynamic, ImportedBindings::All);
            decl.chunk_name = self.chunk_name(Span::new(it.span.start, it.source.span().start));
            self.dependencies.push(decl);
        }
        walk::walk_import_expression(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        let is_require = matches!(
            &it.callee,
            Expression::Identifier(callee) if callee.name.as_str() == "require"
        );
        if is_require && it.arguments.len() == 1 {
            if let Some(Argument::StringLiteral(literal)) = it.arguments.first() {
                self.depend(
                    literal.value.as_str(),
                    DependencyKind::Static,
                    ImportedBindings::All,
                );
            }
        }
        walk::walk_call_expression(self, it);
    }
}

pub(crate) fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(ident) => ident.name.to_string(),
        ModuleExportName::IdentifierReference(ident) => ident.name.to_string(),
        ModuleExportName::StringLiteral(literal) => literal.value.to_string(),
    }
}

/// A string specifier, or a template literal without substitutions.
fn literal_specifier(expr: &Expression<'_>) -> Option<String> {
    match expr {
        Expression::StringLiteral(literal) => Some(literal.value.to_string()),
        Expression::TemplateLiteral(template) if template.expressions.is_empty() => template
            .quasis
            .first()
            .and_then(|quasi| quasi.value.cooked.as_ref())
            .map(|cooked| cooked.to_string()),
        _ => None,
    }
}

/// Names bound by an exported declaration.
pub(crate) fn declaration_names(declaration: &Declaration<'_>, names: &mut Vec<String>) {
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                binding_names(&declarator.id, names);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            if let Some(id) = &func.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                names.push(id.name.to_string());
            }
        }
        _ => {}
    }
}

fn binding_names(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(ident) => names.push(ident.name.to_string()),
        BindingPatternKind::ObjectPattern(object) => {
            for property in &object.properties {
                binding_names(&property.value, names);
            }
            if let Some(rest) = &object.rest {
                binding_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(array) => {
            for element in array.elements.iter().flatten() {
                binding_names(element, names);
            }
            if let Some(rest) = &array.rest {
                binding_names(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => binding_names(&assign.left, names),
    }
}

fn merge_dependencies(deps: Vec<DependencyDecl>) -> Vec<DependencyDecl> {
    let mut merged: Vec<DependencyDecl> = Vec::with_capacity(deps.len());
    for decl in deps {
        match merged
            .iter_mut()
            .find(|seen| seen.specifier == decl.specifier && seen.kind == decl.kind)
        {
            Some(seen) => {
                seen.bindings.merge(&decl.bindings);
                if seen.chunk_name.is_none() {
                    seen.chunk_name = decl.chunk_name;
                }
            }
            None => merged.push(decl),
        }
    }
    merged
}

fn dedupe_exports(exports: Vec<Export>) -> Vec<Export> {
    let mut out: Vec<Export> = Vec::with_capacity(exports.len());
    for export in exports {
        let duplicate = out.iter().any(|seen| {
            if export.is_star() {
                seen == &export
            } else {
                !seen.is_star() && seen.name == export.name
            }
        });
        if !duplicate {
            out.push(export);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use oxc_allocator::Allocator;

    use super::*;
    use crate::module::ExportKind;
    use crate::pipeline::script::parse::{parse, source_type};

    fn scan_source(source: &str) -> Scan {
        let allocator = Allocator::default();
        let program = parse(&allocator, source, source_type(Some("js"))).unwrap();
        scan(&program, source)
    }

    fn names(bindings: &ImportedBindings) -> Vec<&str> {
        match bindings {
            ImportedBindings::All => vec!["*"],
            ImportedBindings::Named(names) => names.iter().map(String::as_str).collect(),
        }
    }

    #[test]
    fn static_import_forms() {
        let scan = scan_source(
            r#"
            import React from "react";
            import { a, b as c } from './ab';
            import def, { x } from "./mixed";
            import * as ns from "./ns";
            import "./polyfill";
            "#,
        );

        let specs: Vec<_> = scan.dependencies.iter().map(|d| d.specifier.as_str()).collect();
        assert_eq!(specs, vec!["react", "./ab", "./mixed", "./ns", "./polyfill"]);
        assert_eq!(names(&scan.dependencies[0].bindings), vec!["default"]);
        assert_eq!(names(&scan.dependencies[1].bindings), vec!["a", "b"]);
        assert_eq!(names(&scan.dependencies[2].bindings), vec!["default", "x"]);
        assert_eq!(names(&scan.dependencies[3].bindings), vec!["*"]);
        assert!(scan.dependencies[4].bindings.is_side_effect_only());
        assert!(scan.dependencies.iter().all(|d| d.kind == DependencyKind::Static));
    }

    #[test]
    fn dynamic_import_with_chunk_name() {
        let scan = scan_source(
            r#"
            button.onclick = () => import(/* webpackChunkName: "lodash" */ "lodash")
              .then(({ default: _ }) => _.join(["a", "b"], " "));
            "#,
        );

        assert_eq!(scan.dependencies.len(), 1);
        let dep = &scan.dependencies[0];
        assert_eq!(dep.specifier, "lodash");
        assert_eq!(dep.kind, DependencyKind::Dynamic);
        assert_eq!(dep.bindings, ImportedBindings::All);
        assert_eq!(dep.chunk_name.as_deref(), Some("lodash"));
    }

    #[test]
    fn comments_elsewhere_do_not_name_chunks() {
        let scan = scan_source(
            "/* webpackChunkName: \"wrong\" */\nconst lazy = () => import(\"./page\");\n",
        );
        assert_eq!(scan.dependencies[0].chunk_name, None);
    }

    #[test]
    fn ignores_strings_comments_and_member_calls() {
        let scan = scan_source(
            r#"
            // import a from "./commented";
            const text = "import b from './quoted'";
            loader.import("./member");
            obj.require("./member");
            "#,
        );
        assert!(scan.dependencies.is_empty());
    }

    #[test]
    fn computed_dynamic_imports_are_skipped() {
        let scan = scan_source("const page = (name) => import(`./pages/${name}.js`);\n");
        assert!(scan.dependencies.is_empty());

        let scan = scan_source("const page = () => import(`./pages/home.js`);\n");
        assert_eq!(scan.dependencies[0].specifier, "./pages/home.js");
    }

    #[test]
    fn repeated_imports_merge() {
        let scan = scan_source(
            r#"
            import { a } from "./x";
            import { b } from "./x";
            const lazy = () => import("./x");
            "#,
        );
        assert_eq!(scan.dependencies.len(), 2);
        assert_eq!(names(&scan.dependencies[0].bindings), vec!["a", "b"]);
        assert_eq!(scan.dependencies[1].kind, DependencyKind::Dynamic);
    }

    #[test]
    fn local_exports() {
        let scan = scan_source(
            r#"
            export const a = 1, b = f(1, 2);
            export let { c, d: e, ...rest } = obj;
            export const [first, , [second = 2]] = list;
            export function g() {}
            export async function h() {}
            export class K {}
            const z = 3;
            export { z, z as alias };
            export default function () {}
            "#,
        );
        let exported: Vec<_> = scan.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            exported,
            vec![
                "a", "b", "c", "e", "rest", "first", "second", "g", "h", "K", "z", "alias",
                "default"
            ]
        );
        assert!(scan.exports.iter().all(|e| e.kind == ExportKind::Local));
    }

    #[test]
    fn only_exported_declarations_count() {
        let scan = scan_source("export const a = 1\nlet b, c\n");
        let exported: Vec<_> = scan.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(exported, vec!["a"]);
    }

    #[test]
    fn re_exports() {
        let scan = scan_source(
            r#"
            export { default as Button, size } from "./button";
            export * from "./icons";
            export * as colors from "./colors";
            "#,
        );

        assert_eq!(
            scan.exports,
            vec![
                Export::re_export("Button", "./button", "default"),
                Export::re_export("size", "./button", "size"),
                Export::star("./icons"),
                Export::re_export("colors", "./colors", "*"),
            ]
        );
        let specs: Vec<_> = scan.dependencies.iter().map(|d| d.specifier.as_str()).collect();
        assert_eq!(specs, vec!["./button", "./icons", "./colors"]);
        assert!(scan.dependencies.iter().all(|d| d.bindings.is_side_effect_only()));
    }

    #[test]
    fn require_calls() {
        let scan = scan_source(r#"const path = require("path");"#);
        assert_eq!(scan.dependencies[0].specifier, "path");
        assert_eq!(scan.dependencies[0].bindings, ImportedBindings::All);
    }

    #[test]
    fn imports_inside_exported_bodies() {
        let scan = scan_source(
            "export function open() { return import(\"./dialog\"); }\nexport default () => require(\"./legacy\");\n",
        );
        let specs: Vec<_> = scan.dependencies.iter().map(|d| d.specifier.as_str()).collect();
        assert_eq!(specs, vec!["./dialog", "./legacy"]);
    }
}

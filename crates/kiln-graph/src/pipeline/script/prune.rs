//! Removal of unused export declarations from side-effect-free modules.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ExportDefaultDeclarationKind, ExportNamedDeclaration, IdentifierReference, JSXIdentifier,
    Statement,
};
use oxc_ast_visit::{Visit, walk};
use oxc_span::Span;
use rustc_hash::FxHashMap;

use super::parse::{parse, source_type};
use super::scan::{declaration_names, export_name};
use crate::error::ParseError;

/// Drop every top-level `export` declaration whose names are all dead.
///
/// Only declarations are removed: `export { .. }` lists and re-exports stay,
/// and so does any declaration whose binding is still referenced elsewhere
/// in the module. Name matching ignores scoping, so a shadowed reference
/// keeps a declaration alive. Callers must only use this on modules whose
/// top-level code has no side effects.
pub fn strip_unused_exports(
    source: &str,
    extension: Option<&str>,
    is_live: impl Fn(&str) -> bool,
) -> Result<String, ParseError> {
    let allocator = Allocator::default();
    let program = parse(&allocator, source, source_type(extension))?;

    let mut references = References::default();
    references.visit_program(&program);

    let mut dead: Vec<Span> = Vec::new();
    for stmt in &program.body {
        match stmt {
            Statement::ExportNamedDeclaration(export) if export.source.is_none() => {
                let Some(declaration) = &export.declaration else {
                    continue;
                };
                let mut names = Vec::new();
                declaration_names(declaration, &mut names);
                let removable = !names.is_empty()
                    && names
                        .iter()
                        .all(|name| !is_live(name) && !references.used_outside(name, export.span));
                if removable {
                    dead.push(export.span);
                }
            }
            Statement::ExportDefaultDeclaration(export) if !is_live("default") => {
                let id = match &export.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => func.id.as_ref(),
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => class.id.as_ref(),
                    _ => None,
                };
                let referenced = id.is_some_and(|id| {
                    references.used_outside(id.name.as_str(), export.span)
                });
                if !referenced {
                    dead.push(export.span);
                }
            }
            _ => {}
        }
    }

    if dead.is_empty() {
        return Ok(source.to_string());
    }
    tracing::trace!(removed = dead.len(), "stripped unused exports");

    let mut out = source.to_string();
    for span in dead.iter().rev() {
        out.replace_range(span.start as usize..span.end as usize, "");
    }
    Ok(out)
}

/// Offsets of every identifier use, by name.
#[derive(Default)]
struct References {
    uses: FxHashMap<String, Vec<u32>>,
}

impl References {
    fn used_outside(&self, name: &str, span: Span) -> bool {
        self.uses
            .get(name)
            .is_some_and(|offsets| offsets.iter().any(|&at| at < span.start || at >= span.end))
    }

    fn record(&mut self, name: &str, at: u32) {
        self.uses.entry(name.to_string()).or_default().push(at);
    }
}

impl<'a> Visit<'a> for References {
    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        self.record(it.name.as_str(), it.span.start);
    }

    fn visit_jsx_identifier(&mut self, it: &JSXIdentifier<'a>) {
        self.record(it.name.as_str(), it.span.start);
    }

    fn visit_export_named_declaration(&mut self, it: &ExportNamedDeclaration<'a>) {
        // `export { f as g }` keeps `f` alive even when the list is not
        // walked as identifier references.
        if it.source.is_none() {
            for spec in &it.specifiers {
                self.record(&export_name(&spec.local), spec.span.start);
            }
        }
        walk::walk_export_named_declaration(self, it);
    }
}

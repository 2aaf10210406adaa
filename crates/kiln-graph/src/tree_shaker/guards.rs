//! Static evaluation of `process.env.NODE_ENV` guards.
//!
//! ```js
//! if (process.env.NODE_ENV !== "production") {
//!   enableDevtools();
//! }
//! ```
//!
//! The condition is known at build time, so the dead branch (and any import
//! it contains) is removed before the module's dependencies are scanned. A
//! guard is replaced by the text of its live branch; a false guard in an
//! `else if` chain leaves the rest of the chain in its place.

use std::ops::Range;

use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, IfStatement, Statement};
use oxc_ast_visit::{Visit, walk};
use oxc_span::{GetSpan, SourceType};

use crate::error::ParseError;
use crate::pipeline::BuildMode;
use crate::pipeline::script::parse::parse;

/// One guard rewrite.
#[derive(Debug)]
struct Edit {
    range: Range<usize>,
    replacement: String,
    kept: bool,
}

/// Remove the dead branch of every environment guard in `source`.
///
/// Guards are rewritten outermost first and the source is re-parsed after
/// each rewrite, so a guard nested in a live branch is handled on the next
/// pass.
pub fn eliminate_dead_branches(
    source: &str,
    source_type: SourceType,
    mode: BuildMode,
) -> Result<String, ParseError> {
    let mut current = source.to_string();

    loop {
        let edit = {
            let allocator = Allocator::default();
            let program = parse(&allocator, &current, source_type)?;
            let mut finder = GuardFinder {
                source: &current,
                node_env: mode.node_env(),
                found: None,
            };
            finder.visit_program(&program);
            finder.found
        };
        let Some(edit) = edit else {
            break;
        };

        tracing::trace!(offset = edit.range.start, kept = edit.kept, "eliminated guard");
        current.replace_range(edit.range, &edit.replacement);
    }

    Ok(current)
}

/// Finds the first guard in source order, without descending into it.
struct GuardFinder<'s> {
    source: &'s str,
    node_env: &'static str,
    found: Option<Edit>,
}

impl GuardFinder<'_> {
    /// `empty` stands in for a guard with no live branch.
    fn evaluate(&self, guard: &IfStatement<'_>, empty: &str) -> Option<Edit> {
        let condition = env_condition(&guard.test, self.node_env)?;
        let live = if condition {
            Some(guard.consequent.span())
        } else {
            guard.alternate.as_ref().map(GetSpan::span)
        };

        Some(Edit {
            range: guard.span.start as usize..guard.span.end as usize,
            replacement: live.map_or_else(
                || empty.to_string(),
                |span| span.source_text(self.source).to_string(),
            ),
            kept: condition,
        })
    }
}

impl<'a> Visit<'a> for GuardFinder<'_> {
    fn visit_statements(&mut self, stmts: &oxc_allocator::Vec<'a, Statement<'a>>) {
        for stmt in stmts {
            if self.found.is_some() {
                return;
            }
            if let Statement::IfStatement(guard) = stmt {
                // In a statement list a dead guard can vanish entirely.
                if let Some(edit) = self.evaluate(guard, "") {
                    self.found = Some(edit);
                    return;
                }
            }
            self.visit_statement(stmt);
        }
    }

    fn visit_if_statement(&mut self, it: &IfStatement<'a>) {
        if self.found.is_some() {
            return;
        }
        match self.evaluate(it, "{}") {
            Some(edit) => self.found = Some(edit),
            None => walk::walk_if_statement(self, it),
        }
    }
}

/// Value of `process.env.NODE_ENV <op> "literal"` (either operand order).
fn env_condition(test: &Expression<'_>, node_env: &str) -> Option<bool> {
    let Expression::BinaryExpression(binary) = test.without_parentheses() else {
        return None;
    };
    if !binary.operator.is_equality() {
        return None;
    }
    let negated = binary.operator.as_str().starts_with('!');

    let literal = match (&binary.left, &binary.right) {
        (env, Expression::StringLiteral(literal)) if is_node_env(env) => literal,
        (Expression::StringLiteral(literal), env) if is_node_env(env) => literal,
        _ => return None,
    };
    Some((literal.value.as_str() == node_env) != negated)
}

fn is_node_env(expr: &Expression<'_>) -> bool {
    let Expression::StaticMemberExpression(outer) = expr else {
        return false;
    };
    let Expression::StaticMemberExpression(inner) = &outer.object else {
        return false;
    };
    outer.property.name.as_str() == "NODE_ENV"
        && inner.property.name.as_str() == "env"
        && matches!(&inner.object, Expression::Identifier(process) if process.name.as_str() == "process")
}

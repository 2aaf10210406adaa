//! Parser entry point shared by the script loader and the guard pass.

use oxc_allocator::Allocator;
use oxc_ast::ast::Program;
use oxc_parser::{Parser, ParserReturn};
use oxc_span::SourceType;

use crate::error::ParseError;

/// Source type for a script extension. JSX is accepted in every ES module.
pub(crate) fn source_type(extension: Option<&str>) -> SourceType {
    match extension {
        Some("cjs") => SourceType::cjs(),
        _ => SourceType::jsx(),
    }
}

/// Parse `source`, failing on the first syntax error.
pub(crate) fn parse<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    source_type: SourceType,
) -> Result<Program<'a>, ParseError> {
    let ParserReturn {
        program, errors, ..
    } = Parser::new(allocator, source, source_type).parse();

    match errors.first() {
        None => Ok(program),
        Some(error) => {
            let offset = error
                .labels
                .as_ref()
                .and_then(|labels| labels.first())
                .map_or(0, |label| label.offset());
            Err(ParseError::at(source, offset, error.message.to_string()))
        }
    }
}

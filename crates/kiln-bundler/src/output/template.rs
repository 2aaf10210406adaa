//! Output filename templates.
//!
//! Supported placeholders: `[name]`, `[id]`, `[hash]` (build hash),
//! `[contenthash]` (chunk hash), and `[hash:N]` / `[contenthash:N]` to keep
//! the first `N` hex characters.

use kiln_graph::ContentHash;

use crate::error::{Error, Result};

/// Hex characters kept by `[hash]` and `[contenthash]` without a length.
pub const DEFAULT_HASH_LENGTH: usize = 20;

const MAX_HASH_LENGTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Name,
    Id,
    Hash(usize),
    ContentHash(usize),
}

/// A parsed filename template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameTemplate {
    source: String,
    parts: Vec<Part>,
}

/// Values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub name: &'a str,
    pub id: &'a str,
    pub build_hash: &'a ContentHash,
    pub content_hash: &'a ContentHash,
}

impl FilenameTemplate {
    pub fn parse(template: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidTemplate {
            template: template.to_string(),
            reason,
        };

        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(open) = rest.find('[') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find(']')
                .ok_or_else(|| invalid("unclosed '['".into()))?;
            let placeholder = &after[..close];
            rest = &after[close + 1..];

            let (key, length) = match placeholder.split_once(':') {
                Some((key, length)) => {
                    let length: usize = length
                        .parse()
                        .map_err(|_| invalid(format!("invalid hash length in [{placeholder}]")))?;
                    if length == 0 || length > MAX_HASH_LENGTH {
                        return Err(invalid(format!(
                            "hash length must be between 1 and {MAX_HASH_LENGTH}"
                        )));
                    }
                    (key, Some(length))
                }
                None => (placeholder, None),
            };

            let part = match (key, length) {
                ("name", None) => Part::Name,
                ("id", None) => Part::Id,
                ("hash", length) => Part::Hash(length.unwrap_or(DEFAULT_HASH_LENGTH)),
                ("contenthash", length) => {
                    Part::ContentHash(length.unwrap_or(DEFAULT_HASH_LENGTH))
                }
                _ => return Err(invalid(format!("unknown placeholder [{placeholder}]"))),
            };

            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(part);
        }

        if rest.contains(']') {
            return Err(invalid("unmatched ']'".into()));
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the rendered name differs between chunks of one build.
    pub fn is_chunk_specific(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, Part::Name | Part::Id | Part::ContentHash(_)))
    }

    pub fn render(&self, cx: &TemplateContext<'_>) -> String {
        let mut out = String::with_capacity(self.source.len() + 16);
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Name => out.push_str(cx.name),
                Part::Id => out.push_str(cx.id),
                Part::Hash(len) => out.push_str(&cx.build_hash.short(*len)),
                Part::ContentHash(len) => out.push_str(&cx.content_hash.short(*len)),
            }
        }
        out
    }
}

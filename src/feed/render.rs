//! HTML fragment rendering for bounded feed items.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` produce literal braces.
//! Parsing validates every placeholder up front, so a rendered fragment never
//! contains unresolved placeholder text.
//!
//! Item templates accept `text`, `title`, `link`, `summary`, `published`,
//! `guid` and `index`. Wrapper templates accept `items`, `name` and `count`,
//! and must contain `items`.

use chrono::{DateTime, SecondsFormat};
use thiserror::Error;

use super::parser::FeedItem;

const ITEM_FIELDS: &[&str] = &["text", "title", "link", "summary", "published", "guid", "index"];
const WRAPPER_FIELDS: &[&str] = &["items", "name", "count"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown placeholder {{{name}}} at byte {offset}")]
    UnknownPlaceholder { name: String, offset: usize },

    #[error("Unterminated placeholder starting at byte {0}")]
    Unterminated(usize),

    #[error("Unmatched '}}' at byte {0} (use '}}}}' for a literal brace)")]
    UnmatchedClose(usize),

    #[error("Template is missing required placeholder {{{0}}}")]
    MissingPlaceholder(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(&'static str),
}

/// A parsed template whose placeholders have all been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlTemplate {
    segments: Vec<Segment>,
}

impl HtmlTemplate {
    /// Parses a per-item template.
    pub fn item(src: &str) -> Result<Self, TemplateError> {
        Self::parse(src, ITEM_FIELDS)
    }

    /// Parses a feed-level wrapper template; `{items}` is required.
    pub fn wrapper(src: &str) -> Result<Self, TemplateError> {
        let template = Self::parse(src, WRAPPER_FIELDS)?;
        if !template.uses("items") {
            return Err(TemplateError::MissingPlaceholder("items"));
        }
        Ok(template)
    }

    fn uses(&self, field: &str) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(name) if *name == field))
    }

    fn parse(src: &str, allowed: &[&'static str]) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = src.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::UnmatchedClose(offset)),
                '{' => {
                    let start = offset + 1;
                    let end = src[start..]
                        .find('}')
                        .map(|i| start + i)
                        .ok_or(TemplateError::Unterminated(offset))?;
                    let name = &src[start..end];
                    let field = allowed
                        .iter()
                        .copied()
                        .find(|f| *f == name)
                        .ok_or_else(|| TemplateError::UnknownPlaceholder {
                            name: name.to_string(),
                            offset,
                        })?;

                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(field));

                    // Skip past the closing brace
                    for (i, _) in chars.by_ref() {
                        if i == end {
                            break;
                        }
                    }
                }
                _ => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    fn expand(&self, out: &mut String, mut value: impl FnMut(&'static str, &mut String)) {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => value(*name, out),
            }
        }
    }
}

fn push_escaped(out: &mut String, value: &str) {
    out.push_str(&htmlescape::encode_minimal(value));
}

/// Characters `c` occupies once escaped for substitution into a template.
pub fn escaped_width(c: char) -> usize {
    let mut buf = [0u8; 4];
    htmlescape::encode_minimal(c.encode_utf8(&mut buf)).chars().count()
}

fn format_published(published: Option<i64>) -> String {
    published
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Renders `items` into a single HTML fragment.
///
/// Each item is expanded through `item_template` and the results are
/// concatenated. When a wrapper is given, the concatenation is substituted for
/// its `{items}` placeholder. All field values are HTML-escaped; missing
/// optional values render as the empty string.
pub fn render(
    items: &[FeedItem],
    item_template: &HtmlTemplate,
    wrapper: Option<&HtmlTemplate>,
    feed_name: &str,
) -> String {
    let mut body = String::new();
    for (idx, item) in items.iter().enumerate() {
        item_template.expand(&mut body, |field, out| match field {
            "text" | "title" => push_escaped(out, item.text()),
            "link" => push_escaped(out, item.link.as_deref().unwrap_or("")),
            "summary" => push_escaped(out, item.summary.as_deref().unwrap_or("")),
            "published" => out.push_str(&format_published(item.published)),
            "guid" => push_escaped(out, &item.guid),
            "index" => out.push_str(&(idx + 1).to_string()),
            _ => {}
        });
    }

    match wrapper {
        None => body,
        Some(wrapper) => {
            let mut out = String::with_capacity(body.len() + 64);
            wrapper.expand(&mut out, |field, out| match field {
                "items" => out.push_str(&body),
                "name" => push_escaped(out, feed_name),
                "count" => out.push_str(&items.len().to_string()),
                _ => {}
            });
            out
        }
    }
}

//! Ordered preprocessing of parsed feed items.
//!
//! Each configured [`PreprocessingAction`] transforms or filters the whole
//! item list. Actions run in configuration order and the first failure aborts
//! the run, so one rendered output never mixes old and new transformation
//! semantics.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::parser::FeedItem;
use crate::util::{
    collapse_whitespace, parse_base_url, resolve_link, strip_control_chars, truncate_chars,
};

/// A preprocessing step failed; the whole update is abandoned.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Preprocessing action #{index} ({action}) failed: {reason}")]
pub struct PipelineError {
    /// Zero-based position of the failing action in the configured list
    pub index: usize,
    pub action: &'static str,
    pub reason: String,
}

/// One configured transformation step.
///
/// Deserialized from config as an internally tagged table, e.g.
/// `{ action = "truncate_description", max_chars = 200 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PreprocessingAction {
    /// Remove HTML tags from titles and summaries and decode entities.
    StripTags,
    /// Remove control characters and ANSI escapes from titles and summaries.
    StripControlChars,
    /// Collapse whitespace runs in titles and summaries.
    CollapseWhitespace,
    /// Cap each summary at `max_chars` characters.
    TruncateDescription { max_chars: usize },
    /// Replace the `from` prefix of item links with `to`.
    RewriteLinks { from: String, to: String },
    /// Resolve relative links against `base`; links with non-http(s) schemes are dropped.
    AbsolutizeLinks { base: String },
    /// Regex replacement over titles and summaries.
    ReplaceText { pattern: String, replacement: String },
    /// Keep only items whose title or summary mentions one of `keywords` (case-insensitive).
    IncludeKeywords { keywords: Vec<String> },
    /// Drop items whose title or summary mentions any of `keywords` (case-insensitive).
    ExcludeKeywords { keywords: Vec<String> },
    /// Drop items whose guid was already seen earlier in the list.
    DedupeByGuid,
    /// Drop items without a link.
    RequireLink,
}

type ActionResult = Result<Vec<FeedItem>, String>;

impl PreprocessingAction {
    /// Stable name of the action kind, as written in config.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StripTags => "strip_tags",
            Self::StripControlChars => "strip_control_chars",
            Self::CollapseWhitespace => "collapse_whitespace",
            Self::TruncateDescription { .. } => "truncate_description",
            Self::RewriteLinks { .. } => "rewrite_links",
            Self::AbsolutizeLinks { .. } => "absolutize_links",
            Self::ReplaceText { .. } => "replace_text",
            Self::IncludeKeywords { .. } => "include_keywords",
            Self::ExcludeKeywords { .. } => "exclude_keywords",
            Self::DedupeByGuid => "dedupe_by_guid",
            Self::RequireLink => "require_link",
        }
    }

    /// Applies this action to the item list.
    ///
    /// The error string describes what was wrong with the action's
    /// parameters; [`run`] wraps it with the action's position.
    pub fn apply(&self, items: Vec<FeedItem>) -> ActionResult {
        match self {
            Self::StripTags => Ok(map_text(items, strip_tags)),
            Self::StripControlChars => Ok(map_text(items, |s| strip_control_chars(s).into_owned())),
            Self::CollapseWhitespace => Ok(map_text(items, |s| collapse_whitespace(s).into_owned())),
            Self::TruncateDescription { max_chars } => truncate_description(items, *max_chars),
            Self::RewriteLinks { from, to } => rewrite_links(items, from, to),
            Self::AbsolutizeLinks { base } => absolutize_links(items, base),
            Self::ReplaceText {
                pattern,
                replacement,
            } => replace_text(items, pattern, replacement),
            Self::IncludeKeywords { keywords } => filter_keywords(items, keywords, true),
            Self::ExcludeKeywords { keywords } => filter_keywords(items, keywords, false),
            Self::DedupeByGuid => Ok(dedupe_by_guid(items)),
            Self::RequireLink => Ok(items.into_iter().filter(|i| i.link.is_some()).collect()),
        }
    }
}

/// Runs `actions` in order over `items`.
///
/// An empty action list is the identity pipeline.
pub fn run(
    actions: &[PreprocessingAction],
    items: Vec<FeedItem>,
) -> Result<Vec<FeedItem>, PipelineError> {
    actions
        .iter()
        .enumerate()
        .try_fold(items, |items, (index, action)| {
            action.apply(items).map_err(|reason| PipelineError {
                index,
                action: action.kind(),
                reason,
            })
        })
}

fn map_text(items: Vec<FeedItem>, f: impl Fn(&str) -> String) -> Vec<FeedItem> {
    items
        .into_iter()
        .map(|mut item| {
            item.title = f(&item.title);
            item.summary = item.summary.as_deref().map(&f);
            item
        })
        .collect()
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| {
        // Comments and tags; script/style bodies go with their tags
        Regex::new(r"(?is)<!--.*?-->|<(script|style)\b[^>]*>.*?</(script|style)\s*>|<[^>]*>")
            .expect("static tag pattern is valid")
    })
}

fn strip_tags(s: &str) -> String {
    if !s.contains('<') && !s.contains('&') {
        return s.to_string();
    }
    let without_tags = tag_regex().replace_all(s, " ");
    let decoded = htmlescape::decode_html(&without_tags).unwrap_or_else(|_| without_tags.to_string());
    collapse_whitespace(&decoded).into_owned()
}

fn truncate_description(items: Vec<FeedItem>, max_chars: usize) -> ActionResult {
    if max_chars == 0 {
        return Err("max_chars must be positive".to_string());
    }
    Ok(items
        .into_iter()
        .map(|mut item| {
            item.summary = item.summary.map(|s| truncate_chars(&s, max_chars).into_owned());
            item
        })
        .collect())
}

fn rewrite_links(items: Vec<FeedItem>, from: &str, to: &str) -> ActionResult {
    if from.is_empty() {
        return Err("`from` prefix must not be empty".to_string());
    }
    Ok(items
        .into_iter()
        .map(|mut item| {
            item.link = item.link.map(|link| {
                if link.starts_with(from) {
                    format!("{to}{}", &link[from.len()..])
                } else {
                    link
                }
            });
            item
        })
        .collect())
}

fn absolutize_links(items: Vec<FeedItem>, base: &str) -> ActionResult {
    let base = parse_base_url(base).map_err(|e| format!("invalid base URL {base:?}: {e}"))?;
    Ok(items
        .into_iter()
        .map(|mut item| {
            item.link = item.link.and_then(|href| match resolve_link(&base, &href) {
                Ok(url) => Some(url.to_string()),
                Err(e) => {
                    tracing::debug!(link = %href, error = %e, "Dropping item link");
                    None
                }
            });
            item
        })
        .collect())
}

fn replace_text(items: Vec<FeedItem>, pattern: &str, replacement: &str) -> ActionResult {
    let re = Regex::new(pattern).map_err(|e| format!("invalid pattern: {e}"))?;
    Ok(map_text(items, |s| re.replace_all(s, replacement).into_owned()))
}

fn filter_keywords(items: Vec<FeedItem>, keywords: &[String], include: bool) -> ActionResult {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    if keywords.is_empty() {
        return Err("keyword list must contain at least one non-blank keyword".to_string());
    }

    Ok(items
        .into_iter()
        .filter(|item| {
            let haystack = format!(
                "{} {}",
                item.title.to_lowercase(),
                item.summary.as_deref().unwrap_or("").to_lowercase()
            );
            let matched = keywords.iter().any(|k| haystack.contains(k.as_str()));
            matched == include
        })
        .collect())
}

fn dedupe_by_guid(items: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.guid.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(title: &str, summary: Option<&str>, link: Option<&str>) -> FeedItem {
        FeedItem {
            summary: summary.map(str::to_string),
            link: link.map(str::to_string),
            ..FeedItem::new(title)
        }
    }

    fn titles(items: &[FeedItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let items = vec![item("a", None, None), item("b", Some("x"), None)];
        assert_eq!(run(&[], items.clone()).unwrap(), items);
    }

    #[test]
    fn test_strip_tags_decodes_entities() {
        let items = vec![item(
            "<b>Bold</b> &amp; brave",
            Some("<p>Hello <script>evil()</script>world</p>"),
            None,
        )];
        let out = run(&[PreprocessingAction::StripTags], items).unwrap();
        assert_eq!(out[0].title, "Bold & brave");
        assert_eq!(out[0].summary.as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_actions_run_in_order() {
        let items = vec![item("<i>hello</i>", None, None)];
        // Replace before stripping sees the tags; after stripping it does not
        let replace = PreprocessingAction::ReplaceText {
            pattern: "<i>".to_string(),
            replacement: "[".to_string(),
        };
        let out = run(&[replace.clone(), PreprocessingAction::StripTags], items.clone()).unwrap();
        assert_eq!(out[0].title, "[hello");
        let out = run(&[PreprocessingAction::StripTags, replace], items).unwrap();
        assert_eq!(out[0].title, "hello");
    }

    #[test]
    fn test_truncate_description() {
        let items = vec![item("t", Some("abcdef"), None), item("u", None, None)];
        let out = run(&[PreprocessingAction::TruncateDescription { max_chars: 3 }], items).unwrap();
        assert_eq!(out[0].summary.as_deref(), Some("abc\u{2026}"));
        assert_eq!(out[1].summary, None);
    }

    #[test]
    fn test_rewrite_links() {
        let items = vec![
            item("a", None, Some("http://old.example.com/a")),
            item("b", None, Some("https://elsewhere.example.com/b")),
        ];
        let action = PreprocessingAction::RewriteLinks {
            from: "http://old.example.com/".to_string(),
            to: "https://new.example.com/".to_string(),
        };
        let out = run(&[action], items).unwrap();
        assert_eq!(out[0].link.as_deref(), Some("https://new.example.com/a"));
        assert_eq!(out[1].link.as_deref(), Some("https://elsewhere.example.com/b"));
    }

    #[test]
    fn test_absolutize_links_drops_unsafe() {
        let items = vec![
            item("rel", None, Some("posts/1")),
            item("js", None, Some("javascript:alert(1)")),
        ];
        let action = PreprocessingAction::AbsolutizeLinks {
            base: "https://example.com/blog/".to_string(),
        };
        let out = run(&[action], items).unwrap();
        assert_eq!(out[0].link.as_deref(), Some("https://example.com/blog/posts/1"));
        assert_eq!(out[1].link, None);
    }

    #[test]
    fn test_keyword_filters() {
        let items = vec![
            item("Rust release", None, None),
            item("Gardening", Some("All about RUST on tools"), None),
            item("Cooking", None, None),
        ];
        let include = PreprocessingAction::IncludeKeywords {
            keywords: vec!["rust".to_string()],
        };
        let out = run(&[include], items.clone()).unwrap();
        assert_eq!(titles(&out), vec!["Rust release", "Gardening"]);

        let exclude = PreprocessingAction::ExcludeKeywords {
            keywords: vec!["rust".to_string()],
        };
        let out = run(&[exclude], items).unwrap();
        assert_eq!(titles(&out), vec!["Cooking"]);
    }

    #[test]
    fn test_dedupe_and_require_link() {
        let mut dup = item("first", None, Some("https://x/1"));
        dup.guid = "same".to_string();
        let mut dup2 = item("second", None, None);
        dup2.guid = "same".to_string();
        let other = item("third", None, None);

        let out = run(&[PreprocessingAction::DedupeByGuid], vec![dup.clone(), dup2.clone(), other.clone()]).unwrap();
        assert_eq!(titles(&out), vec!["first", "third"]);

        let out = run(&[PreprocessingAction::RequireLink], vec![dup, dup2, other]).unwrap();
        assert_eq!(titles(&out), vec!["first"]);
    }

    #[test]
    fn test_failure_reports_position_and_kind() {
        let actions = vec![
            PreprocessingAction::StripTags,
            PreprocessingAction::ReplaceText {
                pattern: "(unclosed".to_string(),
                replacement: String::new(),
            },
        ];
        let err = run(&actions, vec![item("a", None, None)]).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.action, "replace_text");
        assert!(err.to_string().contains("#1 (replace_text)"));
    }

    #[test]
    fn test_invalid_parameters_fail() {
        let bad = [
            PreprocessingAction::TruncateDescription { max_chars: 0 },
            PreprocessingAction::RewriteLinks {
                from: String::new(),
                to: "x".to_string(),
            },
            PreprocessingAction::AbsolutizeLinks {
                base: "relative/path".to_string(),
            },
            PreprocessingAction::IncludeKeywords {
                keywords: vec!["  ".to_string()],
            },
        ];
        for action in bad {
            assert!(
                run(std::slice::from_ref(&action), vec![item("a", None, None)]).is_err(),
                "{} should reject its parameters",
                action.kind()
            );
        }
    }

    #[test]
    fn test_failure_applies_even_to_empty_item_list() {
        let err = run(&[PreprocessingAction::TruncateDescription { max_chars: 0 }], Vec::new());
        assert!(err.is_err());
    }

    #[test]
    fn test_action_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            actions: Vec<PreprocessingAction>,
        }
        let parsed: Wrapper = toml::from_str(
            r#"actions = [
                { action = "strip_tags" },
                { action = "truncate_description", max_chars = 80 },
                { action = "exclude_keywords", keywords = ["sponsored"] },
            ]"#,
        )
        .unwrap();
        assert_eq!(
            parsed.actions,
            vec![
                PreprocessingAction::StripTags,
                PreprocessingAction::TruncateDescription { max_chars: 80 },
                PreprocessingAction::ExcludeKeywords {
                    keywords: vec!["sponsored".to_string()]
                },
            ]
        );
    }
}

use feed_rs::parser;
use sha2::{Digest, Sha256};

/// One entry parsed out of raw feed content.
///
/// An item's *text* (what the length bound and the `{text}` placeholder refer
/// to) is its title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    /// Unix timestamp (seconds) of publication, falling back to last update
    pub published: Option<i64>,
    pub summary: Option<String>,
}

impl FeedItem {
    /// Builds an undated, linkless item. Handy for tests and for callers that
    /// feed pre-parsed items straight into the pipeline.
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        let guid = generate_guid(None, None, &title, None);
        Self {
            guid,
            title,
            link: None,
            published: None,
            summary: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.title
    }
}

/// Parses raw RSS, Atom or JSON Feed content into items, in document order.
///
/// Never fails: content that cannot be parsed as any supported format yields
/// zero items. Blank content is treated the same way without logging.
pub fn parse_items(raw: &str) -> Vec<FeedItem> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let feed = match parser::parse(raw.as_bytes()) {
        Ok(feed) => feed,
        Err(e) => {
            tracing::warn!(error = %e, bytes = raw.len(), "Unparseable feed content, treating as empty");
            return Vec::new();
        }
    };

    feed.entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());
            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));
            let title = entry.title.map(|t| t.content).unwrap_or_default();

            let existing_id = if entry.id.is_empty() {
                None
            } else {
                Some(entry.id.as_str())
            };
            let guid = generate_guid(existing_id, link.as_deref(), &title, published);

            FeedItem {
                guid,
                title,
                link,
                published,
                summary,
            }
        })
        .collect()
}

fn generate_guid(
    existing: Option<&str>,
    link: Option<&str>,
    title: &str,
    published: Option<i64>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let input = format!(
        "{}|{}|{}",
        link.unwrap_or(""),
        title,
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

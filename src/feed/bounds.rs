use std::cmp::Reverse;
use std::num::NonZeroUsize;

use super::parser::FeedItem;
use super::render::escaped_width;
use crate::util::truncate_to_width;

/// Item-count and per-item length limits for one feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub max_items: NonZeroUsize,
    /// Maximum rendered characters kept from each title and summary, measured
    /// after HTML escaping (marker not counted)
    pub max_item_length: NonZeroUsize,
}

impl Bounds {
    /// Returns `None` when either limit is zero.
    pub fn new(max_items: usize, max_item_length: usize) -> Option<Self> {
        Some(Self {
            max_items: NonZeroUsize::new(max_items)?,
            max_item_length: NonZeroUsize::new(max_item_length)?,
        })
    }

    /// Orders, caps and truncates `items`.
    ///
    /// Items are ordered most-recent-first by publication date with a stable
    /// sort; undated items come after dated ones and keep their document order.
    /// The first `max_items` survive, and each title and summary is cut so
    /// its escaped form is at most `max_item_length` characters. An entity is
    /// never split: `&` costs five characters (`&amp;`) or nothing. Identical
    /// input always yields identical output.
    pub fn enforce(&self, mut items: Vec<FeedItem>) -> Vec<FeedItem> {
        // Some(_) > None, so reversing puts undated items last
        items.sort_by_key(|item| Reverse(item.published));
        items.truncate(self.max_items.get());

        let max_len = self.max_item_length.get();
        for item in &mut items {
            item.title = truncate_to_width(&item.title, max_len, escaped_width).into_owned();
            item.summary = item
                .summary
                .take()
                .map(|s| truncate_to_width(&s, max_len, escaped_width).into_owned());
        }
        items
    }
}

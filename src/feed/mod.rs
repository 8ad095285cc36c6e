//! Feed ingestion, preprocessing and render caching.
//!
//! This module turns raw feed content delivered by an external fetcher into a
//! cached HTML fragment:
//!
//! - **Fingerprinting**: detect whether delivered content actually changed
//! - **Parsing**: RSS, Atom and JSON Feed into ordered items
//! - **Preprocessing**: ordered, configurable item transformations
//! - **Bounds**: item-count and per-item length limits
//! - **Rendering**: per-item templates joined into one fragment
//!
//! # Architecture
//!
//! - [`fingerprint`](fn@fingerprint) - stable content hash
//! - [`parser`] - feed parsing using the `feed-rs` crate
//! - [`pipeline`] - [`PreprocessingAction`] dispatch
//! - [`bounds`] - [`Bounds`] enforcement
//! - [`render`] - [`HtmlTemplate`] expansion
//! - `model` / `source` - the [`Feed`] aggregate and the [`SyndicatedFeed`] contract
//!
//! # Example
//!
//! ```
//! use feedcast::config::FeedConfig;
//! use feedcast::feed::Feed;
//!
//! let feed = Feed::new(FeedConfig::new("news", 10, 80, "<li>{text}</li>")).unwrap();
//! let outcome = feed.update("<rss version=\"2.0\"><channel><title>t</title>\
//!     <item><title>Hello</title></item></channel></rss>").unwrap();
//! assert!(outcome.is_changed());
//! assert_eq!(&*feed.snapshot().html_latest_content, "<li>Hello</li>");
//! ```

pub mod bounds;
mod fingerprint;
mod model;
pub mod parser;
pub mod pipeline;
pub mod render;
mod source;

pub use bounds::Bounds;
pub use fingerprint::fingerprint;
pub use model::{Feed, FeedError, FeedSnapshot, UpdateOutcome, VersionSuffix};
pub use parser::{parse_items, FeedItem};
pub use pipeline::{PipelineError, PreprocessingAction};
pub use render::{HtmlTemplate, TemplateError};
pub use source::{StubFeed, SyndicatedFeed};

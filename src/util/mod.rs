//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **Text processing**: char-boundary-safe truncation and control-character stripping
//! - **Link resolution**: resolving relative item links and rejecting unsafe schemes
//!
//! # Examples
//!
//! ```
//! use feedcast::util::{truncate_chars, parse_base_url, resolve_link};
//!
//! let base = parse_base_url("https://example.com/").unwrap();
//! let link = resolve_link(&base, "posts/1").unwrap();
//! assert_eq!(link.as_str(), "https://example.com/posts/1");
//!
//! assert_eq!(truncate_chars("Long article title", 4), "Long\u{2026}");
//! ```

mod links;
mod text;

pub use links::{parse_base_url, resolve_link, LinkError};
pub use text::{
    bounded_len, collapse_whitespace, strip_control_chars, truncate_chars, truncate_to_width,
    TRUNCATION_MARKER,
};

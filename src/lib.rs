//! feedcast: turns raw syndicated feed content into cached, bounded HTML
//! fragments with cache-busting version suffixes.
//!
//! Fetching, persistence and delivery live outside this crate. A scheduler
//! hands raw content to a [`store::FeedStore`]; an API layer reads the cached
//! fragments back out.

pub mod config;
pub mod feed;
pub mod store;
pub mod util;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::bounds::Bounds;
use super::fingerprint::fingerprint;
use super::parser::parse_items;
use super::pipeline::{self, PipelineError};
use super::render::{render, HtmlTemplate, TemplateError};
use crate::config::{ConfigError, FeedConfig};

// ============================================================================
// Error Types
// ============================================================================

/// Reasons an update was rejected. The feed keeps its previous snapshot.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Another update of the same feed is in flight (only from `try_update`).
    #[error("Feed update already in progress")]
    Busy,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ============================================================================
// Snapshot
// ============================================================================

/// Opaque cache-busting token. Changes exactly when the rendered HTML does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VersionSuffix(String);

impl VersionSuffix {
    fn initial() -> Self {
        Self("v0".to_string())
    }

    /// The generation makes the token unique per feed; the hash prefix makes
    /// it unlikely to repeat across feeds rebuilt from scratch.
    fn for_generation(generation: u64, content_hash: u64) -> Self {
        Self(format!("v{generation}-{:08x}", content_hash >> 32))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable state of a feed as of its last successful update.
///
/// A feed publishes a fresh snapshot on every change and never mutates one in
/// place, so a reader holding an `Arc<FeedSnapshot>` always sees the hash,
/// HTML and version suffix that belong together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub latest_content: Option<Arc<str>>,
    /// Always `fingerprint(latest_content)` when content is present
    pub latest_content_hash: Option<u64>,
    pub content_updated_at: Option<DateTime<Utc>>,
    pub html_latest_content: Arc<str>,
    pub html_feed_version_suffix: VersionSuffix,
    /// Number of successful changes applied so far
    pub generation: u64,
    pub item_count: usize,
}

impl FeedSnapshot {
    /// State of a feed that has never accepted content.
    pub fn empty() -> Self {
        Self {
            latest_content: None,
            latest_content_hash: None,
            content_updated_at: None,
            html_latest_content: Arc::from(""),
            html_feed_version_suffix: VersionSuffix::initial(),
            generation: 0,
            item_count: 0,
        }
    }

    /// Snapshot holding `content` rendered as `html`, one generation after `generation`.
    pub fn next(
        generation: u64,
        content: &str,
        content_hash: u64,
        html: String,
        item_count: usize,
    ) -> Self {
        let generation = generation + 1;
        Self {
            latest_content: Some(Arc::from(content)),
            latest_content_hash: Some(content_hash),
            content_updated_at: Some(Utc::now()),
            html_latest_content: Arc::from(html),
            html_feed_version_suffix: VersionSuffix::for_generation(generation, content_hash),
            generation,
            item_count,
        }
    }
}

impl Default for FeedSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Result of a successful update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Content differed; a new snapshot was published.
    Changed {
        items: usize,
        version: VersionSuffix,
    },
    /// Content matched the current fingerprint; nothing was re-processed.
    Unchanged,
}

impl UpdateOutcome {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

// ============================================================================
// Feed
// ============================================================================

/// Validated configuration together with the limits derived from it.
#[derive(Debug)]
struct Settings {
    config: Arc<FeedConfig>,
    bounds: Bounds,
}

impl Settings {
    fn new(config: FeedConfig) -> Result<Self, FeedError> {
        config.validate()?;
        let bounds = Bounds::new(config.max_items, config.max_item_length).ok_or_else(|| {
            ConfigError::Invalid(format!("feed '{}': limits must be positive", config.name))
        })?;
        Ok(Self {
            config: Arc::new(config),
            bounds,
        })
    }
}

/// A configured feed and its current rendered state.
///
/// `update` and `reconfigure` hold a per-feed mutex for their whole duration,
/// so at most one of them runs on a given feed at a time. Reads only clone
/// the current snapshot pointer.
#[derive(Debug)]
pub struct Feed {
    name: String,
    update_lock: Mutex<()>,
    settings: RwLock<Arc<Settings>>,
    current: RwLock<Arc<FeedSnapshot>>,
}

impl Feed {
    /// Creates a feed with no content from a validated configuration.
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        let settings = Settings::new(config)?;
        Ok(Self {
            name: settings.config.name.clone(),
            update_lock: Mutex::new(()),
            settings: RwLock::new(Arc::new(settings)),
            current: RwLock::new(Arc::new(FeedSnapshot::empty())),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> Arc<FeedConfig> {
        Arc::clone(&self.settings().config)
    }

    fn settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Current snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock_updates(&self) -> MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned lock carries no broken state
        self.update_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Accepts raw content from the fetcher, waiting for any in-flight update
    /// of this feed to finish first.
    ///
    /// Identical content (by fingerprint) is a no-op. Otherwise the content is
    /// parsed, preprocessed, bounded and rendered, and the resulting snapshot
    /// replaces the current one in a single swap. On error nothing changes.
    pub fn update(&self, raw: &str) -> Result<UpdateOutcome, FeedError> {
        let _guard = self.lock_updates();
        self.update_exclusive(raw)
    }

    /// Switches the feed to a new configuration and re-renders its current
    /// content under it.
    ///
    /// Runs under the same lock as `update`, so no update can land between
    /// reading the current content and publishing the re-render. Generations
    /// continue, so the new version suffix never repeats an earlier one. On
    /// error the feed keeps its previous configuration and snapshot.
    pub fn reconfigure(&self, config: FeedConfig) -> Result<(), FeedError> {
        if config.name != self.name {
            return Err(ConfigError::Invalid(format!(
                "feed '{}' cannot be renamed to '{}'",
                self.name, config.name
            ))
            .into());
        }
        let settings = Settings::new(config)?;

        let _guard = self.lock_updates();
        let previous = self.snapshot();
        let next = match (&previous.latest_content, previous.latest_content_hash) {
            (Some(content), Some(content_hash)) => {
                let (html, item_count) = render_with(&settings, content)?;
                Some(FeedSnapshot::next(
                    previous.generation,
                    content,
                    content_hash,
                    html,
                    item_count,
                ))
            }
            _ => None,
        };

        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
        if let Some(next) = next {
            tracing::info!(
                feed = %self.name,
                version = %next.html_feed_version_suffix,
                "Feed re-rendered under new configuration"
            );
            *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        }
        Ok(())
    }

    /// Like [`Feed::update`], but fails with [`FeedError::Busy`] instead of
    /// waiting when another update of this feed is running.
    pub fn try_update(&self, raw: &str) -> Result<UpdateOutcome, FeedError> {
        let _guard = match self.update_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(FeedError::Busy),
        };
        self.update_exclusive(raw)
    }

    fn update_exclusive(&self, raw: &str) -> Result<UpdateOutcome, FeedError> {
        let previous = self.snapshot();
        let content_hash = fingerprint(raw);

        if previous.latest_content_hash == Some(content_hash) {
            tracing::debug!(feed = %self.name, "Content unchanged, skipping render");
            return Ok(UpdateOutcome::Unchanged);
        }

        let (html, item_count) = match render_with(&self.settings(), raw) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(feed = %self.name, error = %e, "Feed update failed, keeping previous render");
                return Err(e);
            }
        };

        let next = FeedSnapshot::next(previous.generation, raw, content_hash, html, item_count);
        let version = next.html_feed_version_suffix.clone();
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);

        tracing::info!(
            feed = %self.name,
            items = item_count,
            version = %version,
            "Feed content changed"
        );
        Ok(UpdateOutcome::Changed {
            items: item_count,
            version,
        })
    }
}

/// Pure part of an update: raw content to HTML and rendered item count.
fn render_with(settings: &Settings, raw: &str) -> Result<(String, usize), FeedError> {
    let config = &settings.config;
    let item_template = HtmlTemplate::item(&config.html_feed_item_entry_template)?;
    let wrapper = config
        .html_wrapper
        .as_deref()
        .map(HtmlTemplate::wrapper)
        .transpose()?;

    let items = parse_items(raw);
    let items = pipeline::run(&config.preprocessing_actions, items)?;
    let items = settings.bounds.enforce(items);

    let html = render(&items, &item_template, wrapper.as_ref(), &config.name);
    Ok((html, items.len()))
}

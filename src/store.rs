//! Named collection of feeds and the entry points external collaborators use.
//!
//! A scheduler pushes raw content in through [`FeedStore::update`] or
//! [`FeedStore::update_all`]; an API layer reads cached HTML through
//! [`FeedStore::read`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, FeedConfig};
use crate::feed::{Feed, FeedError, SyndicatedFeed, UpdateOutcome};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown feed '{0}'")]
    UnknownFeed(String),

    #[error("Feed '{0}' is already registered")]
    DuplicateFeed(String),

    #[error("Feed '{name}': {source}")]
    Feed {
        name: String,
        #[source]
        source: FeedError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] crate::config::ConfigError),

    /// The blocking task running an update panicked or was cancelled
    #[error("Update task for '{0}' did not complete")]
    Join(String),
}

/// Read-only view of a feed for delivery.
///
/// `version_suffix` is meant to be embedded in a cache key or URL so that
/// downstream caches invalidate exactly when `html` changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedView {
    pub name: String,
    pub html: String,
    pub version_suffix: String,
    pub content_updated_at: Option<DateTime<Utc>>,
    pub content_hash: Option<u64>,
    pub item_count: usize,
}

/// Outcome of one feed within a batch refresh.
#[derive(Debug)]
pub struct RefreshResult {
    pub name: String,
    pub result: Result<UpdateOutcome, StoreError>,
}

/// What [`FeedStore::reconfigure`] did.
#[derive(Debug, Default)]
pub struct ReconfigureReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub rebuilt: Vec<String>,
    /// Feeds whose new configuration could not render their current content;
    /// they keep running with the previous configuration.
    pub failed: Vec<(String, FeedError)>,
}

type FeedMap = HashMap<String, Arc<dyn SyndicatedFeed>>;

/// Owns every configured feed, keyed by name.
pub struct FeedStore {
    feeds: RwLock<FeedMap>,
    concurrency: usize,
}

impl FeedStore {
    pub fn new(concurrency: usize) -> Self {
        Self {
            feeds: RwLock::new(HashMap::new()),
            concurrency: concurrency.max(1),
        }
    }

    /// Builds a store holding one empty feed per configured entry.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        config.validate()?;
        let store = Self::new(config.concurrency);
        for feed_config in &config.feeds {
            store.insert(Arc::new(build_feed(feed_config.clone())?))?;
        }
        tracing::info!(feeds = config.feeds.len(), "Feed store initialized");
        Ok(store)
    }

    fn map(&self) -> std::sync::RwLockReadGuard<'_, FeedMap> {
        self.feeds.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn map_mut(&self) -> std::sync::RwLockWriteGuard<'_, FeedMap> {
        self.feeds.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a feed. Accepts any [`SyndicatedFeed`], including test doubles.
    pub fn insert(&self, feed: Arc<dyn SyndicatedFeed>) -> Result<(), StoreError> {
        let mut feeds = self.map_mut();
        let name = feed.name().to_string();
        if feeds.contains_key(&name) {
            return Err(StoreError::DuplicateFeed(name));
        }
        feeds.insert(name, feed);
        Ok(())
    }

    /// Drops a feed and its cached state.
    pub fn remove(&self, name: &str) -> bool {
        self.map_mut().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SyndicatedFeed>> {
        self.map().get(name).cloned()
    }

    /// Feed names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.map().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    /// Delivers raw content to one feed.
    ///
    /// Blocks while another update of the same feed is in flight. The store's
    /// map lock is released before the update runs, so updates of different
    /// feeds never wait on each other.
    pub fn update(&self, name: &str, raw: &str) -> Result<UpdateOutcome, StoreError> {
        let feed = self
            .get(name)
            .ok_or_else(|| StoreError::UnknownFeed(name.to_string()))?;
        feed.update(raw).map_err(|source| StoreError::Feed {
            name: name.to_string(),
            source,
        })
    }

    /// Like [`FeedStore::update`], but fails with [`FeedError::Busy`] instead
    /// of waiting when the feed is already being updated.
    pub fn try_update(&self, name: &str, raw: &str) -> Result<UpdateOutcome, StoreError> {
        let feed = self
            .get(name)
            .ok_or_else(|| StoreError::UnknownFeed(name.to_string()))?;
        feed.try_update(raw).map_err(|source| StoreError::Feed {
            name: name.to_string(),
            source,
        })
    }

    /// Consistent read of a feed's cached render.
    pub fn read(&self, name: &str) -> Option<FeedView> {
        let feed = self.get(name)?;
        let snapshot = feed.snapshot();
        Some(FeedView {
            name: name.to_string(),
            html: snapshot.html_latest_content.to_string(),
            version_suffix: snapshot.html_feed_version_suffix.to_string(),
            content_updated_at: snapshot.content_updated_at,
            content_hash: snapshot.latest_content_hash,
            item_count: snapshot.item_count,
        })
    }

    /// Views of every feed, sorted by name.
    pub fn read_all(&self) -> Vec<FeedView> {
        self.names()
            .iter()
            .filter_map(|name| self.read(name))
            .collect()
    }

    /// Applies a batch of `(feed name, raw content)` deliveries concurrently.
    ///
    /// Up to `concurrency` updates run at once on tokio's blocking pool.
    /// Deliveries for the same feed serialize on that feed's lock; their
    /// relative order is not guaranteed. Results are returned in completion
    /// order.
    pub async fn update_all(&self, batch: Vec<(String, String)>) -> Vec<RefreshResult> {
        if batch.is_empty() {
            return Vec::new();
        }

        let total = batch.len();
        let results: Vec<RefreshResult> = stream::iter(batch)
            .map(|(name, raw)| {
                let feed = self.get(&name);
                async move {
                    let Some(feed) = feed else {
                        tracing::warn!(feed = %name, "Refresh for unknown feed");
                        return RefreshResult {
                            result: Err(StoreError::UnknownFeed(name.clone())),
                            name,
                        };
                    };

                    let task_name = name.clone();
                    let joined = tokio::task::spawn_blocking(move || feed.update(&raw)).await;
                    let result = match joined {
                        Ok(Ok(outcome)) => Ok(outcome),
                        Ok(Err(source)) => Err(StoreError::Feed {
                            name: task_name,
                            source,
                        }),
                        Err(e) => {
                            tracing::error!(feed = %name, error = %e, "Feed update task failed");
                            Err(StoreError::Join(task_name))
                        }
                    };
                    RefreshResult { name, result }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let changed = results
            .iter()
            .filter(|r| matches!(&r.result, Ok(o) if o.is_changed()))
            .count();
        let failed = results.iter().filter(|r| r.result.is_err()).count();
        tracing::info!(total, changed, failed, "Batch refresh complete");

        results
    }

    /// Brings the store in line with a new configuration.
    ///
    /// New names are added empty, missing names are dropped, and feeds whose
    /// definition changed are reconfigured in place and re-render their
    /// current content. Unchanged feeds keep their state untouched.
    ///
    /// The feed map stays write-locked throughout, so concurrent `insert`,
    /// `remove` and reads wait for the reconfiguration to finish. Updates that
    /// already hold a feed keep working on the one feed object that stays in
    /// the map.
    pub fn reconfigure(&self, config: &Config) -> Result<ReconfigureReport, StoreError> {
        config.validate()?;
        let mut report = ReconfigureReport::default();
        let mut feeds = self.map_mut();

        let wanted: HashSet<&str> = config.feeds.iter().map(|f| f.name.as_str()).collect();
        report.removed = feeds
            .keys()
            .filter(|name| !wanted.contains(name.as_str()))
            .cloned()
            .collect();
        report.removed.sort();

        // Build new feeds before touching the map so a failure leaves it as is
        let mut added: Vec<Arc<dyn SyndicatedFeed>> = Vec::new();
        for feed_config in &config.feeds {
            if !feeds.contains_key(&feed_config.name) {
                added.push(Arc::new(build_feed(feed_config.clone())?));
            }
        }

        for feed_config in &config.feeds {
            let Some(feed) = feeds.get(&feed_config.name) else {
                continue;
            };
            if *feed.config() == *feed_config {
                continue;
            }
            match feed.reconfigure(feed_config.clone()) {
                Ok(()) => report.rebuilt.push(feed_config.name.clone()),
                Err(e) => {
                    tracing::warn!(feed = %feed_config.name, error = %e, "Keeping previous configuration");
                    report.failed.push((feed_config.name.clone(), e));
                }
            }
        }

        for name in &report.removed {
            feeds.remove(name);
        }
        for feed in added {
            report.added.push(feed.name().to_string());
            feeds.insert(feed.name().to_string(), feed);
        }
        drop(feeds);

        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            rebuilt = report.rebuilt.len(),
            failed = report.failed.len(),
            "Feed store reconfigured"
        );
        Ok(report)
    }
}

fn build_feed(config: FeedConfig) -> Result<Feed, StoreError> {
    let name = config.name.clone();
    Feed::new(config).map_err(|source| StoreError::Feed { name, source })
}

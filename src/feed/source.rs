use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use super::model::{Feed, FeedError, FeedSnapshot, UpdateOutcome};
use crate::config::FeedConfig;

/// Capability contract shared by every feed the store can hold.
///
/// [`Feed`] is the production implementation; [`StubFeed`] lets tests inject
/// state and scripted update results directly.
pub trait SyndicatedFeed: Send + Sync {
    /// Fixed for the lifetime of the feed.
    fn name(&self) -> &str;

    fn config(&self) -> Arc<FeedConfig>;

    fn snapshot(&self) -> Arc<FeedSnapshot>;

    fn update(&self, raw: &str) -> Result<UpdateOutcome, FeedError>;

    fn try_update(&self, raw: &str) -> Result<UpdateOutcome, FeedError> {
        self.update(raw)
    }

    /// Applies a changed configuration without replacing the feed, so updates
    /// already holding a reference to it are never lost.
    fn reconfigure(&self, config: FeedConfig) -> Result<(), FeedError>;
}

impl SyndicatedFeed for Feed {
    fn name(&self) -> &str {
        Feed::name(self)
    }

    fn config(&self) -> Arc<FeedConfig> {
        Feed::config(self)
    }

    fn snapshot(&self) -> Arc<FeedSnapshot> {
        Feed::snapshot(self)
    }

    fn update(&self, raw: &str) -> Result<UpdateOutcome, FeedError> {
        Feed::update(self, raw)
    }

    fn try_update(&self, raw: &str) -> Result<UpdateOutcome, FeedError> {
        Feed::try_update(self, raw)
    }

    fn reconfigure(&self, config: FeedConfig) -> Result<(), FeedError> {
        Feed::reconfigure(self, config)
    }
}

/// Test double with directly injectable state.
///
/// Every `update` call is recorded. Results come from the scripted queue when
/// one is queued; otherwise the call reports `Unchanged` and leaves the
/// snapshot alone. `reconfigure` swaps the reported configuration.
#[derive(Debug)]
pub struct StubFeed {
    name: String,
    config: Mutex<Arc<FeedConfig>>,
    snapshot: Mutex<Arc<FeedSnapshot>>,
    scripted: Mutex<VecDeque<Result<UpdateOutcome, FeedError>>>,
    received: Mutex<Vec<String>>,
}

impl StubFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            name: config.name.clone(),
            config: Mutex::new(Arc::new(config)),
            snapshot: Mutex::new(Arc::new(FeedSnapshot::empty())),
            scripted: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the reported snapshot wholesale.
    pub fn set_snapshot(&self, snapshot: FeedSnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Queues the result of the next `update` call.
    pub fn push_result(&self, result: Result<UpdateOutcome, FeedError>) {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(result);
    }

    /// Raw content passed to `update`, in call order.
    pub fn received(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SyndicatedFeed for StubFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> Arc<FeedConfig> {
        Arc::clone(&self.config.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn snapshot(&self) -> Arc<FeedSnapshot> {
        Arc::clone(&self.snapshot.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn update(&self, raw: &str) -> Result<UpdateOutcome, FeedError> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(raw.to_string());
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Ok(UpdateOutcome::Unchanged))
    }

    fn reconfigure(&self, config: FeedConfig) -> Result<(), FeedError> {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
        Ok(())
    }
}

//! Integration tests for the feed store under concurrent updates and reads.
//!
//! Readers must never observe a hash from one content paired with HTML from
//! another, and concurrent deliveries to one feed must serialize cleanly.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use feedcast::config::{Config, FeedConfig};
use feedcast::feed::{fingerprint, Feed, FeedError, StubFeed, SyndicatedFeed, UpdateOutcome};
use feedcast::store::{FeedStore, StoreError};

fn rss(title: &str) -> String {
    format!(
        "<rss version=\"2.0\"><channel><title>c</title><item><title>{title}</title></item></channel></rss>"
    )
}

fn store_with(names: &[&str]) -> FeedStore {
    let config = Config {
        concurrency: 4,
        feeds: names
            .iter()
            .map(|n| FeedConfig::new(*n, 5, 40, "<li>{text}</li>"))
            .collect(),
    };
    FeedStore::from_config(&config).unwrap()
}

#[test]
fn test_readers_see_consistent_snapshots() {
    let feed = Arc::new(Feed::new(FeedConfig::new("race", 5, 40, "<li>{text}</li>")).unwrap());
    let contents: Vec<String> = (0..4).map(|i| rss(&format!("item-{i}"))).collect();

    thread::scope(|scope| {
        for writer in 0..2 {
            let feed = Arc::clone(&feed);
            let contents = contents.clone();
            scope.spawn(move || {
                for round in 0..200 {
                    let raw = &contents[(round + writer) % contents.len()];
                    feed.update(raw).unwrap();
                }
            });
        }

        for _ in 0..4 {
            let feed = Arc::clone(&feed);
            scope.spawn(move || {
                for _ in 0..500 {
                    let snap = feed.snapshot();
                    let Some(content) = snap.latest_content.as_deref() else {
                        continue;
                    };
                    assert_eq!(snap.latest_content_hash, Some(fingerprint(content)));
                    // Title embedded in content must match the rendered item
                    let title = content
                        .split("<title>")
                        .nth(2)
                        .and_then(|s| s.split("</title>").next())
                        .unwrap();
                    assert_eq!(&*snap.html_latest_content, format!("<li>{title}</li>"));
                }
            });
        }
    });
}

#[test]
fn test_generations_are_unique_under_contention() {
    let feed = Arc::new(Feed::new(FeedConfig::new("gen", 5, 40, "<li>{text}</li>")).unwrap());
    let versions = std::sync::Mutex::new(HashSet::new());

    thread::scope(|scope| {
        for t in 0..4 {
            let feed = Arc::clone(&feed);
            let versions = &versions;
            scope.spawn(move || {
                for i in 0..50 {
                    if let UpdateOutcome::Changed { version, .. } =
                        feed.update(&rss(&format!("{t}-{i}"))).unwrap()
                    {
                        assert!(versions.lock().unwrap().insert(version));
                    }
                }
            });
        }
    });

    let versions = versions.into_inner().unwrap();
    assert_eq!(versions.len(), 200);
    assert_eq!(feed.snapshot().generation, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_all_parallel_feeds() {
    let names: Vec<String> = (0..12).map(|i| format!("feed-{i}")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let store = store_with(&refs);

    let batch: Vec<(String, String)> = names
        .iter()
        .map(|n| (n.clone(), rss(&format!("hello {n}"))))
        .collect();
    let results = store.update_all(batch.clone()).await;

    assert_eq!(results.len(), 12);
    assert!(results
        .iter()
        .all(|r| matches!(&r.result, Ok(o) if o.is_changed())));
    for name in &names {
        let view = store.read(name).unwrap();
        assert_eq!(view.html, format!("<li>hello {name}</li>"));
    }

    // Same batch again: nothing changes
    let again = store.update_all(batch).await;
    assert!(again
        .iter()
        .all(|r| matches!(r.result, Ok(UpdateOutcome::Unchanged))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_all_same_feed_serializes() {
    let store = store_with(&["solo"]);
    let batch: Vec<(String, String)> = (0..20)
        .map(|i| ("solo".to_string(), rss(&format!("v{i}"))))
        .collect();

    let results = store.update_all(batch).await;
    assert_eq!(results.len(), 20);
    assert!(results.iter().all(|r| r.result.is_ok()));

    let snapshot = store.get("solo").unwrap().snapshot();
    assert_eq!(snapshot.generation, 20);
}

#[test]
fn test_updates_survive_concurrent_reconfigure() {
    let store = store_with(&["f"]);
    let original = store.get("f").unwrap();
    let templates = ["<li>{text}</li>", "<p>{text}</p>"];

    for round in 0..300 {
        let title = format!("latest-{round}");
        let next = Config {
            concurrency: 4,
            feeds: vec![FeedConfig::new("f", 5, 40, templates[round % 2])],
        };

        thread::scope(|scope| {
            let store = &store;
            let raw = rss(&title);
            scope.spawn(move || {
                assert!(store.update("f", &raw).unwrap().is_changed());
            });
            scope.spawn(move || {
                let report = store.reconfigure(&next).unwrap();
                assert!(report.failed.is_empty());
            });
        });

        let view = store.read("f").unwrap();
        assert!(
            view.html.contains(&title),
            "round {round}: update lost, html is {:?}",
            view.html
        );
    }

    // Reconfiguration never swaps the feed object out from under updates
    assert!(Arc::ptr_eq(&original, &store.get("f").unwrap()));
}

#[test]
fn test_reconfigure_keeps_concurrent_inserts() {
    let store = store_with(&["a"]);
    let next = Config {
        concurrency: 4,
        feeds: vec![FeedConfig::new("a", 5, 40, "<p>{text}</p>")],
    };

    thread::scope(|scope| {
        scope.spawn(|| {
            store
                .insert(Arc::new(StubFeed::new(FeedConfig::new("late", 1, 1, "{text}"))))
                .unwrap();
        });
        scope.spawn(|| store.reconfigure(&next).unwrap());
    });

    // Either the insert landed after the reconfigure, or the reconfigure saw
    // it and dropped it as unconfigured; it is never silently overwritten
    let names = store.names();
    assert!(names == vec!["a", "late"] || names == vec!["a"]);
    assert_eq!(
        store.get("a").unwrap().config().html_feed_item_entry_template,
        "<p>{text}</p>"
    );
}

#[test]
fn test_try_update_busy_through_stub() {
    let store = FeedStore::new(1);
    let stub = Arc::new(StubFeed::new(FeedConfig::new("stub", 1, 1, "{text}")));
    stub.push_result(Err(FeedError::Busy));
    store.insert(stub.clone()).unwrap();

    match store.try_update("stub", "x") {
        Err(StoreError::Feed { name, source }) => {
            assert_eq!(name, "stub");
            assert!(matches!(source, FeedError::Busy));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(stub.received(), vec!["x"]);
    assert_eq!(stub.name(), "stub");
}

#[test]
fn test_try_update_on_idle_feed() {
    let store = store_with(&["idle"]);
    assert!(store.try_update("idle", &rss("now")).unwrap().is_changed());
    assert_eq!(store.read("idle").unwrap().html, "<li>now</li>");
    assert!(matches!(
        store.try_update("missing", "x"),
        Err(StoreError::UnknownFeed(_))
    ));
}

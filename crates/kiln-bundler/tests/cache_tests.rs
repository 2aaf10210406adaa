//! Artifact cache behaviour across callers, processes and builds.

mod helpers;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use helpers::*;
use kiln_bundler::{CacheEntry, CacheStats, CacheStore, ContentHash};
use tempfile::TempDir;

#[tokio::test]
async fn concurrent_misses_build_once() {
    let cache = CacheStore::in_memory();
    let hash = ContentHash::of(b"chunk");
    let calls = AtomicUsize::new(0);

    let results = join_all((0..16).map(|_| {
        cache.get_or_build(hash, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(CacheEntry::new(vec!["src/a.js".into()], "rendered"))
        })
    }))
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap().as_str(), Some("rendered"));
    }
    assert_eq!(
        cache.stats(),
        CacheStats {
            memory_hits: 15,
            persistent_hits: 0,
            builds: 1
        }
    );
}

#[tokio::test]
async fn entries_survive_reopening() {
    let dir = TempDir::new().unwrap();
    let hash = ContentHash::of(b"chunk");

    {
        let cache = CacheStore::open(dir.path()).unwrap();
        assert!(cache.is_persistent());
        cache
            .get_or_build(hash, || async {
                Ok(CacheEntry::new(vec!["src/a.js".into()], "rendered"))
            })
            .await
            .unwrap();
    }

    let cache = CacheStore::open(dir.path()).unwrap();
    let entry = cache
        .get_or_build(hash, || async { Err(kiln_bundler::BuildError::Cancelled) })
        .await
        .unwrap();
    assert_eq!(entry.as_str(), Some("rendered"));
    assert_eq!(entry.metadata.modules, ["src/a.js"]);
    assert_eq!(cache.stats().persistent_hits, 1);
}

#[tokio::test]
async fn generations_continue_after_reopening() {
    let dir = TempDir::new().unwrap();
    {
        let cache = CacheStore::open(dir.path()).unwrap();
        cache.begin_generation().unwrap();
        cache.begin_generation().unwrap();
    }
    let cache = CacheStore::open(dir.path()).unwrap();
    assert_eq!(cache.generation(), 2);
}

#[tokio::test]
async fn a_fresh_bundler_reuses_the_persistent_cache() {
    let dir = TempDir::new().unwrap();
    let runtime = two_entry_app();
    let mut config = two_entry_config();
    config.cache.dir = Some(dir.path().to_path_buf());

    let first = {
        let bundler = bundler(&runtime, config.clone());
        assert!(bundler.cache().is_persistent());
        bundler.build().await.unwrap()
    };
    assert_eq!(first.stats.rendered, 5);

    let bundler = bundler(&runtime, config);
    let second = bundler.build().await.unwrap();
    assert_eq!(second.stats.rendered, 0);
    assert_eq!(bundler.cache().stats().persistent_hits, 5);
    assert_eq!(chunk_hashes(&first), chunk_hashes(&second));
}

#[tokio::test]
async fn superseded_artifacts_are_collected() {
    let runtime = two_entry_app();
    let mut config = two_entry_config();
    config.cache.max_idle_generations = 1;
    let cache = Arc::new(CacheStore::in_memory().max_idle_generations(1));
    let bundler = bundler(&runtime, config).with_cache(cache.clone());

    let before = bundler.build().await.unwrap();
    let old_extra = before.artifact("extra").unwrap().hash;

    runtime.insert("src/extra.js", "export function extra() { return 2; }\n");
    bundler.build().await.unwrap();
    assert!(cache.contains(&old_extra), "still within the idle window");

    bundler.build().await.unwrap();
    bundler.build().await.unwrap();
    assert!(!cache.contains(&old_extra));
    assert!(cache.contains(&before.artifact("app").unwrap().hash));
}

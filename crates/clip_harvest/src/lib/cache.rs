use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clip_store::TrimmedMetadata;
use tokio::sync::{Mutex, OnceCell};

use crate::fetcher::Fetcher;

/// What the cache keeps per URL: where the media landed in the work
/// directory and its trimmed metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFetch {
    pub media_path: PathBuf,
    pub metadata: TrimmedMetadata,
}

/// Session-scoped memo of fetches keyed by URL.
///
/// Concurrent first lookups of one URL share a single fetch. A failed fetch
/// leaves no entry behind, so the next lookup tries again.
pub struct FetchCache<F> {
    fetcher: F,
    timeout: Option<Duration>,
    entries: Mutex<HashMap<String, Arc<OnceCell<CachedFetch>>>>,
}

impl<F: Fetcher + Send + Sync> FetchCache<F> {
    pub fn new(fetcher: F, timeout: Option<Duration>) -> Self {
        Self {
            fetcher,
            timeout,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a copy of the cached entry for `url`, fetching it first if needed
    #[tracing::instrument(skip(self, workdir))]
    pub async fn get_or_fetch(&self, url: &str, workdir: &Path) -> anyhow::Result<CachedFetch> {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(url.to_string()).or_default().clone()
        };

        if cell.initialized() {
            tracing::debug!("Fetch cache hit");
        }

        let entry = cell
            .get_or_try_init(|| async {
                let fetched = match self.timeout {
                    Some(limit) => tokio::time::timeout(limit, self.fetcher.fetch(url, workdir))
                        .await
                        .map_err(|_| anyhow::anyhow!("fetch timed out after {limit:?}"))??,
                    None => self.fetcher.fetch(url, workdir).await?,
                };

                Ok::<_, anyhow::Error>(CachedFetch {
                    media_path: fetched.media_path,
                    metadata: TrimmedMetadata::trim(&fetched.metadata),
                })
            })
            .await
            .inspect_err(|e| tracing::warn!(error = ?e, "Fetch failed"))?;

        Ok(entry.clone())
    }

    /// Number of URLs with a successful fetch on record
    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops every entry; their media paths point into a work directory
    /// that no longer exists
    pub fn clear(&mut self) {
        self.entries.get_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchedMedia;
    use serde_json::{json, Value};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[derive(Clone, Default)]
    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        failures_left: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    impl Fetcher for CountingFetcher {
        async fn fetch(&self, url: &str, workdir: &Path) -> anyhow::Result<FetchedMedia> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("remote refused {url}");
            }

            let metadata = json!({ "title": url, "formats": [] });
            Ok(FetchedMedia {
                media_path: workdir.join("[1].mp4"),
                metadata: metadata.as_object().cloned().unwrap_or_default(),
            })
        }
    }

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let fetcher = CountingFetcher::default();
        let calls = fetcher.calls.clone();
        let cache = FetchCache::new(fetcher, None);
        let workdir = Path::new("/tmp/work");

        let first = cache.get_or_fetch("https://a", workdir).await.unwrap();
        let second = cache.get_or_fetch("https://a", workdir).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert!(first.metadata.get("formats").is_none(), "metadata is trimmed");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_returned_entries_are_copies() {
        let cache = FetchCache::new(CountingFetcher::default(), None);
        let workdir = Path::new("/tmp/work");

        let mut first = cache.get_or_fetch("https://a", workdir).await.unwrap();
        first.metadata.insert("url", Value::from("mutated"));
        first.metadata.insert("title", Value::from("mutated"));

        let second = cache.get_or_fetch("https://a", workdir).await.unwrap();
        assert!(second.metadata.get("url").is_none());
        assert_eq!(second.metadata.get("title"), Some(&Value::from("https://a")));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let fetcher = CountingFetcher {
            failures_left: Arc::new(AtomicUsize::new(1)),
            ..Default::default()
        };
        let calls = fetcher.calls.clone();
        let cache = FetchCache::new(fetcher, None);
        let workdir = Path::new("/tmp/work");

        let err = cache.get_or_fetch("https://a", workdir).await.unwrap_err();
        assert!(err.to_string().contains("remote refused"));
        assert!(cache.is_empty().await);

        assert!(cache.get_or_fetch("https://a", workdir).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_fetch() {
        let fetcher = CountingFetcher {
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let calls = fetcher.calls.clone();
        let cache = FetchCache::new(fetcher, None);
        let workdir = Path::new("/tmp/work");

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch("https://a", workdir),
            cache.get_or_fetch("https://a", workdir),
            cache.get_or_fetch("https://b", workdir),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cleared_cache_fetches_again() {
        let fetcher = CountingFetcher::default();
        let calls = fetcher.calls.clone();
        let mut cache = FetchCache::new(fetcher, None);

        cache.get_or_fetch("https://a", Path::new("/tmp/old")).await.unwrap();
        cache.clear();
        assert!(cache.is_empty().await);

        let entry = cache.get_or_fetch("https://a", Path::new("/tmp/new")).await.unwrap();
        assert_eq!(entry.media_path, Path::new("/tmp/new/[1].mp4"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_fetch_times_out() {
        let fetcher = CountingFetcher {
            delay: Some(Duration::from_secs(120)),
            ..Default::default()
        };
        let cache = FetchCache::new(fetcher, Some(Duration::from_secs(5)));

        let err = cache
            .get_or_fetch("https://a", Path::new("/tmp/work"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(cache.is_empty().await);
    }
}

use std::{
    collections::HashSet,
    path::Path,
    sync::{Arc, Mutex},
};

use clip_harvest::{FetchedMedia, Fetcher};
use serde_json::json;

/// Writes `[<last url segment>].mp4` into the work directory, like yt-dlp
/// would, and records every URL it was asked for.
#[derive(Clone, Default)]
pub struct MockFetcher {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub failing_urls: HashSet<String>,
}

impl MockFetcher {
    pub fn failing_for(urls: &[&str]) -> Self {
        Self {
            failing_urls: urls.iter().map(|url| url.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, workdir: &Path) -> anyhow::Result<FetchedMedia> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.failing_urls.contains(url) {
            return Err(anyhow::anyhow!("Unable to extract video data from {url}"));
        }

        let id = url.rsplit('/').find(|part| !part.is_empty()).unwrap_or("video");
        let media_path = workdir.join(format!("[{id}].mp4"));
        tokio::fs::write(&media_path, format!("video {url}")).await?;

        let metadata = json!({
            "id": id,
            "title": format!("clip {id}"),
            "fulltitle": format!("clip {id} #fyp"),
            "like_count": 42,
            "timestamp": 1700000000,
            "uploader_url": "https://www.tiktok.com/@someone",
            "formats": [{"format_id": "h264_540p"}],
            "http_headers": {"User-Agent": "mock"},
            "requested_downloads": [{"filepath": media_path.to_string_lossy()}],
        });

        Ok(FetchedMedia {
            media_path,
            metadata: metadata.as_object().cloned().unwrap(),
        })
    }
}

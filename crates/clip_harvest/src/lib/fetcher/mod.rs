pub mod yt_dlp;

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};

/// Output of one remote fetch: a media file written somewhere under the
/// session work directory plus the provider's raw metadata.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub media_path: PathBuf,
    pub metadata: Map<String, Value>,
}

/// Retrieves the video behind a URL.
///
/// Implementations must only write inside `workdir`; it is removed when the
/// archive session ends.
pub trait Fetcher {
    fn fetch(
        &self,
        url: &str,
        workdir: &Path,
    ) -> impl Future<Output = anyhow::Result<FetchedMedia>> + Send;
}

impl<T: Fetcher + Send + Sync> Fetcher for &T {
    async fn fetch(&self, url: &str, workdir: &Path) -> anyhow::Result<FetchedMedia> {
        (**self).fetch(url, workdir).await
    }
}

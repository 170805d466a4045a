use std::path::{Path, PathBuf};

use clip_store::{ChatEntry, FsSidecarStore, SidecarStore, StoredVideo, VideoMetadataRecord};
use serde_json::Value;

/// Real filesystem store whose sidecar writes can be made to fail.
#[derive(Clone)]
pub struct MockSidecarStore {
    pub inner: FsSidecarStore,
    pub fail_records_with: Option<String>,
}

impl MockSidecarStore {
    pub fn failing_records(root: &Path, msg: &str) -> Self {
        Self {
            inner: FsSidecarStore::new(root),
            fail_records_with: Some(msg.to_string()),
        }
    }
}

impl SidecarStore for MockSidecarStore {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    async fn ensure_folder(&self, folder: &Path) -> anyhow::Result<PathBuf> {
        self.inner.ensure_folder(folder).await
    }

    async fn store_media(&self, source: &Path, stem_path: &Path) -> anyhow::Result<PathBuf> {
        self.inner.store_media(source, stem_path).await
    }

    async fn store_record(
        &self,
        stem_path: &Path,
        record: &VideoMetadataRecord,
    ) -> anyhow::Result<PathBuf> {
        if let Some(ref msg) = self.fail_records_with {
            return Err(anyhow::anyhow!("{}", msg));
        }
        self.inner.store_record(stem_path, record).await
    }

    async fn list_records(&self, folder: &Path) -> anyhow::Result<Vec<StoredVideo>> {
        self.inner.list_records(folder).await
    }

    async fn store_transcript(
        &self,
        recipient: &str,
        messages: &[Value],
    ) -> anyhow::Result<PathBuf> {
        self.inner.store_transcript(recipient, messages).await
    }

    async fn list_transcripts(&self) -> anyhow::Result<Vec<String>> {
        self.inner.list_transcripts().await
    }

    async fn read_chat(&self, recipient: &str) -> anyhow::Result<Vec<ChatEntry>> {
        self.inner.read_chat(recipient).await
    }
}

use std::{
    future::Future,
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{ChatEntry, StoredVideo, VideoMetadataRecord};

pub mod fs;

/// Durable side of an archive: media files, their sidecars and chat
/// transcripts, all addressed relative to one root directory.
pub trait SidecarStore {
    fn root(&self) -> &Path;

    /// Creates `folder` under the root if needed and returns its full path
    fn ensure_folder(&self, folder: &Path) -> impl Future<Output = anyhow::Result<PathBuf>> + Send;

    /// Copies `source` to `stem_path` + the source's extension.
    ///
    /// Returns the final media path.
    fn store_media(
        &self,
        source: &Path,
        stem_path: &Path,
    ) -> impl Future<Output = anyhow::Result<PathBuf>> + Send;

    /// Writes `record` as the sidecar of `stem_path`, returning the sidecar path
    fn store_record(
        &self,
        stem_path: &Path,
        record: &VideoMetadataRecord,
    ) -> impl Future<Output = anyhow::Result<PathBuf>> + Send;

    /// Reads every sidecar in `folder`, newest stem first
    fn list_records(
        &self,
        folder: &Path,
    ) -> impl Future<Output = anyhow::Result<Vec<StoredVideo>>> + Send;

    /// Saves the raw messages of one chat as `chats/<recipient>.json`
    fn store_transcript(
        &self,
        recipient: &str,
        messages: &[Value],
    ) -> impl Future<Output = anyhow::Result<PathBuf>> + Send;

    /// Recipients that have a stored transcript
    fn list_transcripts(&self) -> impl Future<Output = anyhow::Result<Vec<String>>> + Send;

    /// The transcript of `recipient` joined with the videos archived from it.
    ///
    /// A recipient without a transcript has an empty chat.
    fn read_chat(
        &self,
        recipient: &str,
    ) -> impl Future<Output = anyhow::Result<Vec<ChatEntry>>> + Send;
}

impl<T: SidecarStore + Send + Sync> SidecarStore for &T {
    fn root(&self) -> &Path {
        (**self).root()
    }

    async fn ensure_folder(&self, folder: &Path) -> anyhow::Result<PathBuf> {
        (**self).ensure_folder(folder).await
    }

    async fn store_media(&self, source: &Path, stem_path: &Path) -> anyhow::Result<PathBuf> {
        (**self).store_media(source, stem_path).await
    }

    async fn store_record(
        &self,
        stem_path: &Path,
        record: &VideoMetadataRecord,
    ) -> anyhow::Result<PathBuf> {
        (**self).store_record(stem_path, record).await
    }

    async fn list_records(&self, folder: &Path) -> anyhow::Result<Vec<StoredVideo>> {
        (**self).list_records(folder).await
    }

    async fn store_transcript(
        &self,
        recipient: &str,
        messages: &[Value],
    ) -> anyhow::Result<PathBuf> {
        (**self).store_transcript(recipient, messages).await
    }

    async fn list_transcripts(&self) -> anyhow::Result<Vec<String>> {
        (**self).list_transcripts().await
    }

    async fn read_chat(&self, recipient: &str) -> anyhow::Result<Vec<ChatEntry>> {
        (**self).read_chat(recipient).await
    }
}

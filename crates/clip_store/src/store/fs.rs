use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use itertools::Itertools;
use serde_json::Value;

use crate::{
    allocator::{sidecar_path, with_suffix},
    store::SidecarStore,
    ChatEntry, StoredVideo, VideoMetadataRecord, CHATS_FOLDER,
};

/// Suffix of files that are still being written
const PARTIAL_SUFFIX: &str = ".part";

/// [`SidecarStore`] backed by a plain directory tree.
///
/// Media and sidecars are written under a `.part` name and renamed into
/// place, so readers never observe half-written files.
#[derive(Debug, Clone)]
pub struct FsSidecarStore {
    root: PathBuf,
}

impl FsSidecarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsSidecarStore { root: root.into() }
    }

    /// Deletes the whole archive root and recreates it empty
    pub async fn reset(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => tracing::info!(root = ?self.root, "Removed previous archive"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).context(format!("Failed to remove {}", self.root.display()));
            }
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create {}", self.root.display()))
    }

    async fn write_atomically(&self, dest: &Path, contents: &[u8]) -> anyhow::Result<()> {
        let partial = with_suffix(dest, PARTIAL_SUFFIX);
        tokio::fs::write(&partial, contents)
            .await
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        tokio::fs::rename(&partial, dest)
            .await
            .with_context(|| format!("Failed to move {} into place", dest.display()))
    }
}

impl SidecarStore for FsSidecarStore {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_folder(&self, folder: &Path) -> anyhow::Result<PathBuf> {
        let path = self.root.join(folder);
        tokio::fs::create_dir_all(&path)
            .await
            .inspect_err(|e| tracing::error!(error = ?e, path = ?path, "Failed to create folder"))
            .with_context(|| format!("Failed to create folder {}", path.display()))?;
        Ok(path)
    }

    #[tracing::instrument(skip(self))]
    async fn store_media(&self, source: &Path, stem_path: &Path) -> anyhow::Result<PathBuf> {
        let dest = match source.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => with_suffix(stem_path, &format!(".{ext}")),
            None => stem_path.to_path_buf(),
        };
        let partial = with_suffix(&dest, PARTIAL_SUFFIX);

        if let Err(e) = tokio::fs::copy(source, &partial).await {
            tracing::error!(error = ?e, source = ?source, "Failed to copy media");
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e).context(format!("Failed to copy {}", source.display()));
        }

        tokio::fs::rename(&partial, &dest)
            .await
            .with_context(|| format!("Failed to move {} into place", dest.display()))?;

        Ok(dest)
    }

    #[tracing::instrument(skip(self, record), fields(url = %record.url))]
    async fn store_record(
        &self,
        stem_path: &Path,
        record: &VideoMetadataRecord,
    ) -> anyhow::Result<PathBuf> {
        let dest = sidecar_path(stem_path);
        let payload = serde_json::to_vec_pretty(record).context("Failed to serialize sidecar")?;

        self.write_atomically(&dest, &payload).await?;
        tracing::debug!(path = ?dest, "Wrote sidecar");

        Ok(dest)
    }

    #[tracing::instrument(skip(self))]
    async fn list_records(&self, folder: &Path) -> anyhow::Result<Vec<StoredVideo>> {
        let dir = self.root.join(folder);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context(format!("Failed to read {}", dir.display())),
        };

        let mut videos = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let sidecar = match tokio::fs::read(&path)
                .await
                .map_err(anyhow::Error::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<Value>(&bytes)?))
            {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    tracing::debug!(path = ?path, "Skipping non-object json file");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = ?e, path = ?path, "Skipping unreadable sidecar");
                    continue;
                }
            };

            videos.push(StoredVideo::from_sidecar(stem, &sidecar));
        }

        Ok(videos
            .into_iter()
            .sorted_by(|a, b| b.stem.cmp(&a.stem))
            .collect())
    }

    async fn store_transcript(
        &self,
        recipient: &str,
        messages: &[Value],
    ) -> anyhow::Result<PathBuf> {
        let folder = self.ensure_folder(Path::new(CHATS_FOLDER)).await?;
        let dest = folder.join(format!("{recipient}.json"));
        let payload = serde_json::to_vec(messages).context("Failed to serialize transcript")?;

        self.write_atomically(&dest, &payload).await?;
        Ok(dest)
    }

    async fn list_transcripts(&self) -> anyhow::Result<Vec<String>> {
        let dir = self.root.join(CHATS_FOLDER);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context(format!("Failed to read {}", dir.display())),
        };

        let mut recipients = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file || path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                recipients.push(stem.to_string());
            }
        }
        recipients.sort();

        Ok(recipients)
    }

    #[tracing::instrument(skip(self))]
    async fn read_chat(&self, recipient: &str) -> anyhow::Result<Vec<ChatEntry>> {
        let transcript = self
            .root
            .join(CHATS_FOLDER)
            .join(format!("{recipient}.json"));
        let bytes = match tokio::fs::read(&transcript).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context(format!("Failed to read {}", transcript.display())),
        };
        let messages: Vec<Value> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Malformed transcript {}", transcript.display()))?;

        let videos: HashMap<String, StoredVideo> = self
            .list_records(&Path::new(CHATS_FOLDER).join(recipient))
            .await?
            .into_iter()
            .filter_map(|video| video.url.clone().map(|url| (url, video)))
            .collect();

        Ok(messages
            .iter()
            .filter_map(|message| match message {
                Value::Object(message) => {
                    Some(ChatEntry::from_message(recipient, message, &videos))
                }
                _ => {
                    tracing::debug!("Skipping non-object chat message");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatBody, TrimmedMetadata, FAVORITED_FOLDER};
    use chrono::NaiveDate;
    use serde_json::json;

    fn record(url: &str, day: u32) -> VideoMetadataRecord {
        let at = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let raw = json!({ "fulltitle": format!("clip {day}"), "timestamp": 1700000000 });
        VideoMetadataRecord::new(
            TrimmedMetadata::trim(raw.as_object().unwrap()),
            url,
            at,
            "unused",
        )
    }

    #[tokio::test]
    async fn test_media_keeps_source_extension() {
        let root = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let source = work.path().join("[123].mp4");
        tokio::fs::write(&source, b"video bytes").await.unwrap();

        let store = FsSidecarStore::new(root.path());
        let folder = store.ensure_folder(Path::new(FAVORITED_FOLDER)).await.unwrap();
        let dest = store
            .store_media(&source, &folder.join("20240101_000000"))
            .await
            .unwrap();

        assert_eq!(dest, folder.join("20240101_000000.mp4"));
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"video bytes");
        assert!(!with_suffix(&dest, PARTIAL_SUFFIX).exists());
    }

    #[tokio::test]
    async fn test_missing_media_source_fails_without_leftovers() {
        let root = tempfile::tempdir().unwrap();
        let store = FsSidecarStore::new(root.path());
        let folder = store.ensure_folder(Path::new("liked")).await.unwrap();

        let result = store
            .store_media(Path::new("/nonexistent/[1].mp4"), &folder.join("stem"))
            .await;

        assert!(result.is_err());
        let mut entries = tokio::fs::read_dir(&folder).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_records_round_trip_through_listing() {
        let root = tempfile::tempdir().unwrap();
        let store = FsSidecarStore::new(root.path());
        let folder = store.ensure_folder(Path::new("liked")).await.unwrap();

        store
            .store_record(&folder.join("20240101_000000"), &record("https://a", 1))
            .await
            .unwrap();
        store
            .store_record(&folder.join("20240102_000000"), &record("https://b", 2))
            .await
            .unwrap();
        tokio::fs::write(folder.join("broken.json"), b"{not json")
            .await
            .unwrap();

        let videos = store.list_records(Path::new("liked")).await.unwrap();
        let stems = videos.iter().map(|v| v.stem.as_str()).collect::<Vec<_>>();
        assert_eq!(stems, vec!["20240102_000000", "20240101_000000"]);
        assert_eq!(videos[0].url.as_deref(), Some("https://b"));
        assert_eq!(videos[1].fulltitle.as_deref(), Some("clip 1"));
    }

    #[tokio::test]
    async fn test_listing_missing_folder_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let store = FsSidecarStore::new(root.path());

        assert!(store.list_records(Path::new("liked")).await.unwrap().is_empty());
        assert!(store.list_transcripts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transcripts_are_listed_by_recipient() {
        let root = tempfile::tempdir().unwrap();
        let store = FsSidecarStore::new(root.path());
        let messages = vec![json!({"From": "bob", "Content": "hi", "Date": "2024-01-01 00:00:00"})];

        store.store_transcript("carol", &messages).await.unwrap();
        let path = store.store_transcript("bob", &messages).await.unwrap();
        // video folders next to the transcripts are not recipients
        store
            .ensure_folder(&Path::new(CHATS_FOLDER).join("bob"))
            .await
            .unwrap();

        assert_eq!(path, root.path().join("chats").join("bob.json"));
        assert_eq!(store.list_transcripts().await.unwrap(), vec!["bob", "carol"]);

        let saved: Vec<Value> =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(saved, messages);
    }

    #[tokio::test]
    async fn test_chat_is_joined_with_archived_videos() {
        let root = tempfile::tempdir().unwrap();
        let store = FsSidecarStore::new(root.path());
        let folder = store
            .ensure_folder(&Path::new(CHATS_FOLDER).join("bob"))
            .await
            .unwrap();
        store
            .store_record(
                &folder.join("20240101_000000"),
                &record("https://www.tiktokv.com/1", 1),
            )
            .await
            .unwrap();

        let messages = vec![
            json!({"From": "bob", "Content": "https://www.tiktokv.com/1", "Date": "2024-01-01 00:00:00"}),
            json!({"From": "me", "Content": "[https://media.giphy.com/x.gif]", "Date": "2024-01-01 00:01:00"}),
            json!({"From": "me", "Content": "nice", "Date": "2024-01-01 00:02:00"}),
        ];
        store.store_transcript("bob", &messages).await.unwrap();

        let chat = store.read_chat("bob").await.unwrap();
        assert_eq!(chat.len(), 3);
        assert!(chat[0].incoming);
        match &chat[0].body {
            ChatBody::Video { url, video: Some(video) } => {
                assert_eq!(url, "https://www.tiktokv.com/1");
                assert_eq!(video.stem, "20240101_000000");
                assert_eq!(video.fulltitle.as_deref(), Some("clip 1"));
            }
            other => panic!("expected an archived video, got {other:?}"),
        }
        assert!(!chat[1].incoming);
        assert_eq!(chat[1].body, ChatBody::Gif("https://media.giphy.com/x.gif".to_string()));
        assert_eq!(chat[2].body, ChatBody::Text("nice".to_string()));
    }

    #[tokio::test]
    async fn test_chat_without_transcript_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let store = FsSidecarStore::new(root.path());

        assert!(store.read_chat("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_empties_root() {
        let root = tempfile::tempdir().unwrap();
        let store = FsSidecarStore::new(root.path().join("media"));
        store.ensure_folder(Path::new("liked")).await.unwrap();

        store.reset().await.unwrap();

        let mut entries = tokio::fs::read_dir(store.root()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }
}

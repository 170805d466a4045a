pub mod builder;

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use chrono::NaiveDateTime;
use clip_store::{PathAllocator, SidecarStore, VideoMetadataRecord, STEM_DATE_FORMAT};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    cache::FetchCache,
    error::{Error, RecordError},
    export::ExportLists,
    fetcher::Fetcher,
    progress::{BatchResult, BatchStats, ProgressEvent, ProgressSink, RecordOutcome},
    source::{
        parse_export_date, path_component, DownloadTask, FavoriteVideos, LikedVideos,
        RecordShape, RecordSource,
    },
    workdir::WorkDir,
};

/// One archive run: owns the fetch cache, the stem allocator and, while
/// open, the private work directory the fetcher writes into.
///
/// Downloads are only possible between [`ArchiveSession::enter`] and
/// [`ArchiveSession::exit`]; dropping the session exits it.
pub struct ArchiveSession<F, S> {
    workdir_parent: PathBuf,
    workdir: Option<WorkDir>,
    store: S,
    cache: FetchCache<F>,
    allocator: PathAllocator,
    cancel: CancellationToken,
}

impl<F, S> ArchiveSession<F, S>
where
    F: Fetcher + Send + Sync,
    S: SidecarStore + Send + Sync,
{
    /// Opens the session by creating its work directory.
    ///
    /// A fresh work directory starts with an empty fetch cache and no stem
    /// reservations.
    pub fn enter(&mut self) -> Result<&Path, Error> {
        if self.workdir.is_none() {
            self.cache.clear();
            self.allocator.clear();
            self.workdir = Some(WorkDir::create_in(&self.workdir_parent)?);
            tracing::info!(root = ?self.store.root(), "Archive session opened");
        }
        self.workdir()
    }

    /// Closes the session, removing the work directory and forgetting what
    /// was fetched into it
    pub fn exit(&mut self) {
        self.cache.clear();
        self.allocator.clear();
        if self.workdir.take().is_some() {
            tracing::info!("Archive session closed");
        }
    }

    pub fn is_active(&self) -> bool {
        self.workdir.is_some()
    }

    pub fn workdir(&self) -> Result<&Path, Error> {
        self.workdir
            .as_ref()
            .map(WorkDir::path)
            .ok_or(Error::ScopeNotActive)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &FetchCache<F> {
        &self.cache
    }

    /// Token that stops record lists at the next record boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Downloads one video into `folder` and writes its sidecar.
    ///
    /// The stem is the interaction time (`YYYYMMDD_HHMMSS`), suffixed with
    /// `_N` when taken. Media is written before the sidecar; if the sidecar
    /// cannot be written the media is removed again.
    #[tracing::instrument(skip(self))]
    pub async fn download_single_video(
        &self,
        url: &str,
        interacted_at: NaiveDateTime,
        folder: &Path,
    ) -> anyhow::Result<VideoMetadataRecord> {
        let workdir = self.workdir()?;

        let dest_folder = self.store.ensure_folder(folder).await?;
        let stem = interacted_at.format(STEM_DATE_FORMAT).to_string();
        let stem_path = self.allocator.allocate(&dest_folder, &stem);

        let result = self
            .persist_video(url, interacted_at, workdir, &stem_path)
            .await;
        if result.is_err() {
            self.allocator.release(&stem_path);
        }
        result
    }

    async fn persist_video(
        &self,
        url: &str,
        interacted_at: NaiveDateTime,
        workdir: &Path,
        stem_path: &Path,
    ) -> anyhow::Result<VideoMetadataRecord> {
        let fetched = self.cache.get_or_fetch(url, workdir).await?;

        let media_path = self
            .store
            .store_media(&fetched.media_path, stem_path)
            .await?;

        let record = VideoMetadataRecord::new(
            fetched.metadata,
            url,
            interacted_at,
            media_path.to_string_lossy(),
        );

        if let Err(e) = self.store.store_record(stem_path, &record).await {
            tracing::error!(error = ?e, path = ?stem_path, "Failed to write sidecar");
            match tokio::fs::remove_file(&media_path).await {
                Ok(()) => {}
                Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => {}
                Err(rm) => {
                    tracing::warn!(
                        error = ?rm,
                        path = ?media_path,
                        "Failed to remove orphaned media"
                    )
                }
            }
            return Err(e);
        }

        Ok(record)
    }

    /// Runs every record of one list through select, extract and download,
    /// narrating each outcome into `sink` and finishing with a summary.
    ///
    /// Per-record failures are narrated and never returned. Errors only come
    /// from a closed session, a cancelled run or a dropped progress receiver.
    #[tracing::instrument(skip_all, fields(list = %source.description(), len = records.len()))]
    pub async fn download_video_list<R>(
        &self,
        records: &[Value],
        source: &R,
        sink: &ProgressSink,
    ) -> Result<BatchResult, Error>
    where
        R: RecordShape + ?Sized,
    {
        self.workdir()?;

        let started = Instant::now();
        let description = source.description();
        let folder = source.folder();
        let mut stats = BatchStats::default();

        for record in records {
            if self.cancel.is_cancelled() {
                tracing::info!(total = stats.total, "Record list cancelled");
                return Err(Error::Cancelled);
            }

            let outcome = match prepare_task(source, record, &folder) {
                Err(outcome) => outcome,
                Ok(task) => match self
                    .download_single_video(&task.url, task.interacted_at, &task.folder)
                    .await
                {
                    Ok(_) => RecordOutcome::Downloaded(task),
                    Err(e) => {
                        tracing::warn!(error = ?e, url = %task.url, "Download failed");
                        RecordOutcome::DownloadFailed(task, RecordError::Download(e))
                    }
                },
            };

            stats.record(&outcome);
            sink.emit(stats.narrate(outcome, record, records.len(), &description))
                .await?;
        }

        let result = BatchResult {
            description,
            total: stats.total,
            success: stats.success,
            duration: started.elapsed(),
        };
        tracing::info!(
            total = result.total,
            success = result.success,
            seconds = result.duration_seconds(),
            "Record list done"
        );
        sink.emit(ProgressEvent::Summary(result.clone())).await?;

        Ok(result)
    }

    pub async fn download_chat_videos(
        &self,
        recipient: &str,
        messages: &[Value],
        sink: &ProgressSink,
    ) -> Result<BatchResult, Error> {
        self.download_video_list(messages, &RecordSource::chat(recipient), sink)
            .await
    }

    pub async fn download_favorited_videos(
        &self,
        records: &[Value],
        sink: &ProgressSink,
    ) -> Result<BatchResult, Error> {
        self.download_video_list(records, &RecordSource::Favorites(FavoriteVideos), sink)
            .await
    }

    pub async fn download_liked_videos(
        &self,
        records: &[Value],
        sink: &ProgressSink,
    ) -> Result<BatchResult, Error> {
        self.download_video_list(records, &RecordSource::Likes(LikedVideos), sink)
            .await
    }

    /// Archives every list of an export: each chat (saving its transcript
    /// afterwards), then favorites, then likes.
    #[tracing::instrument(skip_all, fields(chats = export.chats.len()))]
    pub async fn archive_export(
        &self,
        export: &ExportLists,
        sink: &ProgressSink,
    ) -> Result<Vec<BatchResult>, Error> {
        let mut results = Vec::with_capacity(export.chats.len() + 2);

        for chat in &export.chats {
            let description = format!("chat videos for {}", chat.recipient);
            sink.emit(ProgressEvent::ListStarted {
                description: description.clone(),
            })
            .await?;
            results.push(
                self.download_chat_videos(&chat.recipient, &chat.messages, sink)
                    .await?,
            );
            sink.emit(ProgressEvent::ListFinished { description }).await?;

            self.store
                .store_transcript(&path_component(&chat.recipient), &chat.messages)
                .await
                .map_err(Error::Store)?;
        }

        let description = "favorited videos".to_string();
        sink.emit(ProgressEvent::ListStarted {
            description: description.clone(),
        })
        .await?;
        results.push(
            self.download_favorited_videos(&export.favorites, sink)
                .await?,
        );
        sink.emit(ProgressEvent::ListFinished { description }).await?;

        let description = "liked videos".to_string();
        sink.emit(ProgressEvent::ListStarted {
            description: description.clone(),
        })
        .await?;
        results.push(self.download_liked_videos(&export.likes, sink).await?);
        sink.emit(ProgressEvent::ListFinished { description }).await?;

        sink.emit(ProgressEvent::Completed).await?;
        Ok(results)
    }
}

impl<F, S> Drop for ArchiveSession<F, S> {
    fn drop(&mut self) {
        if self.workdir.take().is_some() {
            tracing::debug!("Archive session dropped while open");
        }
    }
}

/// Selection and extraction for one record; `Err` carries the outcome of a
/// record that never reaches the download step.
fn prepare_task<R>(source: &R, record: &Value, folder: &Path) -> Result<DownloadTask, RecordOutcome>
where
    R: RecordShape + ?Sized,
{
    match source.select(record) {
        Ok(true) => {}
        Ok(false) => return Err(RecordOutcome::Rejected),
        Err(e) => return Err(RecordOutcome::SelectionFailed(e)),
    }

    let url = source
        .extract_url(record)
        .map_err(RecordOutcome::ExtractionFailed)?;
    let interacted_at = source
        .extract_date_string(record)
        .and_then(|date| parse_export_date(&date))
        .map_err(RecordOutcome::DateParseFailed)?;

    Ok(DownloadTask {
        url,
        interacted_at,
        folder: folder.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ChatMessages;
    use serde_json::json;

    #[test]
    fn test_prepare_task_decision_table() {
        let chat = ChatMessages::new("alice");
        let folder = chat.folder();

        let ok = json!({"Content": "https://www.tiktokv.com/1", "Date": "2024-01-01 00:00:00"});
        let task = prepare_task(&chat, &ok, &folder).unwrap();
        assert_eq!(task.url, "https://www.tiktokv.com/1");
        assert_eq!(task.folder, folder);

        let text = json!({"Content": "hello", "Date": "2024-01-01 00:00:00"});
        assert!(matches!(
            prepare_task(&chat, &text, &folder),
            Err(RecordOutcome::Rejected)
        ));

        let no_content = json!({"Date": "2024-01-01 00:00:00"});
        assert!(matches!(
            prepare_task(&chat, &no_content, &folder),
            Err(RecordOutcome::SelectionFailed(_))
        ));

        let bad_date = json!({"Content": "https://www.tiktokv.com/1", "Date": "yesterday"});
        assert!(matches!(
            prepare_task(&chat, &bad_date, &folder),
            Err(RecordOutcome::DateParseFailed(RecordError::DateParse { .. }))
        ));

        let no_date = json!({"Content": "https://www.tiktokv.com/1"});
        assert!(matches!(
            prepare_task(&chat, &no_date, &folder),
            Err(RecordOutcome::DateParseFailed(RecordError::Extraction(_)))
        ));

        let no_link = json!({"Date": "2024-01-01 00:00:00"});
        assert!(matches!(
            prepare_task(&FavoriteVideos, &no_link, Path::new("favorited")),
            Err(RecordOutcome::ExtractionFailed(_))
        ));
    }
}

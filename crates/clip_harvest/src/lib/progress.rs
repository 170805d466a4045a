use std::{fmt, time::Duration};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    error::{Error, RecordError},
    source::DownloadTask,
};

/// Final tally of one record list.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub description: String,
    pub total: usize,
    pub success: usize,
    pub duration: Duration,
}

impl BatchResult {
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }
}

/// What happened to one record. Produced by the pipeline, folded into
/// [`BatchStats`] and then narrated.
#[derive(Debug)]
pub enum RecordOutcome {
    Rejected,
    SelectionFailed(RecordError),
    ExtractionFailed(RecordError),
    DateParseFailed(RecordError),
    Downloaded(DownloadTask),
    DownloadFailed(DownloadTask, RecordError),
}

impl RecordOutcome {
    /// Whether the record counts toward `total`
    pub fn is_counted(&self) -> bool {
        !matches!(self, Self::Rejected | Self::SelectionFailed(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Downloaded(_))
    }
}

/// Running counters of a record list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub total: usize,
    pub success: usize,
}

impl BatchStats {
    pub fn record(&mut self, outcome: &RecordOutcome) {
        if outcome.is_counted() {
            self.total += 1;
        }
        if outcome.is_success() {
            self.success += 1;
        }
    }

    /// Narration for `outcome`, which must be the outcome just recorded
    pub fn narrate(
        &self,
        outcome: RecordOutcome,
        record: &Value,
        list_len: usize,
        description: &str,
    ) -> ProgressEvent {
        let position = |task: &DownloadTask| RecordPosition {
            url: task.url.clone(),
            date: task.interacted_at.to_string(),
            ordinal: self.total,
            percent: self.total as f64 * 100.0 / list_len.max(1) as f64,
            description: description.to_string(),
        };

        match outcome {
            RecordOutcome::Rejected => ProgressEvent::Rejected {
                description: description.to_string(),
            },
            RecordOutcome::SelectionFailed(reason) => ProgressEvent::SelectionFailed {
                record: record.to_string(),
                reason: reason.to_string(),
            },
            RecordOutcome::ExtractionFailed(reason) => ProgressEvent::ExtractionFailed {
                record: record.to_string(),
                reason: reason.to_string(),
            },
            RecordOutcome::DateParseFailed(reason) => ProgressEvent::DateParseFailed {
                record: record.to_string(),
                reason: reason.to_string(),
            },
            RecordOutcome::Downloaded(task) => ProgressEvent::Downloaded(position(&task)),
            RecordOutcome::DownloadFailed(task, reason) => ProgressEvent::DownloadFailed {
                position: position(&task),
                reason: reason.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordPosition {
    pub url: String,
    pub date: String,
    pub ordinal: usize,
    pub percent: f64,
    pub description: String,
}

impl fmt::Display for RecordPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "url=\"{}\", date=\"{}\" (#{} or {:.1}% in {})",
            self.url, self.date, self.ordinal, self.percent, self.description
        )
    }
}

/// One line of the live progress narration.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started,
    ListStarted { description: String },
    ListFinished { description: String },
    Rejected { description: String },
    SelectionFailed { record: String, reason: String },
    ExtractionFailed { record: String, reason: String },
    DateParseFailed { record: String, reason: String },
    Downloaded(RecordPosition),
    DownloadFailed { position: RecordPosition, reason: String },
    Summary(BatchResult),
    Completed,
    Aborted { reason: String },
}

impl ProgressEvent {
    /// Frames the event for a `text/event-stream` response
    pub fn to_sse_frame(&self) -> String {
        format!("data: {self}\n\n")
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "Starting processing..."),
            Self::ListStarted { description } => write!(f, "Downloading {description}..."),
            Self::ListFinished { description } => write!(f, "Finished {description}."),
            Self::Rejected { description } => {
                write!(f, "Skipping record not matching {description}")
            }
            Self::SelectionFailed { record, reason } => write!(
                f,
                "filter failed unexpectedly for {record} ({reason}), skipping"
            ),
            Self::ExtractionFailed { record, reason } => write!(
                f,
                "url extraction failed unexpectedly for {record} ({reason}), skipping"
            ),
            Self::DateParseFailed { record, reason } => write!(
                f,
                "date extraction failed unexpectedly for {record} ({reason}), skipping"
            ),
            Self::Downloaded(position) => write!(f, "Downloaded {position}"),
            Self::DownloadFailed { position, .. } => write!(f, "Failed to download {position}"),
            Self::Summary(result) => write!(
                f,
                "Successfully downloaded {} out of {} {}. Download duration: {:.2} seconds",
                result.success,
                result.total,
                result.description,
                result.duration_seconds()
            ),
            Self::Completed => write!(f, "All downloads completed successfully!"),
            Self::Aborted { reason } => write!(f, "Error occurred: {reason}"),
        }
    }
}

/// Where the pipeline pushes its narration; the receiving half is consumed
/// live by the caller.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressSink {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    pub async fn emit(&self, event: ProgressEvent) -> Result<(), Error> {
        tracing::debug!(%event, "Progress");
        self.tx.send(event).await.map_err(|_| Error::ProgressClosed)
    }
}

/// Failures that end an archive session or a whole record list.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Archive session is not open; call `enter` first")]
    ScopeNotActive,
    #[error("Archive run was cancelled")]
    Cancelled,
    #[error("Progress receiver was dropped")]
    ProgressClosed,
    #[error("Work directory error: {0}")]
    WorkDir(#[from] std::io::Error),
    #[error("Store error: {0:#}")]
    Store(anyhow::Error),
}

/// Per-record failures.
///
/// These never escape a record list: the pipeline turns each one into a
/// narration event and moves on to the next record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("{0}")]
    Selection(String),
    #[error("{0}")]
    Extraction(String),
    #[error("cannot parse {value:?}: {source}")]
    DateParse {
        value: String,
        source: chrono::ParseError,
    },
    #[error("{0:#}")]
    Download(anyhow::Error),
}

impl RecordError {
    pub(crate) fn missing_field(key: &str) -> String {
        format!("missing string field {key:?}")
    }
}

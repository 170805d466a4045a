//! # Record sources
//!
//! The three shapes of export lists that reference videos. Each shape knows
//! which of its records point at a video, where the URL and the interaction
//! date live, and which folder its downloads go to. The pipeline only ever
//! talks to [`RecordShape`].

use std::path::PathBuf;

use chrono::NaiveDateTime;
use clip_store::{CHATS_FOLDER, CHAT_VIDEO_URL_PREFIX, FAVORITED_FOLDER, LIKED_FOLDER};
use serde_json::Value;

use crate::error::RecordError;

/// Layout of the interaction dates found in exports
pub const EXPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Per-shape selection and extraction strategy.
pub trait RecordShape {
    /// Human readable name of the list, used in narration
    fn description(&self) -> String;

    /// Destination folder relative to the archive root
    fn folder(&self) -> PathBuf;

    fn select(&self, record: &Value) -> Result<bool, RecordError>;

    fn extract_url(&self, record: &Value) -> Result<String, RecordError>;

    fn extract_date_string(&self, record: &Value) -> Result<String, RecordError>;
}

/// A record that passed selection and extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub url: String,
    pub interacted_at: NaiveDateTime,
    pub folder: PathBuf,
}

pub fn parse_export_date(value: &str) -> Result<NaiveDateTime, RecordError> {
    NaiveDateTime::parse_from_str(value, EXPORT_DATE_FORMAT).map_err(|source| {
        RecordError::DateParse {
            value: value.to_string(),
            source,
        }
    })
}

fn string_field<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

fn required<'a>(
    record: &'a Value,
    key: &str,
    err: fn(String) -> RecordError,
) -> Result<&'a str, RecordError> {
    string_field(record, key).ok_or_else(|| err(RecordError::missing_field(key)))
}

/// Messages exchanged with one recipient; only shared videos are selected.
#[derive(Debug, Clone)]
pub struct ChatMessages {
    recipient: String,
}

impl ChatMessages {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
        }
    }
}

impl RecordShape for ChatMessages {
    fn description(&self) -> String {
        format!("videos exchanged with {}", self.recipient)
    }

    fn folder(&self) -> PathBuf {
        PathBuf::from(CHATS_FOLDER).join(path_component(&self.recipient))
    }

    fn select(&self, record: &Value) -> Result<bool, RecordError> {
        let content = required(record, "Content", RecordError::Selection)?;
        Ok(content.starts_with(CHAT_VIDEO_URL_PREFIX))
    }

    fn extract_url(&self, record: &Value) -> Result<String, RecordError> {
        required(record, "Content", RecordError::Extraction).map(String::from)
    }

    fn extract_date_string(&self, record: &Value) -> Result<String, RecordError> {
        required(record, "Date", RecordError::Extraction).map(String::from)
    }
}

/// Entries of the favorites list (`Link`, `Date`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FavoriteVideos;

impl RecordShape for FavoriteVideos {
    fn description(&self) -> String {
        "favorited videos".to_string()
    }

    fn folder(&self) -> PathBuf {
        PathBuf::from(FAVORITED_FOLDER)
    }

    fn select(&self, _record: &Value) -> Result<bool, RecordError> {
        Ok(true)
    }

    fn extract_url(&self, record: &Value) -> Result<String, RecordError> {
        required(record, "Link", RecordError::Extraction).map(String::from)
    }

    fn extract_date_string(&self, record: &Value) -> Result<String, RecordError> {
        required(record, "Date", RecordError::Extraction).map(String::from)
    }
}

/// Entries of the like list (`link`, `date`, lower case in exports).
#[derive(Debug, Clone, Copy, Default)]
pub struct LikedVideos;

impl RecordShape for LikedVideos {
    fn description(&self) -> String {
        "liked videos".to_string()
    }

    fn folder(&self) -> PathBuf {
        PathBuf::from(LIKED_FOLDER)
    }

    fn select(&self, _record: &Value) -> Result<bool, RecordError> {
        Ok(true)
    }

    fn extract_url(&self, record: &Value) -> Result<String, RecordError> {
        required(record, "link", RecordError::Extraction).map(String::from)
    }

    fn extract_date_string(&self, record: &Value) -> Result<String, RecordError> {
        required(record, "date", RecordError::Extraction).map(String::from)
    }
}

/// The closed set of record lists an export contains.
#[derive(Debug, Clone)]
pub enum RecordSource {
    Chat(ChatMessages),
    Favorites(FavoriteVideos),
    Likes(LikedVideos),
}

impl RecordSource {
    pub fn chat(recipient: impl Into<String>) -> Self {
        Self::Chat(ChatMessages::new(recipient))
    }

    fn shape(&self) -> &dyn RecordShape {
        match self {
            Self::Chat(shape) => shape,
            Self::Favorites(shape) => shape,
            Self::Likes(shape) => shape,
        }
    }
}

impl RecordShape for RecordSource {
    fn description(&self) -> String {
        self.shape().description()
    }

    fn folder(&self) -> PathBuf {
        self.shape().folder()
    }

    fn select(&self, record: &Value) -> Result<bool, RecordError> {
        self.shape().select(record)
    }

    fn extract_url(&self, record: &Value) -> Result<String, RecordError> {
        self.shape().extract_url(record)
    }

    fn extract_date_string(&self, record: &Value) -> Result<String, RecordError> {
        self.shape().extract_date_string(record)
    }
}

/// Makes a recipient name safe to use as one directory name.
pub fn path_component(name: &str) -> String {
    let cleaned = name.replace(['/', '\\'], "_");
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

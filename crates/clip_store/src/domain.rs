use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CHAT_VIDEO_URL_PREFIX;

/// Date-time layout shared by sidecar stems and the `interaction_date` field.
pub const STEM_DATE_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Provider metadata keys kept in a sidecar.
///
/// Adding keys is backward compatible for sidecar readers, removing them is not.
pub const ALLOWED_METADATA_KEYS: [&str; 15] = [
    "requested_downloads",
    "epoch",
    "artist",
    "upload_date",
    "duration",
    "fulltitle",
    "comment_count",
    "repost_count",
    "like_count",
    "view_count",
    "timestamp",
    "title",
    "description",
    "uploader_url",
    "track",
];

/// Provider metadata projected down to [`ALLOWED_METADATA_KEYS`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrimmedMetadata(Map<String, Value>);

impl TrimmedMetadata {
    /// Keeps only the allow-listed keys of a raw provider bag
    pub fn trim(raw: &Map<String, Value>) -> Self {
        let fields = raw
            .iter()
            .filter(|(key, _)| ALLOWED_METADATA_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self(fields)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// The unit persisted as a `<stem>.json` sidecar next to its media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadataRecord {
    #[serde(flatten)]
    pub provider_fields: TrimmedMetadata,
    pub url: String,
    pub interaction_date: String,
    pub interaction_timestamp: i64,
    pub file_path: String,
}

impl VideoMetadataRecord {
    /// Builds a record for an interaction at `interacted_at`.
    ///
    /// Export timestamps carry no zone; they are taken as UTC.
    pub fn new(
        provider_fields: TrimmedMetadata,
        url: impl Into<String>,
        interacted_at: NaiveDateTime,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            provider_fields,
            url: url.into(),
            interaction_date: interacted_at.format(STEM_DATE_FORMAT).to_string(),
            interaction_timestamp: interacted_at.and_utc().timestamp(),
            file_path: file_path.into(),
        }
    }
}

/// A sidecar read back from disk, flattened for display in a feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredVideo {
    pub stem: String,
    pub media_path: Option<String>,
    pub url: Option<String>,
    pub fulltitle: Option<String>,
    pub uploader_tag: String,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub interacted_at: Option<DateTime<Utc>>,
    pub view_count: Option<i64>,
    pub like_count: Option<i64>,
    pub repost_count: Option<i64>,
    pub comment_count: Option<i64>,
}

impl StoredVideo {
    /// Builds the feed view of a raw sidecar object.
    ///
    /// Works on the raw JSON so sidecars written by older versions (with a
    /// `like_date` string instead of `interaction_timestamp`) still load.
    pub fn from_sidecar(stem: impl Into<String>, sidecar: &Map<String, Value>) -> Self {
        let str_field = |key: &str| sidecar.get(key).and_then(Value::as_str).map(String::from);
        let int_field = |key: &str| sidecar.get(key).and_then(Value::as_i64);

        let interacted_at = int_field("interaction_timestamp")
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                sidecar
                    .get("like_date")
                    .and_then(Value::as_str)
                    .and_then(|s| NaiveDateTime::parse_from_str(s, STEM_DATE_FORMAT).ok())
                    .map(|naive| naive.and_utc())
            });

        Self {
            stem: stem.into(),
            media_path: str_field("file_path"),
            url: str_field("url"),
            fulltitle: str_field("fulltitle"),
            uploader_tag: uploader_tag(sidecar.get("uploader_url").and_then(Value::as_str)),
            uploaded_at: int_field("timestamp").and_then(|ts| DateTime::from_timestamp(ts, 0)),
            interacted_at,
            view_count: int_field("view_count"),
            like_count: int_field("like_count"),
            repost_count: int_field("repost_count"),
            comment_count: int_field("comment_count"),
        }
    }
}

/// `https://www.tiktok.com/@someone` -> `@someone`; anything without an `@` in
/// its path becomes `@NULL`.
fn uploader_tag(uploader_url: Option<&str>) -> String {
    let path = uploader_url
        .map(|url| {
            let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
            let path_start = without_scheme.find('/').unwrap_or(without_scheme.len());
            let path = &without_scheme[path_start..];
            path.split(['?', '#']).next().unwrap_or_default()
        })
        .unwrap_or_default();

    match path.rsplit_once('@') {
        Some((_, name)) => format!("@{name}"),
        None => "@NULL".to_string(),
    }
}

/// What a chat message carried.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatBody {
    /// A shared video, with its archived copy when one exists
    Video {
        url: String,
        video: Option<StoredVideo>,
    },
    /// `[...]`-wrapped content, brackets stripped
    Gif(String),
    Text(String),
}

/// One message of a stored transcript, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatEntry {
    /// Sent by the recipient rather than the account owner
    pub incoming: bool,
    pub date: Option<String>,
    pub body: ChatBody,
}

impl ChatEntry {
    /// Classifies a raw transcript message; `videos` holds the recipient's
    /// archived videos keyed by URL.
    pub fn from_message(
        recipient: &str,
        message: &Map<String, Value>,
        videos: &HashMap<String, StoredVideo>,
    ) -> Self {
        let str_field = |key: &str| message.get(key).and_then(Value::as_str);
        let content = str_field("Content").unwrap_or_default();

        let body = if content.starts_with(CHAT_VIDEO_URL_PREFIX) {
            ChatBody::Video {
                url: content.to_string(),
                video: videos.get(content).cloned(),
            }
        } else if let Some(gif) = content
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            ChatBody::Gif(gif.to_string())
        } else {
            ChatBody::Text(content.to_string())
        };

        Self {
            incoming: str_field("From") == Some(recipient),
            date: str_field("Date").map(String::from),
            body,
        }
    }
}

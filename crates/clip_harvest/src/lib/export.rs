use std::path::Path;

use anyhow::Context;
use serde_json::Value;

/// Prefix of the chat history keys, e.g. `"Chat History with alice:"`
const CHAT_KEY_PREFIX: &str = "Chat History with ";

/// Messages exchanged with one recipient, as found in the export.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatHistory {
    pub recipient: String,
    pub messages: Vec<Value>,
}

/// The record lists of an account data export that reference videos.
///
/// Sections missing from the export come back empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportLists {
    pub chats: Vec<ChatHistory>,
    pub favorites: Vec<Value>,
    pub likes: Vec<Value>,
}

impl ExportLists {
    #[tracing::instrument]
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read export {}", path.display()))?;
        let json = serde_json::from_slice::<Value>(&bytes)
            .inspect_err(|e| tracing::error!(error = ?e, "Export is not valid json"))
            .context("Failed to parse export")?;

        Ok(Self::from_json(&json))
    }

    pub fn from_json(json: &Value) -> Self {
        let chats = json["Direct Messages"]["Chat History"]["ChatHistory"]
            .as_object()
            .map(|histories| {
                histories
                    .iter()
                    .map(|(key, messages)| ChatHistory {
                        recipient: recipient_from_key(key),
                        messages: list(messages),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            chats,
            favorites: list(&json["Activity"]["Favorite Videos"]["FavoriteVideoList"]),
            likes: list(&json["Activity"]["Like List"]["ItemFavoriteList"]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty() && self.favorites.is_empty() && self.likes.is_empty()
    }
}

fn list(value: &Value) -> Vec<Value> {
    value.as_array().cloned().unwrap_or_default()
}

fn recipient_from_key(key: &str) -> String {
    let name = key.strip_prefix(CHAT_KEY_PREFIX).unwrap_or(key);
    name.strip_suffix(':').unwrap_or(name).to_string()
}

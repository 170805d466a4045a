//! # Clip Store
//!
//! Durable side of a clip archive. Every downloaded video lives next to a JSON
//! sidecar sharing its stem:
//!
//! ```text
//! <root>/chats/<recipient>/<stem>.{ext,json}
//! <root>/chats/<recipient>.json            (raw chat transcript)
//! <root>/favorited/<stem>.{ext,json}
//! <root>/liked/<stem>.{ext,json}
//! ```
//!
//! The sidecar is always written last, so its presence is what marks a stem
//! as taken.

mod allocator;
mod domain;
mod store;

pub use allocator::{sidecar_path, with_suffix, PathAllocator};
pub use domain::{
    ChatBody, ChatEntry, StoredVideo, TrimmedMetadata, VideoMetadataRecord, ALLOWED_METADATA_KEYS,
    STEM_DATE_FORMAT,
};
pub use store::{fs::FsSidecarStore, SidecarStore};

pub const CHATS_FOLDER: &str = "chats";
pub const FAVORITED_FOLDER: &str = "favorited";
pub const LIKED_FOLDER: &str = "liked";

/// Chat messages whose content starts with this are shared videos
pub const CHAT_VIDEO_URL_PREFIX: &str = "https://www.tiktokv.com/";

//! # Clip Harvest
//!
//! Downloads the videos referenced by an account data export (chat messages,
//! favorites, likes) into a [`clip_store`] archive, narrating progress as it
//! goes.

mod cache;
mod error;
pub mod export;
pub mod fetcher;
mod processor;
pub mod progress;
pub mod source;
pub mod tracing;
mod workdir;

pub use cache::{CachedFetch, FetchCache};
pub use error::{Error, RecordError};
pub use export::{ChatHistory, ExportLists};
pub use fetcher::{yt_dlp::YtDlpFetcher, FetchedMedia, Fetcher};
pub use processor::{builder::ArchiveSessionBuilder, ArchiveSession};
pub use progress::{BatchResult, ProgressEvent, ProgressSink};
pub use source::{RecordShape, RecordSource};
pub use workdir::WorkDir;

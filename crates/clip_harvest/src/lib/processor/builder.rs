use std::{path::PathBuf, time::Duration};

use clip_store::{PathAllocator, SidecarStore};
use tokio_util::sync::CancellationToken;

use crate::{cache::FetchCache, fetcher::Fetcher, ArchiveSession};

pub struct ArchiveSessionBuilder<F = (), S = ()> {
    workdir_parent: PathBuf,
    fetcher: F,
    store: S,
    fetch_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl Default for ArchiveSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSessionBuilder {
    /// Work directories go to the system temp dir unless told otherwise
    pub fn new() -> Self {
        Self {
            workdir_parent: std::env::temp_dir(),
            fetcher: (),
            store: (),
            fetch_timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl<F, S> ArchiveSessionBuilder<F, S> {
    pub fn fetcher<F2: Fetcher + Send + Sync>(self, fetcher: F2) -> ArchiveSessionBuilder<F2, S> {
        ArchiveSessionBuilder {
            workdir_parent: self.workdir_parent,
            fetcher,
            store: self.store,
            fetch_timeout: self.fetch_timeout,
            cancel: self.cancel,
        }
    }

    pub fn store<S2: SidecarStore + Send + Sync>(self, store: S2) -> ArchiveSessionBuilder<F, S2> {
        ArchiveSessionBuilder {
            workdir_parent: self.workdir_parent,
            fetcher: self.fetcher,
            store,
            fetch_timeout: self.fetch_timeout,
            cancel: self.cancel,
        }
    }

    pub fn workdir_parent(mut self, workdir_parent: impl Into<PathBuf>) -> Self {
        self.workdir_parent = workdir_parent.into();
        self
    }

    /// Upper bound for a single fetch; expiry fails only that record
    pub fn fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = Some(fetch_timeout);
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl<F, S> ArchiveSessionBuilder<F, S>
where
    F: Fetcher + Send + Sync,
    S: SidecarStore + Send + Sync,
{
    /// Builds a closed session; call `enter` before downloading
    pub fn build(self) -> ArchiveSession<F, S> {
        ArchiveSession {
            workdir_parent: self.workdir_parent,
            workdir: None,
            store: self.store,
            cache: FetchCache::new(self.fetcher, self.fetch_timeout),
            allocator: PathAllocator::new(),
            cancel: self.cancel,
        }
    }
}

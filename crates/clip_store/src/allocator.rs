use std::{
    collections::HashSet,
    ffi::OsString,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// Appends `.json` to an extension-less stem path
pub fn sidecar_path(stem_path: &Path) -> PathBuf {
    with_suffix(stem_path, ".json")
}

/// Appends `suffix` verbatim to the final component of `path`.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = OsString::from(path.as_os_str());
    raw.push(suffix);
    PathBuf::from(raw)
}

/// Hands out collision-free stem paths within a folder.
///
/// A stem counts as taken when its sidecar exists on disk or when it was
/// handed out earlier in this session and not released. Both checks and the
/// reservation happen under one lock.
#[derive(Debug, Default)]
pub struct PathAllocator {
    reserved: Mutex<HashSet<PathBuf>>,
}

impl PathAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `folder/stem`, or `folder/stem_N` for the first `N` that is free.
    #[tracing::instrument(skip(self))]
    pub fn allocate(&self, folder: &Path, stem: &str) -> PathBuf {
        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);

        let mut counter = 0usize;
        loop {
            let candidate = match counter {
                0 => folder.join(stem),
                n => folder.join(format!("{stem}_{n}")),
            };

            if !reserved.contains(&candidate) && !sidecar_path(&candidate).exists() {
                tracing::debug!(path = ?candidate, "Allocated stem");
                reserved.insert(candidate.clone());
                return candidate;
            }
            counter += 1;
        }
    }

    /// Gives a stem back after a task failed before its sidecar was written
    pub fn release(&self, stem_path: &Path) {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(stem_path);
    }

    /// Forgets every reservation; only the disk decides afterwards
    pub fn clear(&mut self) {
        self.reserved
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_first_allocation_is_unsuffixed() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = PathAllocator::new();

        let path = allocator.allocate(dir.path(), "20240101_000000");
        assert_eq!(path, dir.path().join("20240101_000000"));
    }

    #[test]
    fn test_existing_sidecar_forces_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = PathAllocator::new();

        let first = allocator.allocate(dir.path(), "20240101_000000");
        fs::write(sidecar_path(&first), "{}").unwrap();

        // a fresh allocator only sees the disk
        let second = PathAllocator::new().allocate(dir.path(), "20240101_000000");
        assert_eq!(second, dir.path().join("20240101_000000_1"));
    }

    #[test]
    fn test_reserved_stems_are_not_handed_out_twice() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = PathAllocator::new();

        let paths = (0..3)
            .map(|_| allocator.allocate(dir.path(), "stem"))
            .collect::<Vec<_>>();

        assert_eq!(
            paths,
            vec![
                dir.path().join("stem"),
                dir.path().join("stem_1"),
                dir.path().join("stem_2"),
            ]
        );
    }

    #[test]
    fn test_released_stem_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = PathAllocator::new();

        let first = allocator.allocate(dir.path(), "stem");
        allocator.release(&first);

        assert_eq!(allocator.allocate(dir.path(), "stem"), first);
    }

    #[test]
    fn test_cleared_allocator_only_sees_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut allocator = PathAllocator::new();

        let reserved = allocator.allocate(dir.path(), "stem");
        let written = allocator.allocate(dir.path(), "stem");
        fs::write(sidecar_path(&written), "{}").unwrap();
        allocator.clear();

        assert_eq!(allocator.allocate(dir.path(), "stem"), reserved);
        assert_eq!(allocator.allocate(dir.path(), "stem"), dir.path().join("stem_2"));
    }

    #[test]
    fn test_orphaned_media_does_not_reserve_stem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stem.mp4"), b"orphan").unwrap();

        let path = PathAllocator::new().allocate(dir.path(), "stem");
        assert_eq!(path, dir.path().join("stem"));
    }

    #[test]
    fn test_suffix_helpers() {
        let stem = Path::new("media/liked/20240101_000000");
        assert_eq!(
            sidecar_path(stem),
            PathBuf::from("media/liked/20240101_000000.json")
        );
        assert_eq!(
            with_suffix(stem, ".mp4.part"),
            PathBuf::from("media/liked/20240101_000000.mp4.part")
        );
    }
}

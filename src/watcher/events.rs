//! Filesystem change batches.

#![allow(clippy::missing_const_for_fn)]

use std::path::{Path, PathBuf};

use crate::pathutil::any_segment_hidden;

/// Changed paths collected from one debounced batch of events.
///
/// Paths are stored relative to the watched root. Paths outside the root
/// or below a hidden segment are never added.
#[derive(Debug, Default)]
pub struct ChangeBatch {
    changed: Vec<PathBuf>,
}

impl ChangeBatch {
    /// Create a new empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an absolute path reported below `root`.
    ///
    /// Returns whether the path was accepted.
    pub fn add(&mut self, root: &Path, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(root) else {
            return false;
        };
        if any_segment_hidden(rel) {
            return false;
        }
        if !self.changed.iter().any(|p| p == rel) {
            self.changed.push(rel.to_path_buf());
        }
        true
    }

    /// First changed path, relative to the root.
    #[must_use]
    pub fn first(&self) -> Option<&Path> {
        self.changed.first().map(PathBuf::as_path)
    }

    /// Check if batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Number of distinct changed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_dedupes() {
        let root = Path::new("/ddt");
        let mut batch = ChangeBatch::new();
        assert!(batch.add(root, Path::new("/ddt/foo/readme.md")));
        assert!(batch.add(root, Path::new("/ddt/foo/readme.md")));
        assert!(batch.add(root, Path::new("/ddt/bar")));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.first(), Some(Path::new("foo/readme.md")));
    }

    #[test]
    fn test_batch_skips_hidden() {
        let root = Path::new("/ddt");
        let mut batch = ChangeBatch::new();
        assert!(!batch.add(root, Path::new("/ddt/.git/index")));
        assert!(!batch.add(root, Path::new("/ddt/foo/.DS_Store")));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_batch_hidden_root_is_fine() {
        let root = Path::new("/home/x/.ddt");
        let mut batch = ChangeBatch::new();
        assert!(batch.add(root, Path::new("/home/x/.ddt/foo/readme.md")));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_batch_skips_outside_root() {
        let mut batch = ChangeBatch::new();
        assert!(!batch.add(Path::new("/ddt"), Path::new("/etc/passwd")));
        assert!(batch.is_empty());
    }
}

//! Last-modified times for files and directories of a tree.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use crate::vcs::Repo;
use crate::Result;

/// How long the chained store waits on the repository before falling back
/// to the filesystem.
pub const CHAIN_DEADLINE: Duration = Duration::from_millis(50);

/// Where modification times come from.
#[derive(Debug, Clone)]
pub enum MetaStore {
    /// Always the Unix epoch.
    Noop,
    /// Filesystem modification times.
    Fs,
    /// Commit times from the repository log.
    Repo(Arc<Repo>),
    /// Repository first, filesystem when the repository has no answer in
    /// time.
    Chain(Arc<Repo>),
}

impl MetaStore {
    /// Last modification time of `path`. For directories this is the most
    /// recent modification of anything below it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend has no answer.
    pub async fn modified(&self, path: &Path) -> Result<DateTime<Utc>> {
        match self {
            Self::Noop => Ok(DateTime::<Utc>::default()),
            Self::Fs => fs_modified(path).await,
            Self::Repo(repo) => repo.modified(path, None).await,
            Self::Chain(repo) => match repo.modified(path, Some(CHAIN_DEADLINE)).await {
                Ok(t) if t.timestamp() != 0 => Ok(t),
                Ok(_) => fs_modified(path).await,
                Err(e) => {
                    if !e.is_no_data() {
                        tracing::debug!(path = %path.display(), error = %e, "Repository has no modified time, using filesystem");
                    }
                    fs_modified(path).await
                }
            },
        }
    }
}

async fn fs_modified(path: &Path) -> Result<DateTime<Utc>> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || newest_mtime(&path))
        .await
        .map_err(|e| crate::Error::internal(format!("modified task failed: {e}")))?
}

fn newest_mtime(path: &Path) -> Result<DateTime<Utc>> {
    let own = std::fs::metadata(path)?;
    let mut newest = own.modified()?;

    if own.is_dir() {
        let entries = walkdir::WalkDir::new(path)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(std::result::Result::ok);

        for entry in entries {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if let Ok(t) = meta.modified() {
                newest = newest.max(t);
            }
        }
    }
    Ok(to_utc(newest))
}

fn to_utc(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set_mtime(path: &Path, secs: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    #[tokio::test]
    async fn test_noop_is_epoch() {
        let t = MetaStore::Noop.modified(Path::new("/nonexistent")).await.unwrap();
        assert_eq!(t.timestamp(), 0);
    }

    #[tokio::test]
    async fn test_fs_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.md");
        std::fs::write(&file, "a").unwrap();
        set_mtime(&file, 1_000_000);

        let t = MetaStore::Fs.modified(&file).await.unwrap();
        assert_eq!(t.timestamp(), 1_000_000);
    }

    #[tokio::test]
    async fn test_fs_directory_uses_newest_child() {
        let tmp = TempDir::new().unwrap();
        let node = tmp.path().join("foo");
        std::fs::create_dir_all(node.join("bar")).unwrap();
        std::fs::write(node.join("bar/readme.md"), "a").unwrap();

        let t = MetaStore::Fs.modified(&node).await.unwrap();
        let nested = MetaStore::Fs.modified(&node.join("bar/readme.md")).await.unwrap();
        assert!(t >= nested);
    }

    #[tokio::test]
    async fn test_fs_ignores_hidden() {
        let tmp = TempDir::new().unwrap();
        let node = tmp.path().join("foo");
        std::fs::create_dir(&node).unwrap();
        std::fs::write(node.join("readme.md"), "a").unwrap();
        std::fs::write(node.join(".DS_Store"), "a").unwrap();
        // Year 2100.
        set_mtime(&node.join(".DS_Store"), 4_102_444_800);

        let dir = MetaStore::Fs.modified(&node).await.unwrap();
        assert!(dir.timestamp() < 4_102_444_800);
    }

    #[tokio::test]
    async fn test_fs_missing_path() {
        assert!(MetaStore::Fs.modified(Path::new("/nonexistent/dsk")).await.is_err());
    }
}

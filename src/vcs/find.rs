//! Repository discovery.

use std::path::{Path, PathBuf};

use crate::Result;

/// Location of the repository a tree lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    /// Working directory of the outermost repository (has a `.git` dir).
    pub main: PathBuf,
    /// Working directory of the submodule the tree lives in, if any
    /// (has a `.git` file).
    pub submodule: Option<PathBuf>,
}

/// Walk upward from `path` looking for a repository.
///
/// # Errors
///
/// Returns an error if `path` cannot be made absolute.
pub fn find_repo(path: &Path) -> Result<Option<RepoLocation>> {
    let path = std::path::absolute(path)?;

    let Some(main) = find_upward(&path, false) else {
        return Ok(None);
    };
    tracing::info!(path = %main.display(), "Detected repository support");

    let submodule = find_upward(&path, true).filter(|sub| sub.starts_with(&main));
    if let Some(sub) = &submodule {
        tracing::info!(path = %sub.display(), "Using repository submodule");
    }
    Ok(Some(RepoLocation { main, submodule }))
}

fn find_upward(start: &Path, submodule: bool) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| {
            let Ok(meta) = std::fs::metadata(dir.join(".git")) else {
                return false;
            };
            if submodule {
                meta.is_file()
            } else {
                meta.is_dir()
            }
        })
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_no_repo() {
        let tmp = TempDir::new().unwrap();
        // Temp dirs may themselves live inside a checkout; only assert
        // nothing is found below the temp dir.
        if let Some(found) = find_repo(tmp.path()).unwrap() {
            assert!(!found.main.starts_with(tmp.path()));
        }
    }

    #[test]
    fn test_finds_repo_above() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        let tree = tmp.path().join("docs/ddt");
        std::fs::create_dir_all(&tree).unwrap();

        let found = find_repo(&tree).unwrap().unwrap();
        assert_eq!(found.main, tmp.path());
        assert!(found.submodule.is_none());
    }

    #[test]
    fn test_finds_submodule() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        let sub = tmp.path().join("vendor/ddt");
        std::fs::create_dir_all(&sub).unwrap();
        std::fs::write(sub.join(".git"), "gitdir: ../../.git/modules/ddt\n").unwrap();

        let found = find_repo(&sub.join("foo")).unwrap().unwrap();
        assert_eq!(found.main, tmp.path());
        assert_eq!(found.submodule, Some(sub));
    }
}

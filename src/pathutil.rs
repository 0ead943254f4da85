//! Path helpers shared across the tree, watcher and HTTP layers.

use std::path::{Component, Path, PathBuf};

use crate::error::TreeError;
use crate::Result;

/// Path relative to the parent of `root`, for log lines and messages.
///
/// Keeps absolute filesystem locations out of anything user-facing.
#[must_use]
pub fn pretty(root: &Path, path: &Path) -> String {
    let base = root.parent().unwrap_or(root);
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Whether any segment of a relative path starts with a dot.
#[must_use]
pub fn any_segment_hidden(rel: &Path) -> bool {
    rel.components().any(|c| match c {
        Component::Normal(s) => s.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Lexically normalize a path: drop `.`, resolve `..` against preceding
/// segments. Does not touch the filesystem.
#[must_use]
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.is_absolute() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Ensure `path` resolves to `root` or below it.
///
/// Relative paths are joined onto `root` first. Returns the cleaned,
/// absolute path.
///
/// # Errors
///
/// Returns [`TreeError::UnsafePath`] when the path escapes `root`.
pub fn check_safe_path(path: &Path, root: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let cleaned = clean(&joined);
    let root = clean(root);

    if cleaned.starts_with(&root) {
        return Ok(cleaned);
    }
    Err(TreeError::UnsafePath(format!(
        "directory traversal detected: path {}, root {}",
        cleaned.display(),
        root.display()
    ))
    .into())
}

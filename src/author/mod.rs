//! Author lookups by email.
//!
//! A tree may carry an `AUTHORS.txt` at its root, listing one
//! `Display Name <email>` per line. Node meta files reference authors by
//! email only.

mod parser;
mod store;

use std::path::{Path, PathBuf};

use serde::Serialize;

pub use parser::{parse, ParsedAuthor};
pub use store::TxtAuthorStore;

use crate::Result;

/// Canonical basename of the authors file.
pub const CANONICAL_BASENAME: &str = "AUTHORS.txt";

/// An author; `name` is empty when the email is unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub email: String,
    pub name: String,
}

/// Email to display-name lookups.
#[derive(Debug)]
pub enum AuthorStore {
    /// Answers "not found" for everything.
    Noop,
    /// Backed by an authors file.
    Txt(TxtAuthorStore),
}

impl AuthorStore {
    /// Look up an author by email.
    #[must_use]
    pub fn get_by_email(&self, email: &str) -> Option<Author> {
        match self {
            Self::Noop => None,
            Self::Txt(db) => db.get_by_email(email),
        }
    }

    /// Reload from disk when backed by a file.
    ///
    /// # Errors
    ///
    /// Returns an error if reloading fails.
    pub fn refresh(&self) -> Result<()> {
        match self {
            Self::Noop => Ok(()),
            Self::Txt(db) => db.refresh(),
        }
    }
}

/// Path to the authors file below `root`, if one exists.
#[must_use]
pub fn find_file(root: &Path) -> Option<PathBuf> {
    let candidate = root.join(CANONICAL_BASENAME);
    candidate.is_file().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_noop_store() {
        let store = AuthorStore::Noop;
        assert!(store.get_by_email("marius@atelierdisko.de").is_none());
        assert!(store.refresh().is_ok());
    }

    #[test]
    fn test_find_file() {
        let tmp = TempDir::new().unwrap();
        assert!(find_file(tmp.path()).is_none());

        std::fs::write(tmp.path().join(CANONICAL_BASENAME), "").unwrap();
        assert_eq!(
            find_file(tmp.path()),
            Some(tmp.path().join(CANONICAL_BASENAME))
        );
    }
}

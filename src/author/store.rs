//! Authors file backed store.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::parser::parse;
use super::Author;
use crate::Result;

#[derive(Debug, Default)]
struct State {
    hash: Option<blake3::Hash>,
    data: Vec<Author>,
}

/// Author lookups backed by an `AUTHORS.txt` file.
#[derive(Debug)]
pub struct TxtAuthorStore {
    path: PathBuf,
    state: RwLock<State>,
}

impl TxtAuthorStore {
    /// Open and load the authors file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tracing::info!(path = %path.display(), "Initializing text based author database");

        let store = Self {
            path,
            state: RwLock::new(State::default()),
        };
        store.refresh()?;
        Ok(store)
    }

    /// Re-read the file if its contents changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed; the
    /// previously loaded authors are kept.
    pub fn refresh(&self) -> Result<()> {
        let contents = std::fs::read_to_string(&self.path)?;
        let hash = blake3::hash(contents.as_bytes());

        if self.state.read().hash == Some(hash) {
            return Ok(());
        }
        let parsed = parse(&contents)?;
        tracing::debug!(count = parsed.len(), "Loading authors");

        let data = parsed
            .into_iter()
            .map(|p| Author {
                name: p.name,
                email: p.email,
            })
            .collect();

        let mut state = self.state.write();
        state.hash = Some(hash);
        state.data = data;
        Ok(())
    }

    /// Whether the file is gone or its contents changed since last load.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        let Ok(contents) = std::fs::read(&self.path) else {
            return true;
        };
        self.state.read().hash != Some(blake3::hash(&contents))
    }

    /// Look up an author by email.
    #[must_use]
    pub fn get_by_email(&self, email: &str) -> Option<Author> {
        self.state
            .read()
            .data
            .iter()
            .find(|a| a.email == email)
            .cloned()
    }

    /// Number of loaded authors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().data.len()
    }

    /// Whether no authors are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

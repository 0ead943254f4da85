//! Error types and Result aliases for dsk.
//!
//! This module defines the error hierarchy used throughout the crate.
//! All public functions return `Result<T, Error>` or `Result<T>`.

use thiserror::Error;

/// Result type alias using dsk's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dsk operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Tree and node error.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// Version control error.
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),

    /// Search index error.
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Server/API error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// Authors file error.
    #[error("authors error: {0}")]
    Author(#[from] AuthorError),

    /// Requested thing does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A source is known but has not been materialized yet.
    #[error("source '{0}' is not available yet")]
    SourceIncomplete(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Tree and node errors.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The tree has not been synced yet.
    #[error("tree not synced")]
    NotSynced,

    /// Walking the tree failed.
    #[error("failed to walk '{path}': {reason}")]
    Walk { path: String, reason: String },

    /// A node sidecar could not be parsed.
    #[error("invalid meta file '{path}': {reason}")]
    Meta { path: String, reason: String },

    /// Document could not be read or rendered.
    #[error("failed to render '{path}': {reason}")]
    Render { path: String, reason: String },

    /// A path escapes the tree root.
    #[error("unsafe path: {0}")]
    UnsafePath(String),

    /// HTML could not be rewritten.
    #[error("failed to process HTML: {0}")]
    Html(String),
}

/// Version control errors.
#[derive(Error, Debug)]
pub enum RepoError {
    /// Underlying git error.
    #[error("git error: {0}")]
    Git(String),

    /// No data available yet or before the deadline.
    #[error("no data")]
    NoData,

    /// The path is not inside a repository.
    #[error("no repository found for '{0}'")]
    NotFound(String),

    /// A submodule could not be resolved through its parent.
    #[error("failed to resolve submodule '{0}' in parent repository")]
    Submodule(String),
}

/// Search errors.
#[derive(Error, Debug)]
pub enum SearchError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Unsupported analysis language.
    #[error("unsupported language: {0}")]
    Language(String),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },
}

/// Server/API errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// Request handling error.
    #[error("request error: {0}")]
    Request(String),
}

/// Authors file errors.
#[derive(Error, Debug)]
pub enum AuthorError {
    /// A line of the authors file is malformed.
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether the error is the repository "no data" sentinel.
    #[must_use]
    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::Repo(RepoError::NoData))
    }
}

impl From<git2::Error> for Error {
    fn from(e: git2::Error) -> Self {
        Self::Repo(RepoError::Git(e.message().to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Search(SearchError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests;

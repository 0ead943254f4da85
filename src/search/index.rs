//! `SQLite` FTS5 storage for the wide and narrow indexes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};

use crate::error::SearchError;
use crate::Result;

/// Columns of the wide table, in declaration order.
pub const WIDE_COLUMNS: &[&str] = &[
    "url",
    "title",
    "secondary_titles",
    "tags",
    "authors",
    "description",
    "docs",
    "files",
    "version",
    "custom",
    "stems",
];

/// Column index of `description` in the wide table.
pub const WIDE_DESCRIPTION: usize = 5;
/// Column index of `docs` in the wide table.
pub const WIDE_DOCS: usize = 6;
/// Column holding the stemmed words of the title, description and
/// documents; only queried with stemmed terms.
pub const WIDE_STEMS: &str = "stems";

/// One generation of both indexes.
///
/// Clone is cheap; clones share the connection.
#[derive(Clone)]
pub struct Index {
    conn: Arc<Mutex<Connection>>,
    /// File backing the index; `None` when in memory.
    file: Option<PathBuf>,
}

impl Index {
    /// Create empty indexes, either in memory or, when `dir` is given, in
    /// a new file below it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn create(dir: Option<&Path>, tokenizer: &str) -> Result<Self> {
        let (conn, file) = match dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let file = dir.join(format!("search-{}.db", uuid::Uuid::new_v4()));
                let conn = Connection::open_with_flags(
                    &file,
                    OpenFlags::SQLITE_OPEN_READ_WRITE
                        | OpenFlags::SQLITE_OPEN_CREATE
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(|e| SearchError::Database(format!("failed to open index: {e}")))?;
                (conn, Some(file))
            }
            None => {
                let conn = Connection::open_in_memory()
                    .map_err(|e| SearchError::Database(format!("failed to open in-memory index: {e}")))?;
                (conn, None)
            }
        };

        let index = Self {
            conn: Arc::new(Mutex::new(conn)),
            file,
        };
        index.init(tokenizer)?;
        Ok(index)
    }

    fn init(&self, tokenizer: &str) -> Result<()> {
        let wide = WIDE_COLUMNS
            .iter()
            .map(|c| if *c == "url" { "url UNINDEXED".to_string() } else { (*c).to_string() })
            .collect::<Vec<_>>()
            .join(", ");

        self.with_conn(|conn| {
            conn.execute_batch(&format!(
                "
                PRAGMA journal_mode = MEMORY;
                PRAGMA synchronous = OFF;
                PRAGMA temp_store = MEMORY;

                CREATE VIRTUAL TABLE wide USING fts5({wide}, tokenize = '{tokenizer}');
                CREATE VIRTUAL TABLE wide_vocab USING fts5vocab(wide, 'row');
                CREATE VIRTUAL TABLE narrow USING fts5(url UNINDEXED, title, tags, tokenize = '{tokenizer}');
                "
            ))
            .map_err(|e| SearchError::Database(format!("failed to create index tables: {e}")))?;
            Ok(())
        })?;

        tracing::debug!(file = ?self.file, "Search index created");
        Ok(())
    }

    /// Execute a function with exclusive access to the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the function fails.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function inside a transaction; rolls back on error.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction or the function fails.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| SearchError::Database(format!("failed to begin transaction: {e}")))?;

        match f(&conn) {
            Ok(result) => {
                conn.execute_batch("COMMIT")
                    .map_err(|e| SearchError::Database(format!("failed to commit: {e}")))?;
                Ok(result)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Remove the backing file, if any. The index must not be used
    /// afterwards.
    pub fn discard(&self) {
        if let Some(file) = &self.file {
            if let Err(e) = std::fs::remove_file(file) {
                tracing::warn!(file = %file.display(), error = %e, "Failed to remove old search index");
            }
        }
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index").field("file", &self.file).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::analyzer::TOKENIZER;
    use tempfile::TempDir;

    fn count(index: &Index, table: &str) -> i64 {
        index
            .with_conn(|conn| Ok(conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_in_memory() {
        let index = Index::create(None, TOKENIZER).unwrap();
        index
            .with_transaction(|conn| {
                conn.execute("INSERT INTO narrow (url, title, tags) VALUES ('a', 'Colors', 'foo')", [])?;
                Ok(())
            })
            .unwrap();
        assert_eq!(count(&index, "narrow"), 1);
        assert_eq!(count(&index, "wide"), 0);
    }

    #[test]
    fn test_rollback() {
        let index = Index::create(None, TOKENIZER).unwrap();
        let result: Result<()> = index.with_transaction(|conn| {
            conn.execute("INSERT INTO narrow (url, title, tags) VALUES ('a', 'Colors', 'foo')", [])?;
            Err(crate::Error::internal("abort"))
        });
        assert!(result.is_err());
        assert_eq!(count(&index, "narrow"), 0);
    }

    #[test]
    fn test_persisted_and_discarded() {
        let tmp = TempDir::new().unwrap();
        let index = Index::create(Some(tmp.path()), TOKENIZER).unwrap();
        let files = || std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(files(), 1);

        index.discard();
        assert_eq!(files(), 0);
    }
}

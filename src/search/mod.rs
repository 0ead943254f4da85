//! Full-text search over the nodes of a tree.
//!
//! Two `SQLite` FTS5 indexes back the search: a wide one covering all
//! node attributes, documents and files, used by [`Search::full_search`],
//! and a narrow one covering only titles and tags, used by
//! [`Search::filter_search`].

mod analyzer;
mod engine;
mod index;

pub use analyzer::{words, Language, TOKENIZER};
pub use engine::{FilterResults, FullSearchResults, Search, SearchHit, MAX_RESULTS};
pub use index::Index;

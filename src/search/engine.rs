//! Full search and filter search over a tree.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection};

use super::analyzer::{fold, words, Language, TOKENIZER};
use super::index::{Index, WIDE_DESCRIPTION, WIDE_DOCS, WIDE_STEMS};
use crate::ddt::{Node, Tree};
use crate::server::metrics::SEARCH_QUERIES;
use crate::{Error, Result};

/// Maximum number of hits a query returns.
pub const MAX_RESULTS: usize = 100;

/// Shortest query word that is also matched with one edit of fuzziness.
const FUZZY_MIN_LEN: usize = 3;

const MARK_START: &str = "<mark>";
const MARK_END: &str = "</mark>";

/// A full search result with highlighted fragments from the description
/// and the documents.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub node: Arc<Node>,
    pub fragments: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FullSearchResults {
    pub hits: Vec<SearchHit>,
    /// Number of matching documents, may exceed `hits.len()`.
    pub total: usize,
    pub took: Duration,
    pub is_stale: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FilterResults {
    pub nodes: Vec<Arc<Node>>,
    pub total: usize,
    pub took: Duration,
    pub is_stale: bool,
}

/// Searches the nodes of one tree.
///
/// Both indexes are rebuilt from scratch on every refresh and swapped in
/// together; queries keep using the previous generation until then.
pub struct Search {
    tree: Arc<Tree>,
    lang: Language,
    persist: Option<PathBuf>,
    index: RwLock<Option<Index>>,
    /// Tree hash at the time of the last refresh.
    hash: Mutex<Option<String>>,
    refreshing: tokio::sync::Mutex<()>,
}

struct WideDoc {
    url: String,
    title: String,
    secondary_titles: String,
    tags: String,
    authors: String,
    description: String,
    docs: String,
    files: String,
    version: String,
    custom: String,
    stems: String,
}

impl Search {
    /// Create a search over `tree` analyzing text as `lang`.
    ///
    /// Indexes are persisted below `persist` when given, otherwise kept in
    /// memory. Call [`Search::refresh`] to build them.
    ///
    /// # Errors
    ///
    /// Returns an error if the language is not supported.
    pub fn new(tree: Arc<Tree>, lang: &str, persist: Option<PathBuf>) -> Result<Self> {
        let lang: Language = lang.parse()?;
        tracing::info!(lang = lang.code(), persist = ?persist, "Initializing search");
        Ok(Self {
            tree,
            lang,
            persist,
            index: RwLock::new(None),
            hash: Mutex::new(None),
            refreshing: tokio::sync::Mutex::new(()),
        })
    }

    #[must_use]
    pub const fn language(&self) -> Language {
        self.lang
    }

    /// Discard the indexes and index the whole tree again.
    ///
    /// # Errors
    ///
    /// Returns an error if reading nodes or writing the index fails; the
    /// previous indexes stay in place.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refreshing.lock().await;
        let start = Instant::now();

        let nodes = self.tree.get_all();
        let persist = self.persist.clone();
        let lang = self.lang;
        let index = tokio::task::spawn_blocking(move || build_index(&nodes, lang, persist.as_deref()))
            .await
            .map_err(|e| Error::internal(format!("index task failed: {e}")))??;

        let hash = match self.tree.calculate_hash().await {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to calculate tree hash after indexing");
                None
            }
        };

        let previous = self.index.write().replace(index);
        *self.hash.lock() = hash;
        if let Some(previous) = previous {
            previous.discard();
        }

        tracing::info!("Indexed tree for search in {:?}", start.elapsed());
        Ok(())
    }

    /// Drop the current indexes, removing their file when persisted.
    pub fn close(&self) {
        if let Some(index) = self.index.write().take() {
            index.discard();
        }
        *self.hash.lock() = None;
    }

    /// Whether the tree changed since the last refresh.
    pub async fn is_stale(&self) -> bool {
        let current = self.tree.calculate_hash().await.ok();
        let indexed = self.hash.lock().clone();
        indexed.is_none() || current != indexed
    }

    fn current_index(&self) -> Option<Index> {
        self.index.read().clone()
    }

    /// Fuzzy and prefix search over all fields; title matches rank higher.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn full_search(&self, query: &str) -> Result<FullSearchResults> {
        SEARCH_QUERIES.with_label_values(&["full"]).inc();
        let start = Instant::now();

        let terms = self.lang.terms(query);
        let lang = self.lang;
        let mut results = FullSearchResults::default();
        if let (false, Some(index)) = (terms.is_empty(), self.current_index()) {
            let (rows, total) = tokio::task::spawn_blocking(move || {
                index.with_conn(|conn| query_wide(conn, lang, &terms))
            })
            .await
            .map_err(|e| Error::internal(format!("search task failed: {e}")))??;

            results.total = total;
            for (url, fragments) in rows {
                match self.tree.get(&url) {
                    Some(node) => results.hits.push(SearchHit { node, fragments }),
                    None => tracing::debug!(url = %url, "Node for hit not found, skipping hit"),
                }
            }
        }

        results.took = start.elapsed();
        results.is_stale = self.is_stale().await;
        Ok(results)
    }

    /// Prefix search over titles and tags. Every word of the query must
    /// match; words are split at anything but letters and digits.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn filter_search(&self, query: &str) -> Result<FilterResults> {
        SEARCH_QUERIES.with_label_values(&["filter"]).inc();
        let start = Instant::now();

        let parts = words(query);
        let mut results = FilterResults::default();
        if let (false, Some(index)) = (parts.is_empty(), self.current_index()) {
            let urls = tokio::task::spawn_blocking(move || {
                index.with_conn(|conn| query_narrow(conn, &parts))
            })
            .await
            .map_err(|e| Error::internal(format!("filter task failed: {e}")))??;

            let mut seen = HashSet::new();
            for url in urls {
                let Some(node) = self.tree.get(&url) else {
                    tracing::debug!(url = %url, "Node for hit not found, skipping hit");
                    continue;
                };
                if seen.insert(node.url()) {
                    results.nodes.push(node);
                }
            }
        }

        results.total = results.nodes.len();
        results.took = start.elapsed();
        results.is_stale = self.is_stale().await;
        Ok(results)
    }

    /// Case-insensitive substring match on titles, tags and keywords.
    #[must_use]
    pub fn legacy_filter_search(&self, query: &str) -> FilterResults {
        SEARCH_QUERIES.with_label_values(&["legacy"]).inc();
        let start = Instant::now();

        let needle = query.to_lowercase();
        let matches = |haystack: &str| !needle.is_empty() && haystack.to_lowercase().contains(&needle);

        let nodes: Vec<_> = self
            .tree
            .get_all()
            .into_iter()
            .filter(|n| {
                matches(&n.title())
                    || n.tags().iter().any(|t| matches(t))
                    || n.keywords().iter().any(|k| matches(k))
            })
            .collect();

        FilterResults {
            total: nodes.len(),
            nodes,
            took: start.elapsed(),
            is_stale: false,
        }
    }
}

impl std::fmt::Debug for Search {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Search")
            .field("lang", &self.lang)
            .field("persist", &self.persist)
            .finish_non_exhaustive()
    }
}

fn quoted(term: &str) -> String {
    format!("\"{}\"", term.replace('"', "\"\""))
}

/// Indexed terms within one edit of `term`.
fn fuzzy_terms(conn: &Connection, term: &str) -> Result<Vec<String>> {
    let folded = fold(term);
    let len = i64::try_from(folded.chars().count()).unwrap_or(i64::MAX);
    let mut stmt = conn.prepare_cached("SELECT term FROM wide_vocab WHERE length(term) BETWEEN ?1 AND ?2")?;
    let candidates = stmt
        .query_map(params![len - 1, len + 1], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(candidates
        .into_iter()
        .filter(|c| *c != folded && strsim::levenshtein(c, &folded) <= 1)
        .collect())
}

fn query_wide(conn: &Connection, lang: Language, terms: &[String]) -> Result<(Vec<(String, Vec<String>)>, usize)> {
    let mut alternatives = Vec::new();
    for term in terms {
        alternatives.push(format!("{}*", quoted(term)));
        alternatives.push(format!("{WIDE_STEMS} : {}", quoted(&lang.stem(term))));
        if term.chars().count() >= FUZZY_MIN_LEN {
            alternatives.extend(fuzzy_terms(conn, term)?.iter().map(|t| quoted(t)));
        }
    }
    let expr = alternatives.join(" OR ");

    let total: i64 = conn.query_row("SELECT count(*) FROM wide WHERE wide MATCH ?1", [&expr], |r| r.get(0))?;

    let sql = format!(
        "SELECT url,
                snippet(wide, {WIDE_DESCRIPTION}, '{MARK_START}', '{MARK_END}', '…', 16),
                snippet(wide, {WIDE_DOCS}, '{MARK_START}', '{MARK_END}', '…', 16)
         FROM wide
         WHERE wide MATCH ?1
         ORDER BY bm25(wide, 0.0, 5.0, 2.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0)
         LIMIT ?2"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![expr, MAX_RESULTS], |row| {
            let url: String = row.get(0)?;
            let description: String = row.get(1)?;
            let docs: String = row.get(2)?;
            let fragments = [description, docs]
                .into_iter()
                .filter(|f| f.contains(MARK_START))
                .collect();
            Ok((url, fragments))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((rows, usize::try_from(total).unwrap_or(0)))
}

fn query_narrow(conn: &Connection, parts: &[String]) -> Result<Vec<String>> {
    let expr = parts
        .iter()
        .map(|p| format!("{}*", quoted(p)))
        .collect::<Vec<_>>()
        .join(" AND ");

    let mut stmt = conn.prepare_cached("SELECT url FROM narrow WHERE narrow MATCH ?1 ORDER BY rank LIMIT ?2")?;
    let urls = stmt
        .query_map(params![expr, MAX_RESULTS], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(urls)
}

/// String leaves of an arbitrary JSON value, space separated.
fn json_text(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Null => {}
        serde_json::Value::String(s) => {
            let _ = write!(out, "{s} ");
        }
        serde_json::Value::Bool(_) | serde_json::Value::Number(_) => {
            let _ = write!(out, "{value} ");
        }
        serde_json::Value::Array(items) => items.iter().for_each(|v| json_text(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| json_text(v, out)),
    }
}

fn wide_doc(node: &Node, lang: Language) -> Result<WideDoc> {
    let mut authors = Vec::new();
    for a in node.authors() {
        authors.push(a.name);
        authors.push(a.email);
    }

    let mut files = vec![node.name()];
    let mut secondary_titles = Vec::new();
    let mut docs = Vec::new();
    for doc in node.docs()? {
        match doc.clean_text() {
            Ok(text) => docs.push(text),
            Err(e) => tracing::warn!(path = %doc.path().display(), error = %e, "Failed to index document"),
        }
        files.push(doc.name());
        secondary_titles.push(doc.title());
    }
    for asset in node.assets()? {
        files.push(asset.name());
        secondary_titles.push(asset.title());
    }

    let mut custom = String::new();
    json_text(node.custom(), &mut custom);

    let docs = docs.join("\n");
    let stems = lang.stems(&format!("{}\n{}\n{docs}", node.title(), node.description()));

    Ok(WideDoc {
        url: node.url(),
        title: node.title(),
        secondary_titles: secondary_titles.join("\n"),
        tags: node.tags().join("\n"),
        authors: authors.join("\n"),
        description: node.description().to_string(),
        docs,
        files: files.join("\n"),
        version: node.version().to_string(),
        custom,
        stems,
    })
}

fn build_index(nodes: &[Arc<Node>], lang: Language, persist: Option<&std::path::Path>) -> Result<Index> {
    let docs = nodes
        .iter()
        .map(|n| wide_doc(n, lang))
        .collect::<Result<Vec<_>>>()?;

    let index = Index::create(persist, TOKENIZER)?;
    let written = index.with_transaction(|conn| {
        let mut wide = conn.prepare(
            "INSERT INTO wide (url, title, secondary_titles, tags, authors, description, docs, files, version, custom, stems)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        let mut narrow = conn.prepare("INSERT INTO narrow (url, title, tags) VALUES (?1, ?2, ?3)")?;

        for d in &docs {
            wide.execute(params![
                d.url,
                d.title,
                d.secondary_titles,
                d.tags,
                d.authors,
                d.description,
                d.docs,
                d.files,
                d.version,
                d.custom,
                d.stems
            ])?;
            narrow.execute(params![d.url, d.title, d.tags])?;
        }
        Ok(())
    });
    if let Err(e) = written {
        index.discard();
        return Err(e);
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::author::AuthorStore;
    use crate::bus::Broker;
    use crate::config::ConfigStore;
    use crate::ddt::NodeContext;
    use crate::meta::MetaStore;
    use std::path::Path;
    use tempfile::TempDir;

    fn node(root: &Path, name: &str, meta: Option<&str>) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        if let Some(meta) = meta {
            std::fs::write(dir.join("meta.yaml"), meta).unwrap();
        }
    }

    async fn search(root: &Path, lang: &str) -> Search {
        let ctx = Arc::new(NodeContext {
            root: root.to_path_buf(),
            config: Arc::new(ConfigStore::static_defaults("example")),
            meta: MetaStore::Noop,
            authors: Arc::new(AuthorStore::Noop),
        });
        let tree = Arc::new(Tree::new(ctx, "live", Broker::new()));
        tree.sync().await.unwrap();
        let s = Search::new(tree, lang, None).unwrap();
        s.refresh().await.unwrap();
        s
    }

    async fn full(s: &Search, q: &str) -> Vec<String> {
        s.full_search(q).await.unwrap().hits.iter().map(|h| h.node.title()).collect()
    }

    async fn filter(s: &Search, q: &str) -> Vec<String> {
        let mut titles: Vec<_> = s.filter_search(q).await.unwrap().nodes.iter().map(|n| n.title()).collect();
        titles.sort();
        titles
    }

    #[tokio::test]
    async fn test_unknown_language() {
        let tmp = TempDir::new().unwrap();
        let ctx = Arc::new(NodeContext {
            root: tmp.path().to_path_buf(),
            config: Arc::new(ConfigStore::static_defaults("example")),
            meta: MetaStore::Noop,
            authors: Arc::new(AuthorStore::Noop),
        });
        let tree = Arc::new(Tree::new(ctx, "live", Broker::new()));
        assert!(Search::new(tree, "xx", None).is_err());
    }

    #[tokio::test]
    async fn test_full_search_word_partials() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Navigation", None);
        let s = search(tmp.path(), "en").await;

        for q in ["na", "nav", "naviga", "navigatio", "navigation", "NAVigation"] {
            assert!(full(&s, q).await.contains(&"Navigation".to_string()), "{q}");
        }
    }

    #[tokio::test]
    async fn test_full_search_diacritics() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Diversität", None);
        for lang in ["de", "en"] {
            let s = search(tmp.path(), lang).await;
            assert_eq!(full(&s, "diversität").await, vec!["Diversität"], "{lang}");
        }
    }

    #[tokio::test]
    async fn test_full_search_or_and_stopwords() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Great", None);
        node(tmp.path(), "Fantastic", None);
        node(tmp.path(), "The Diversity", None);
        let s = search(tmp.path(), "en").await;

        let mut found = full(&s, "fantastic great").await;
        found.sort();
        assert_eq!(found, vec!["Fantastic", "Great"]);
        assert!(full(&s, "the").await.is_empty());
        assert!(full(&s, "").await.is_empty());
    }

    #[tokio::test]
    async fn test_full_search_matches_word_forms() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Spinner", None);
        std::fs::write(tmp.path().join("Spinner/readme.md"), "The spinner keeps running while content loads.").unwrap();
        node(tmp.path(), "Tooltip", None);
        let s = search(tmp.path(), "en").await;
        assert_eq!(full(&s, "runs").await, vec!["Spinner"]);

        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Gebäude", Some("description: Ein Haus am See.\n"));
        node(tmp.path(), "Farben", None);
        let s = search(tmp.path(), "de").await;
        assert_eq!(full(&s, "Häuser").await, vec!["Gebäude"]);
    }

    #[tokio::test]
    async fn test_full_search_fields() {
        let tmp = TempDir::new().unwrap();
        node(
            tmp.path(),
            "Colors",
            Some(
                "authors: [randall@evilcorp.org]\nversion: \"2\"\ndescription: The things we actually mean when we say words that sound fancy.\ntags: [foo, bar]\ncustom:\n  synonyms: [palette]\n",
            ),
        );
        std::fs::write(tmp.path().join("Colors/document.md"), "The following visual design has been agreed upon.").unwrap();
        let s = search(tmp.path(), "en").await;

        for q in [
            "randall@evilcorp.org",
            "randall",
            "evilcrp.org",
            "Version:2",
            "fancy",
            "foo bar",
            "palette",
            "document.md",
            "document",
            "visual design",
            "coLOrs",
        ] {
            assert_eq!(full(&s, q).await, vec!["Colors"], "{q}");
        }
    }

    #[tokio::test]
    async fn test_full_search_fragments() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Colors", Some("description: Shades of red and blue.\n"));
        std::fs::write(tmp.path().join("Colors/readme.md"), "# Usage\n\nUse red for errors.").unwrap();
        let s = search(tmp.path(), "en").await;

        let results = s.full_search("red").await.unwrap();
        assert_eq!(results.total, 1);
        assert!(!results.is_stale);
        let fragments = &results.hits[0].fragments;
        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].contains("<mark>red</mark>"), "{fragments:?}");
        assert!(fragments[1].contains("<mark>red</mark>"), "{fragments:?}");

        let title_only = s.full_search("colors").await.unwrap();
        assert!(title_only.hits[0].fragments.is_empty());
    }

    #[tokio::test]
    async fn test_filter_search_tags_and() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Colors", Some("tags: [foo, bar, qux]\n"));
        node(tmp.path(), "Navigation", Some("tags: [foo]\n"));
        node(tmp.path(), "Type", Some("tags: [bar]\n"));
        let s = search(tmp.path(), "en").await;

        assert_eq!(filter(&s, "foo").await, vec!["Colors", "Navigation"]);
        assert_eq!(filter(&s, "bar").await, vec!["Colors", "Type"]);
        assert_eq!(filter(&s, "foo bar").await, vec!["Colors"]);
        assert_eq!(filter(&s, "foo col").await, vec!["Colors"]);
        assert!(filter(&s, "foo shadows").await.is_empty());
        assert!(filter(&s, "").await.is_empty());
        assert!(filter(&s, "   ").await.is_empty());
    }

    #[tokio::test]
    async fn test_filter_search_namespaced_tags() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Colors", Some("tags: [foo, status/draft, needs images]\n"));
        node(tmp.path(), "Navigation", Some("tags: [status/ready]\n"));
        node(tmp.path(), "Type", Some("tags: [draft]\n"));
        let s = search(tmp.path(), "en").await;

        assert_eq!(filter(&s, "status").await, vec!["Colors", "Navigation"]);
        assert_eq!(filter(&s, "status/draft").await, vec!["Colors"]);
        assert_eq!(filter(&s, "draft").await, vec!["Colors", "Type"]);
        assert_eq!(filter(&s, "needs images").await, vec!["Colors"]);
    }

    #[tokio::test]
    async fn test_filter_search_prefixes() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Colors", None);
        node(tmp.path(), "Diversität", None);
        let s = search(tmp.path(), "de").await;

        for q in ["c", "co", "col", "coLOrs"] {
            assert_eq!(filter(&s, q).await, vec!["Colors"], "{q}");
        }
        for q in ["diversit", "diversitä"] {
            assert_eq!(filter(&s, q).await, vec!["Diversität"], "{q}");
        }
    }

    #[tokio::test]
    async fn test_filter_is_subset_of_full() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Colors", Some("tags: [foo]\n"));
        node(tmp.path(), "Navigation", Some("tags: [foo]\n"));
        node(tmp.path(), "Type", None);
        let s = search(tmp.path(), "en").await;

        for q in ["foo", "col", "type", "nav"] {
            let full: HashSet<_> = full(&s, q).await.into_iter().collect();
            for title in filter(&s, q).await {
                assert!(full.contains(&title), "{q}: {title}");
            }
        }
    }

    #[tokio::test]
    async fn test_legacy_filter() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Colors", Some("keywords: [palette]\n"));
        node(tmp.path(), "Navigation", Some("tags: [menu]\n"));
        let s = search(tmp.path(), "en").await;

        let titles = |r: FilterResults| r.nodes.iter().map(|n| n.title()).collect::<Vec<_>>();
        assert_eq!(titles(s.legacy_filter_search("LOR")), vec!["Colors"]);
        assert_eq!(titles(s.legacy_filter_search("pal")), vec!["Colors"]);
        assert_eq!(titles(s.legacy_filter_search("enu")), vec!["Navigation"]);
        assert!(s.legacy_filter_search("").nodes.is_empty());
    }

    #[tokio::test]
    async fn test_stale_after_change() {
        let tmp = TempDir::new().unwrap();
        node(tmp.path(), "Colors", None);
        let s = search(tmp.path(), "en").await;
        assert!(!s.is_stale().await);

        let file = std::fs::File::create(tmp.path().join("Colors/readme.md")).unwrap();
        file.set_modified(std::time::SystemTime::now() + Duration::from_secs(3600)).unwrap();
        drop(file);
        s.tree.sync().await.unwrap();
        assert!(s.is_stale().await);

        s.refresh().await.unwrap();
        assert!(!s.is_stale().await);
    }

    #[tokio::test]
    async fn test_persisted_index_removed_on_close() {
        let tmp = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        node(tmp.path(), "Colors", None);

        let ctx = Arc::new(NodeContext {
            root: tmp.path().to_path_buf(),
            config: Arc::new(ConfigStore::static_defaults("example")),
            meta: MetaStore::Noop,
            authors: Arc::new(AuthorStore::Noop),
        });
        let tree = Arc::new(Tree::new(ctx, "live", Broker::new()));
        tree.sync().await.unwrap();
        let s = Search::new(tree, "en", Some(store.path().to_path_buf())).unwrap();
        let files = || std::fs::read_dir(store.path()).unwrap().count();

        s.refresh().await.unwrap();
        s.refresh().await.unwrap();
        assert_eq!(files(), 1);
        assert_eq!(full(&s, "colors").await, vec!["Colors"]);

        s.close();
        assert_eq!(files(), 0);
        assert!(s.is_stale().await);
    }
}

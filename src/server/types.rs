//! Records answered by the API.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::author::Author;
use crate::ddt::{table_of_contents, Node, NodeAsset, TocEntry, Tree};
use crate::search::{FilterResults, FullSearchResults};
use crate::Result;

#[derive(Debug, Clone, Serialize)]
pub struct V1Hello {
    pub hello: String,
    pub org: String,
    pub project: String,
    pub version: String,
}

/// A reference to a node; look it up by URL for details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct V1RefNode {
    pub url: String,
    pub title: String,
}

impl From<&Node> for V1RefNode {
    fn from(n: &Node) -> Self {
        Self {
            url: n.url(),
            title: n.title(),
        }
    }
}

fn refs(nodes: &[Arc<Node>]) -> Vec<V1RefNode> {
    nodes.iter().map(|n| V1RefNode::from(n.as_ref())).collect()
}

/// A light, top down representation of the tree.
#[derive(Debug, Clone, Serialize)]
pub struct V1TreeNode {
    pub hash: String,
    pub url: String,
    pub children: Vec<V1TreeNode>,
    pub title: String,
}

impl V1TreeNode {
    /// # Errors
    ///
    /// Returns an error if a node hash cannot be calculated.
    pub fn build(n: &Node) -> Result<Self> {
        Ok(Self {
            hash: n.calculate_hash()?,
            url: n.url(),
            children: n
                .children()
                .iter()
                .map(|c| Self::build(c))
                .collect::<Result<_>>()?,
            title: n.title(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct V1NodeTree {
    pub hash: String,
    pub root: V1TreeNode,
    pub total: usize,
}

impl V1NodeTree {
    /// # Errors
    ///
    /// Returns an error if the tree was not synced or a hash cannot be
    /// calculated.
    pub fn build(tree: &Tree) -> Result<Self> {
        let root = tree.root().ok_or(crate::error::TreeError::NotSynced)?;
        let root = V1TreeNode::build(&root)?;
        Ok(Self {
            // Same as the root node's.
            hash: root.hash.clone(),
            root,
            total: tree.total_nodes(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct V1NodeDocComponent {
    pub raw: String,
    pub position: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct V1NodeDoc {
    pub title: String,
    pub html: String,
    pub raw: String,
    pub toc: Vec<TocEntry>,
    pub components: Vec<V1NodeDocComponent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct V1NodeAsset {
    pub url: String,
    pub name: String,
    pub title: String,
    pub modified: i64,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl V1NodeAsset {
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'ed.
    pub async fn build(a: &NodeAsset) -> Result<Self> {
        let (width, height) = a.dimensions().unzip();
        Ok(Self {
            url: a.url.clone(),
            name: a.name(),
            title: a.title(),
            modified: a.modified().await?.timestamp().max(0),
            size: a.size()?,
            width,
            height,
        })
    }
}

/// Everything about a single node.
#[derive(Debug, Clone, Serialize)]
pub struct V1Node {
    pub hash: String,
    pub url: String,
    pub parent: Option<V1RefNode>,
    pub children: Vec<V1RefNode>,
    pub title: String,
    pub description: String,
    pub authors: Vec<Author>,
    /// Unix timestamp, 0 when unknown.
    pub modified: i64,
    pub version: String,
    pub tags: Vec<String>,
    pub custom: serde_json::Value,
    pub docs: Vec<V1NodeDoc>,
    pub assets: Vec<V1NodeAsset>,
    pub crumbs: Vec<V1RefNode>,
    pub related: Vec<V1RefNode>,
    pub prev: Option<V1RefNode>,
    pub next: Option<V1RefNode>,
    /// Alias of `assets`, kept for older clients.
    pub downloads: Vec<V1NodeAsset>,
}

impl V1Node {
    /// Build the record, rendering documents with links below
    /// `tree_prefix` that select `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if a document, asset or the modification time of
    /// the node cannot be read.
    pub async fn build(n: &Node, tree: &Tree, tree_prefix: &str, source: &str) -> Result<Self> {
        let url = n.url();

        let mut docs = Vec::new();
        for doc in n.docs()? {
            let html = doc.html(tree_prefix, &url, tree, source)?;
            docs.push(V1NodeDoc {
                title: doc.title(),
                toc: table_of_contents(&html)?,
                raw: doc.raw()?,
                components: doc
                    .components()?
                    .into_iter()
                    .map(|c| V1NodeDocComponent {
                        raw: c.raw,
                        position: c.position,
                    })
                    .collect(),
                html,
            });
        }

        let mut assets = Vec::new();
        for asset in n.assets()? {
            assets.push(V1NodeAsset::build(&asset).await?);
        }

        let (prev, next) = tree.neighbor_nodes(n)?;

        Ok(Self {
            hash: n.calculate_hash()?,
            parent: n.parent().map(|p| V1RefNode::from(p.as_ref())),
            children: refs(n.children()),
            title: n.title(),
            description: n.description().to_string(),
            authors: n.authors(),
            modified: n.modified().await?.timestamp().max(0),
            version: n.version().to_string(),
            tags: n.tags(),
            custom: n.custom().clone(),
            docs,
            downloads: assets.clone(),
            assets,
            crumbs: refs(&n.crumbs(tree)),
            related: refs(&n.related(tree)),
            prev: prev.map(|p| V1RefNode::from(p.as_ref())),
            next: next.map(|p| V1RefNode::from(p.as_ref())),
            url,
        })
    }
}

fn nanos(took: Duration) -> u64 {
    u64::try_from(took.as_nanos()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Serialize)]
pub struct V1SearchResults {
    pub urls: Vec<String>,
    pub total: usize,
    /// Nanoseconds.
    pub took: u64,
}

impl From<FilterResults> for V1SearchResults {
    fn from(r: FilterResults) -> Self {
        Self {
            urls: r.nodes.iter().map(|n| n.url()).collect(),
            total: r.total,
            took: nanos(r.took),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct V1Message {
    pub topic: String,
    pub text: String,
    /// The topic with its first dot replaced by a dash, for older
    /// clients.
    #[serde(rename = "type")]
    pub typ: String,
}

impl From<crate::bus::Message> for V1Message {
    fn from(m: crate::bus::Message) -> Self {
        Self {
            typ: m.topic.replacen('.', "-", 1),
            topic: m.topic,
            text: m.text,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct V2FullSearchHit {
    #[serde(flatten)]
    pub node: V1RefNode,
    pub description: String,
    pub fragments: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct V2FullSearchResults {
    pub hits: Vec<V2FullSearchHit>,
    pub total: usize,
    /// Nanoseconds.
    pub took: u64,
}

impl From<FullSearchResults> for V2FullSearchResults {
    fn from(r: FullSearchResults) -> Self {
        Self {
            hits: r
                .hits
                .into_iter()
                .map(|h| V2FullSearchHit {
                    node: V1RefNode::from(h.node.as_ref()),
                    description: h.node.description().to_string(),
                    fragments: h.fragments,
                })
                .collect(),
            total: r.total,
            took: nanos(r.took),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct V2FilterResults {
    pub nodes: Vec<V1RefNode>,
    pub total: usize,
    /// Nanoseconds.
    pub took: u64,
}

impl From<FilterResults> for V2FilterResults {
    fn from(r: FilterResults) -> Self {
        Self {
            nodes: refs(&r.nodes),
            total: r.total,
            took: nanos(r.took),
        }
    }
}

//! Design definitions tree: nodes, documents, assets and the tree itself.
//!
//! Every directory below the tree root is a [`Node`]. Nodes carry
//! documents ([`NodeDoc`]) that are rendered to HTML and run through the
//! [`Transformer`], and downloadable files ([`NodeAsset`]).

mod asset;
mod component;
mod doc;
pub mod html;
mod meta;
mod node;
mod transformer;
mod tree;
mod url;

pub use asset::{alternate_names, NodeAsset};
pub use component::{NodeDocComponent, PLACEHOLDER_PREFIX};
pub use doc::{table_of_contents, NodeDoc, TocEntry};
pub use meta::{NodeMeta, META_REGEX};
pub use node::{Node, NodeContext, NodeGetter, ASSET_IGNORE_REGEX, DOC_REGEX};
pub use transformer::Transformer;
pub use tree::{Tree, TOPIC_SYNCED};
pub use self::url::{lookup_node_url, nfc, normalize_node_url, order_number, remove_order_number};

//! Post-processing of rendered document HTML.
//!
//! Documents can be placed anywhere inside the frontend's URL structure,
//! so all relative URLs are made absolute. References to nodes and node
//! assets are discovered and rebuilt from the canonical node URL, and the
//! referencing element gets `data-node` (and `data-node-asset`)
//! attributes. Images of node assets are sized. HTML inside `<code>` is
//! escaped without double escaping.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use lol_html::html_content::{ContentType, Element};
use lol_html::{doc_text, element, rewrite_str, HandlerResult, RewriteStrSettings};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::{form_urlencoded, Position, Url};

use super::html::{decode, rewrite_error, Tag};
use super::node::NodeGetter;
use super::url::join_url_path;
use crate::Result;

/// Attributes besides `src` and `href` that may carry URLs.
pub const GENERIC_URL_ATTRS: &[&str] = &["annotate"];

const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Pieces of an attribute URL.
struct Parts<'a> {
    path: String,
    query: &'a str,
    fragment: &'a str,
}

impl<'a> Parts<'a> {
    fn split(value: &'a str) -> Self {
        let (rest, fragment) = value.split_once('#').unwrap_or((value, ""));
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        Self {
            path: percent_decode_str(path).decode_utf8_lossy().into_owned(),
            query,
            fragment,
        }
    }
}

/// Whether the URL has a scheme or host and cannot be a node reference.
fn is_external(value: &str) -> bool {
    value.starts_with("//") || Url::parse(value).is_ok()
}

/// Paths that only make sense relative to the current node.
fn is_dot_relative(path: &str) -> bool {
    path.is_empty() || path == "." || path == ".." || path.starts_with("./") || path.starts_with("../")
}

/// Lexically resolve `.` and `..` segments; the result has no leading or
/// trailing slash.
fn resolve_segments(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            s => out.push(s),
        }
    }
    out.join("/")
}

/// Write an element nested in `<code>` as escaped text.
fn escape_element(el: &mut Element<'_, '_>) {
    let start = Tag::from_element(el).to_html();
    let end = format!("&lt;/{}&gt;", el.tag_name());
    el.before(&html_escape::encode_safe(&start), ContentType::Html);
    if let Some(handlers) = el.end_tag_handlers() {
        handlers.push(Box::new(move |tag| {
            tag.after(&end, ContentType::Html);
            Ok(())
        }));
    }
    el.remove_and_keep_content();
}

/// A discovered node reference.
struct Discovered {
    node: String,
    asset: Option<String>,
}

/// Rewrites document HTML for one node of one source.
pub struct Transformer<'a> {
    /// i.e. `/api/v2/tree`
    tree_prefix: String,
    /// i.e. `foo/bar`
    node_url: String,
    /// Name of the source the document belongs to.
    source: String,
    get: &'a dyn NodeGetter,
}

impl<'a> Transformer<'a> {
    #[must_use]
    pub fn new(
        tree_prefix: impl Into<String>,
        node_url: impl Into<String>,
        get: &'a dyn NodeGetter,
        source: impl Into<String>,
    ) -> Self {
        Self {
            tree_prefix: tree_prefix.into(),
            node_url: node_url.into(),
            source: source.into(),
            get,
        }
    }

    /// Process HTML, see the module documentation.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTML cannot be rewritten.
    pub fn process(&self, html: &str) -> Result<String> {
        let escaping = Rc::new(Cell::new(false));
        let in_code = Rc::clone(&escaping);
        let mut pending = String::new();

        rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![element!("*", |el| {
                    if in_code.get() {
                        escape_element(el);
                        return Ok(());
                    }
                    if el.tag_name() == "code" {
                        if let Some(handlers) = el.end_tag_handlers() {
                            in_code.set(true);
                            let in_code = Rc::clone(&in_code);
                            handlers.push(Box::new(move |_end| {
                                in_code.set(false);
                                Ok(())
                            }));
                        }
                        return Ok(());
                    }
                    self.rewrite(el)
                })],
                document_content_handlers: vec![doc_text!(|t| {
                    if !escaping.get() {
                        return Ok(());
                    }
                    // Markdown escapes code blocks already, plain HTML does not.
                    pending.push_str(t.as_str());
                    if t.last_in_text_node() {
                        let escaped = html_escape::encode_safe(&decode(&pending)).into_owned();
                        t.replace(&escaped, ContentType::Html);
                        pending.clear();
                    } else {
                        t.remove();
                    }
                    Ok(())
                })],
                ..RewriteStrSettings::new()
            },
        )
        .map_err(rewrite_error)
    }

    fn rewrite(&self, el: &mut Element<'_, '_>) -> HandlerResult {
        let tag = Tag::from_element(el);
        let mut rewritten = tag.clone();
        if tag.is("img") {
            self.add_data_node(&mut rewritten, "src");
            self.make_absolute(&mut rewritten, "src");
            self.size(&mut rewritten);
        } else if tag.is("video") || tag.is("audio") {
            self.add_data_node(&mut rewritten, "src");
            self.make_absolute(&mut rewritten, "src");
        } else if tag.is("a") {
            self.add_data_node(&mut rewritten, "href");
            self.make_absolute(&mut rewritten, "href");
        } else if tag.attr("src").is_some() {
            self.add_data_node(&mut rewritten, "src");
            self.make_absolute(&mut rewritten, "src");
        } else {
            for attr in GENERIC_URL_ATTRS {
                self.make_absolute(&mut rewritten, attr);
            }
        }
        rewritten.apply(&tag, el)
    }

    /// Look up a clean relative path as a node, or as an asset of the node
    /// named by its directory part.
    fn discover(&self, path: &str) -> Option<Discovered> {
        if let Some(node) = self.get.get(path) {
            return Some(Discovered {
                node: node.url(),
                asset: None,
            });
        }
        let (dir, base) = path.rsplit_once('/').unwrap_or(("", path));
        if base.is_empty() {
            return None;
        }
        let node = self.get.get(dir)?;
        match node.asset(base) {
            Ok(Some(asset)) => Some(Discovered {
                node: node.url(),
                asset: Some(asset.name()),
            }),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(node = %node.url(), asset = base, error = %e, "Failed to look up asset");
                None
            }
        }
    }

    /// Add `data-node` and `data-node-asset` when the attribute references
    /// a node or node asset.
    ///
    /// The URL is first looked up as-is, which supports both `/foo/bar` and
    /// `foo/bar`, then relative to the current node. Dot-relative URLs are
    /// only looked up relative to the current node.
    fn add_data_node(&self, tag: &mut Tag, attr: &str) {
        let Some(value) = tag.attr(attr) else {
            return;
        };
        if is_external(value) {
            return;
        }
        let parts = Parts::split(value);

        let mut found = None;
        if !is_dot_relative(&parts.path) {
            found = self.discover(&resolve_segments(&parts.path));
        }
        if found.is_none() {
            let relative = format!("{}/{}", self.node_url, parts.path);
            found = self.discover(&resolve_segments(&relative));
        }
        let Some(found) = found else {
            return;
        };

        tag.set_attr("data-node", found.node);
        if let Some(asset) = found.asset {
            tag.set_attr("data-node-asset", asset);
        }
    }

    /// Rebuild node references from `data-node`, keeping query and fragment
    /// of the original and setting `v` to the source. Other relative URLs
    /// are resolved against the node's tree URL.
    fn make_absolute(&self, tag: &mut Tag, attr: &str) {
        let Some(value) = tag.attr(attr).map(str::to_string) else {
            return;
        };

        if let Some(node) = tag.attr("data-node").map(str::to_string) {
            let parts = Parts::split(&value);

            let mut query: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for (k, v) in form_urlencoded::parse(parts.query.as_bytes()) {
                query.entry(k.into_owned()).or_default().push(v.into_owned());
            }
            query.insert("v".to_string(), vec![self.source.clone()]);

            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (k, values) in &query {
                for v in values {
                    serializer.append_pair(k, v);
                }
            }

            let asset = tag
                .attr("data-node-asset")
                .map(|a| utf8_percent_encode(a, SEGMENT).to_string())
                .unwrap_or_default();
            let mut url = join_url_path([self.tree_prefix.as_str(), node.as_str(), asset.as_str()]);
            url.push('?');
            url.push_str(&serializer.finish());
            if !parts.fragment.is_empty() {
                url.push('#');
                url.push_str(parts.fragment);
            }
            tag.set_attr(attr, url);
            return;
        }

        if is_external(&value) {
            return;
        }
        let tree_base = format!("{}/", join_url_path([self.tree_prefix.as_str(), self.node_url.as_str()]));
        let resolved = Url::parse("http://dsk.invalid")
            .and_then(|base| base.join(&tree_base))
            .and_then(|base| base.join(&value));
        match resolved {
            Ok(u) => tag.set_attr(attr, &u[Position::BeforePath..]),
            Err(e) => tracing::debug!(url = %value, error = %e, "Leaving unparsable URL as is"),
        }
    }

    /// Append `width` and `height` for image assets.
    fn size(&self, tag: &mut Tag) {
        let (Some(node), Some(asset)) = (tag.attr("data-node"), tag.attr("data-node-asset")) else {
            return;
        };
        let Some(node) = self.get.get(node) else {
            return;
        };
        let Ok(Some(asset)) = node.asset(asset) else {
            return;
        };
        if let Some((w, h)) = asset.dimensions() {
            tag.set_attr("width", w.to_string());
            tag.set_attr("height", h.to_string());
        }
    }
}

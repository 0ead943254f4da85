//! Documents inside a node directory.

use std::path::{Path, PathBuf};

use pulldown_cmark::{html::push_html, Options, Parser};
use serde::Serialize;

use super::component::{self, NodeDocComponent};
use super::html::{events, text_content, Event};
use super::node::NodeGetter;
use super::transformer::Transformer;
use super::url::{nfc, order_number, remove_order_number};
use crate::error::TreeError;
use crate::Result;

/// A Markdown, HTML or plain text document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDoc {
    path: PathBuf,
}

/// Entry of a document's table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub title: String,
    pub level: u8,
    pub children: Vec<TocEntry>,
}

impl TocEntry {
    fn push(&mut self, entry: Self) {
        match self.children.last_mut() {
            Some(last) if last.level < entry.level => last.push(entry),
            _ => self.children.push(entry),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Markdown,
    Html,
    Text,
}

impl NodeDoc {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn basename(&self) -> String {
        nfc(&self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    fn format(&self) -> Option<Format> {
        let ext = self.path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(Format::Markdown),
            "html" | "htm" => Some(Format::Html),
            "txt" => Some(Format::Text),
            _ => None,
        }
    }

    #[must_use]
    pub fn order(&self) -> u64 {
        order_number(&self.basename())
    }

    /// Basename without order number.
    #[must_use]
    pub fn name(&self) -> String {
        remove_order_number(&self.basename())
    }

    /// Basename without order number and extension.
    #[must_use]
    pub fn title(&self) -> String {
        let base = self.basename();
        let stem = match base.rfind('.') {
            Some(i) if i > 0 => &base[..i],
            _ => base.as_str(),
        };
        remove_order_number(stem)
    }

    /// Unprocessed file contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn raw(&self) -> Result<String> {
        Ok(std::fs::read_to_string(&self.path)?)
    }

    fn render_error(&self, reason: impl Into<String>) -> crate::Error {
        TreeError::Render {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
        .into()
    }

    /// Document rendered to HTML, with URLs rewritten for the frontend.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or has an
    /// unsupported format.
    pub fn html(
        &self,
        tree_prefix: &str,
        node_url: &str,
        get: &dyn NodeGetter,
        source: &str,
    ) -> Result<String> {
        let contents = self.raw()?;
        let transformer = Transformer::new(tree_prefix, node_url, get, source);

        match self.format() {
            Some(Format::Markdown) => {
                let components = component::find_in_markdown(&contents);
                let extracted = component::extract(&contents, &components);
                let html = component::insert(&render_markdown(&extracted), &components);
                transformer.process(&html)
            }
            Some(Format::Html) => transformer.process(&contents),
            Some(Format::Text) => Ok(format!("<pre>{}</pre>", html_escape::encode_safe(&contents))),
            None => Err(self.render_error("unsupported document format")),
        }
    }

    /// Text without markup, for indexing.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or has an
    /// unsupported format.
    pub fn clean_text(&self) -> Result<String> {
        let contents = self.raw()?;
        match self.format() {
            Some(Format::Markdown) => text_content(&render_markdown(&contents)),
            Some(Format::Html) => text_content(&contents),
            Some(Format::Text) => Ok(contents),
            None => Err(self.render_error("unsupported document format")),
        }
    }

    /// Components found in the document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read.
    pub fn components(&self) -> Result<Vec<NodeDocComponent>> {
        match self.format() {
            Some(Format::Markdown) => Ok(component::find_in_markdown(&self.raw()?)),
            Some(Format::Html) => Ok(component::find_in_html(&self.raw()?)),
            _ => Ok(Vec::new()),
        }
    }
}

fn render_markdown(contents: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS;
    let mut out = String::with_capacity(contents.len() * 3 / 2);
    push_html(&mut out, Parser::new_ext(contents, options));
    out
}

fn heading_level(name: &str) -> Option<u8> {
    let bytes = name.as_bytes();
    match bytes {
        [h, d] if h.eq_ignore_ascii_case(&b'h') && (b'1'..=b'6').contains(d) => Some(d - b'0'),
        _ => None,
    }
}

/// Headings of rendered HTML, each nested below the closest preceding
/// heading of a lower level.
///
/// # Errors
///
/// Returns an error if the HTML cannot be walked.
pub fn table_of_contents(html: &str) -> Result<Vec<TocEntry>> {
    let mut root = TocEntry {
        title: String::new(),
        level: 0,
        children: Vec::new(),
    };
    let mut current: Option<(u8, String)> = None;

    for event in events(html)? {
        match event {
            Event::Start(name) if current.is_none() => {
                if let Some(level) = heading_level(&name) {
                    current = Some((level, String::new()));
                }
            }
            Event::Text(text) => {
                if let Some((_, title)) = current.as_mut() {
                    title.push_str(&text);
                }
            }
            Event::End(name) => {
                let closes = matches!(current, Some((level, _)) if heading_level(&name) == Some(level));
                if let Some((level, title)) = current.take_if(|_| closes) {
                    root.push(TocEntry {
                        title: title.split_whitespace().collect::<Vec<_>>().join(" "),
                        level,
                        children: Vec::new(),
                    });
                }
            }
            Event::Start(_) => {}
        }
    }
    Ok(root.children)
}

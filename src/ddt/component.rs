//! Custom component tags embedded in Markdown documents.
//!
//! Markdown allows raw HTML, but runs it through the parser, which mangles
//! attribute quoting and whitespace of component markup. Components are
//! therefore cut out before parsing, replaced with a placeholder, and put
//! back into the rendered HTML afterwards.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sha1::{Digest, Sha1};

static TAG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<([A-Za-z0-9]+)").expect("valid regex"));

/// Prefix of placeholder tokens.
pub const PLACEHOLDER_PREFIX: &str = "dsk+component+";

/// A contiguous HTML-like span inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeDocComponent {
    /// Opening tag name, case preserved.
    pub tag: String,
    /// Outer raw text, including opening and closing tags.
    pub raw: String,
    /// Raw text between opening and closing tag.
    pub inner: String,
    /// Nesting level; only top-level components are found.
    pub level: u32,
    /// Byte offset inside the document.
    pub position: usize,
    /// Length of `raw` in bytes.
    pub length: usize,
    #[serde(skip)]
    opening_len: usize,
    #[serde(skip)]
    id: String,
}

impl NodeDocComponent {
    fn new(tag: &str, raw: &str, opening_len: usize, position: usize) -> Self {
        let closing = format!("</{tag}>");
        let inner_end = raw.rfind(&closing).unwrap_or(raw.len());
        let inner = raw.get(opening_len..inner_end).unwrap_or_default();

        let mut hasher = Sha1::new();
        let stripped: String = inner
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        hasher.update(stripped.as_bytes());
        hasher.update(position.to_string().as_bytes());

        Self {
            tag: tag.to_string(),
            raw: raw.to_string(),
            inner: inner.to_string(),
            level: 0,
            position,
            length: raw.len(),
            opening_len,
            id: hex::encode(hasher.finalize()),
        }
    }

    /// Stable identity over inner text and position.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Token standing in for the component while Markdown is parsed.
    #[must_use]
    pub fn placeholder(&self) -> String {
        format!("{PLACEHOLDER_PREFIX}{}", self.id)
    }

    /// Raw text with a `data-component` attribute added to the opening
    /// tag.
    #[must_use]
    pub fn identified(&self) -> String {
        let mut at = self.opening_len.saturating_sub(1);
        if at > 0 && self.raw.as_bytes().get(at - 1) == Some(&b'/') {
            at -= 1;
        }
        let (head, tail) = self.raw.split_at(at.min(self.raw.len()));
        let head = head.trim_end();
        format!("{head} data-component=\"{}\"{tail}", self.id)
    }
}

/// Find top-level components in Markdown.
///
/// Anything that looks like HTML outside of code spans, fenced code and
/// comments is considered a component.
#[must_use]
pub fn find_in_markdown(contents: &str) -> Vec<NodeDocComponent> {
    let c = contents.as_bytes();
    let mut found = Vec::new();

    let mut is_code = false;
    let mut consuming = false;
    let mut looking_for_tag = false;
    let mut start = 0;
    let mut opening_len = 0;
    let mut tag = String::new();
    let mut closing = String::new();

    let mut i = 0;
    while i < c.len() {
        if c[i] == b'`' && (i == 0 || c[i - 1] != b'\\') {
            if i + 2 < c.len() && c[i + 1] == b'`' && c[i + 2] == b'`' {
                i += 2;
            }
            is_code = !is_code;
        }
        if is_code {
            i += 1;
            continue;
        }

        if consuming {
            if c[i] == b'>' {
                let current = &contents[start..=i];
                if looking_for_tag {
                    looking_for_tag = false;
                    match TAG_NAME.captures(current).and_then(|m| m.get(1)) {
                        Some(name) => {
                            tag = name.as_str().to_string();
                            closing = format!("</{tag}>");
                            opening_len = current.len();
                        }
                        None => consuming = false,
                    }
                } else if current.contains(&closing) {
                    found.push(NodeDocComponent::new(&tag, current, opening_len, start));
                    consuming = false;
                }
            }
            i += 1;
            continue;
        }

        if c[i] == b'<' && c.get(i + 1) != Some(&b'!') {
            consuming = true;
            looking_for_tag = true;
            start = i;
        }
        i += 1;
    }
    found
}

/// Components in HTML documents are passed through as they are.
#[must_use]
pub fn find_in_html(_contents: &str) -> Vec<NodeDocComponent> {
    Vec::new()
}

/// Replace each component with its placeholder.
#[must_use]
pub fn extract(contents: &str, components: &[NodeDocComponent]) -> String {
    let mut out = String::with_capacity(contents.len());
    let mut last = 0;

    for component in components {
        let end = component.position + component.length;
        if component.position < last || end > contents.len() {
            continue;
        }
        out.push_str(&contents[last..component.position]);
        out.push_str(&component.placeholder());
        last = end;
    }
    out.push_str(&contents[last..]);
    out
}

/// Replace every placeholder occurrence with its component.
#[must_use]
pub fn insert(contents: &str, components: &[NodeDocComponent]) -> String {
    components.iter().fold(contents.to_string(), |acc, component| {
        acc.replace(&component.placeholder(), &component.identified())
    })
}

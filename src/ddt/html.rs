//! HTML handling on top of the `lol_html` streaming rewriter.
//!
//! Only tags that are actually changed get serialized again; everything
//! else is written back byte for byte, which keeps custom component
//! markup (casing, quoting, whitespace) intact.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use lol_html::html_content::Element;
use lol_html::{doc_text, element, rewrite_str, HandlerResult, RewriteStrSettings};

use crate::error::TreeError;
use crate::Result;

/// A tag attribute. `value` is entity-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub key: String,
    pub value: String,
}

/// Decoded view of a start tag, detached from the rewriter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Lowercased tag name.
    pub name: String,
    pub attrs: Vec<Attr>,
}

impl Tag {
    #[must_use]
    pub fn from_element(el: &Element<'_, '_>) -> Self {
        Self {
            name: el.tag_name(),
            attrs: el
                .attributes()
                .iter()
                .map(|a| Attr {
                    key: a.name(),
                    value: decode(&a.value()),
                })
                .collect(),
        }
    }

    /// Whether the tag has the given name, ignoring case.
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|a| a.key == key) {
            Some(a) => a.value = value,
            None => self.attrs.push(Attr {
                key: key.to_string(),
                value,
            }),
        }
    }

    /// Write attributes that differ from `original` back to the element.
    /// An element without changes keeps its raw markup.
    ///
    /// # Errors
    ///
    /// Returns an error if an attribute name is not valid HTML.
    pub fn apply(&self, original: &Self, el: &mut Element<'_, '_>) -> HandlerResult {
        for a in &self.attrs {
            if original.attr(&a.key) != Some(a.value.as_str()) {
                el.set_attribute(&a.key, &a.value)?;
            }
        }
        Ok(())
    }

    /// Serialize as a start tag.
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = format!("<{}", self.name);
        for a in &self.attrs {
            let _ = write!(out, " {}=\"{}\"", a.key, a.value.replace('"', "&quot;"));
        }
        out.push('>');
        out
    }
}

/// Decode character references in text or attribute values.
#[must_use]
pub fn decode(raw: &str) -> String {
    html_escape::decode_html_entities(raw).into_owned()
}

pub(crate) fn rewrite_error(e: impl std::fmt::Display) -> crate::Error {
    TreeError::Html(e.to_string()).into()
}

/// What a document walk sees, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Lowercased name of an opened element.
    Start(String),
    /// Lowercased name of an explicitly closed element.
    End(String),
    /// Decoded text.
    Text(String),
}

/// Walk an HTML fragment. Elements that are never closed only produce a
/// start event.
///
/// # Errors
///
/// Returns an error if the rewriter gives up on the input.
pub fn events(html: &str) -> Result<Vec<Event>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let on_element = Rc::clone(&events);
    let on_text = Rc::clone(&events);
    let mut pending = String::new();

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", move |el| {
                let name = el.tag_name();
                on_element.borrow_mut().push(Event::Start(name.clone()));
                if let Some(handlers) = el.end_tag_handlers() {
                    let events = Rc::clone(&on_element);
                    let handler: lol_html::EndTagHandler<'static> = Box::new(move |_end| {
                        events.borrow_mut().push(Event::End(name));
                        Ok(())
                    });
                    handlers.push(handler);
                }
                Ok(())
            })],
            document_content_handlers: vec![doc_text!(move |t| {
                // A text node may arrive in several chunks.
                pending.push_str(t.as_str());
                if t.last_in_text_node() && !pending.is_empty() {
                    on_text.borrow_mut().push(Event::Text(decode(&pending)));
                    pending.clear();
                }
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )
    .map_err(rewrite_error)?;

    Ok(events.take())
}

/// Text content of an HTML fragment: tags removed, entities decoded and
/// whitespace collapsed. Script and style contents are dropped.
///
/// # Errors
///
/// Returns an error if the fragment cannot be walked.
pub fn text_content(input: &str) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut skip = false;

    for event in events(input)? {
        match event {
            Event::Start(name) => {
                skip = name == "script" || name == "style";
                out.push(' ');
            }
            Event::End(_) => {
                skip = false;
                out.push(' ');
            }
            Event::Text(text) if !skip => out.push_str(&text),
            Event::Text(_) => {}
        }
    }
    Ok(out.split_whitespace().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events() {
        let events = events("<a href=\"foo\">x &amp; y</a>").unwrap();
        assert_eq!(
            events,
            vec![
                Event::Start("a".to_string()),
                Event::Text("x & y".to_string()),
                Event::End("a".to_string()),
            ]
        );
    }

    #[test]
    fn test_lone_angle_bracket_is_text() {
        assert_eq!(text_content("a < b").unwrap(), "a < b");
    }

    #[test]
    fn test_script_is_raw_text() {
        let events = events("<script>if (a<b) {}</script>").unwrap();
        assert_eq!(
            events,
            vec![
                Event::Start("script".to_string()),
                Event::Text("if (a<b) {}".to_string()),
                Event::End("script".to_string()),
            ]
        );
        assert_eq!(text_content("<p>x</p><script>if (a<b) {}</script>").unwrap(), "x");
    }

    #[test]
    fn test_to_html() {
        let mut tag = Tag {
            name: "a".to_string(),
            attrs: vec![],
        };
        tag.set_attr("href", "/x?a=1&v=test");
        tag.set_attr("data-node", "x");
        tag.set_attr("href", "/y");
        assert_eq!(tag.to_html(), "<a href=\"/y\" data-node=\"x\">");
    }

    #[test]
    fn test_text_content() {
        assert_eq!(
            text_content("<h1>Hello</h1>\n<p>Caf&eacute;   and <b>more</b></p><style>p{}</style>").unwrap(),
            "Hello Café and more"
        );
    }

    #[test]
    fn test_multibyte_text_and_attributes() {
        assert_eq!(
            text_content("<p title=\"Größe\">Grüße aus Köln</p><Hinweis>ÄÖÜ</Hinweis>").unwrap(),
            "Grüße aus Köln ÄÖÜ"
        );
    }

    #[test]
    fn test_unterminated_tags() {
        for input in ["<aé", "<", "é<", "<!-- é", "<p title=\"é"] {
            assert!(text_content(input).is_ok(), "{input}");
            assert!(events(input).is_ok(), "{input}");
        }
        assert!(text_content("Café <aé").unwrap().starts_with("Café"));
        assert!(text_content("<p>ok</p><a href=\"é").unwrap().starts_with("ok"));
    }
}

//! Messages carried by the broker.

use std::fmt;

use serde::Serialize;

/// A small text message addressed by a dot-separated topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Random identifier, for log correlation only.
    pub id: u64,
    /// Dot-separated topic, e.g. `tree.synced`.
    pub topic: String,
    /// Free-form payload.
    pub text: String,
}

impl Message {
    /// Create a message with a random id.
    #[must_use]
    pub fn new(topic: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: rand::random(),
            topic: topic.into(),
            text: text.into(),
        }
    }

    /// Copy of this message with the topic prefixed by `namespace.`.
    #[must_use]
    pub fn namespaced(&self, namespace: &str) -> Self {
        Self {
            id: self.id,
            topic: format!("{namespace}.{}", self.topic),
            text: self.text.clone(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Message {} {}>{}</Message>", self.id, self.topic, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced() {
        let m = Message::new("tree.synced", "42 nodes");
        let n = m.namespaced("live");
        assert_eq!(n.topic, "live.tree.synced");
        assert_eq!(n.text, "42 nodes");
        assert_eq!(n.id, m.id);
    }

    #[test]
    fn test_display() {
        let m = Message {
            id: 7,
            topic: "fs.changed".to_string(),
            text: "foo/bar".to_string(),
        };
        assert_eq!(m.to_string(), "<Message 7 fs.changed>foo/bar</Message>");
    }
}

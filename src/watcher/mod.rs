//! File system watching.
//!
//! Recursive notifications below a tree root, debounced and filtered for
//! hidden path segments, published onto a broker.

mod events;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::ChangeBatch;
pub use watcher::{FileWatcher, DEBOUNCE_DURATION, TOPIC_CHANGED};

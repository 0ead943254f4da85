//! Sources and their wiring.
//!
//! A [`Source`] bundles a tree, its search, stores and, optionally, a
//! repository for one version of the tree. [`Sources`] is the registry the
//! HTTP layer resolves `?v=` against, and [`App`] opens the live source
//! plus one lazy source per accepted version.

mod app;
mod source;
mod sources;
mod teardown;

pub use app::App;
pub use source::{
    open_config, CompleteFn, Source, SourceOptions, TOPIC_FS_CHANGED, TOPIC_STATUS_CHANGED,
};
pub use sources::{SourceStatus, Sources};
pub use teardown::Teardown;

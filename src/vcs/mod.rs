//! Version control support: repository discovery, HEAD polling, derived
//! lookup tables and versions.

mod find;
mod lookup;
mod repo;
mod version;

pub use find::{find_repo, RepoLocation};
pub use lookup::{BuildFn, BuildRequest, Lookup, QUEUE_CAPACITY};
pub use repo::{ModifiedTable, Repo, POLL_INTERVAL, TOPIC_CHANGED};
pub use version::{filter, names, sort, Version, VersionKind, LIVE};

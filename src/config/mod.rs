//! Configuration management for dsk.
//!
//! Two layers:
//! - Process configuration from command-line arguments and environment
//!   variables ([`ServerConfig`]).
//! - Tree configuration from a `dsk.{json,yaml,yml}` file at the tree
//!   root ([`ConfigStore`]).

mod settings;
mod store;

pub use settings::ServerConfig;
pub use store::{
    find_file, yaml_to_json, ConfigStore, FigmaConfig, FileConfigStore, TagConfig, TreeConfig,
    BASENAME_REGEX,
};

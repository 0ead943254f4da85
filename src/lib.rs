//! dsk: design definitions tree server.
//!
//! Serves a directory of documentation nodes over HTTP, with full-text
//! search, link rewriting, live change notifications and optional
//! side-by-side serving of versions materialized from a git repository.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod author;
pub mod bus;
pub mod config;
pub mod ddt;
pub mod error;
pub mod meta;
pub mod pathutil;
pub mod plex;
pub mod search;
pub mod server;
pub mod vcs;
pub mod watcher;

pub use config::ServerConfig;
pub use error::{Error, Result};

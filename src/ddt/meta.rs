//! Node metadata sidecar files.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::config::yaml_to_json;
use crate::error::TreeError;
use crate::Result;

/// Basenames considered node metadata files.
pub static META_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(index|meta)\.(json|ya?ml)$").expect("valid regex"));

/// Metadata as parsed from a node's `index.*` or `meta.*` file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeMeta {
    /// Email addresses of node authors.
    pub authors: Vec<String>,
    pub description: String,
    pub related: Vec<String>,
    pub tags: Vec<String>,
    pub custom: serde_json::Value,
    /// Free-form version string.
    pub version: String,
    /// Only used by the v1 search.
    pub keywords: Vec<String>,
}

impl NodeMeta {
    /// Load metadata from `path`; the format is chosen by extension.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::Meta`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let invalid = |reason: String| TreeError::Meta {
            path: path.display().to_string(),
            reason,
        };
        let contents = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;

        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let value = match ext.as_str() {
            "json" => serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?,
            "yaml" | "yml" => {
                let value: serde_yaml::Value =
                    serde_yaml::from_str(&contents).map_err(|e| invalid(e.to_string()))?;
                yaml_to_json(value)
            }
            _ => return Err(invalid(format!("unsupported format: {ext}")).into()),
        };
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?)
    }

    /// Find and load the first metadata file in `dir`. A missing file is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read or the metadata
    /// file is invalid.
    pub fn find_and_load(dir: &Path) -> Result<Self> {
        let mut names: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| !t.is_dir()))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| META_REGEX.is_match(name))
            .collect();
        names.sort();

        match names.first() {
            Some(name) => Self::load(&dir.join(name)),
            None => Ok(Self::default()),
        }
    }
}

//! Downloadable files of a node.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::url::{nfc, remove_order_number};
use crate::config::yaml_to_json;
use crate::meta::MetaStore;
use crate::{Error, Result};

/// A file inside a node directory that is neither a document nor meta.
#[derive(Debug, Clone)]
pub struct NodeAsset {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// URL relative to the tree root.
    pub url: String,
    meta: MetaStore,
}

impl NodeAsset {
    #[must_use]
    pub const fn new(path: PathBuf, url: String, meta: MetaStore) -> Self {
        Self { path, url, meta }
    }

    fn basename(&self) -> String {
        nfc(&self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    /// Basename without order number.
    #[must_use]
    pub fn name(&self) -> String {
        remove_order_number(&self.basename())
    }

    /// Basename without order number and extension, for display.
    #[must_use]
    pub fn title(&self) -> String {
        let base = self.basename();
        let stem = match base.rfind('.') {
            Some(i) if i > 0 => &base[..i],
            _ => base.as_str(),
        };
        remove_order_number(stem)
    }

    /// Last modification time, via the meta store.
    ///
    /// # Errors
    ///
    /// Returns an error if the meta store has no answer.
    pub async fn modified(&self) -> Result<DateTime<Utc>> {
        self.meta.modified(&self.path).await
    }

    /// File size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'ed.
    pub fn size(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Pixel dimensions of JPEG and PNG images.
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let ext = extension(&self.path);
        if !matches!(ext.as_str(), "jpg" | "jpeg" | "png") {
            return None;
        }
        match image::image_dimensions(&self.path) {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read image dimensions");
                None
            }
        }
    }

    /// Contents converted to the format indicated by `target`'s extension.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, parsing or converting fails, or the
    /// conversion is not supported.
    pub fn convert_to(&self, target: &str) -> Result<Vec<u8>> {
        let from = extension(&self.path);
        let to = extension(Path::new(target));
        let contents = std::fs::read_to_string(&self.path)?;

        match (from.as_str(), to.as_str()) {
            ("json", "yaml" | "yml") => {
                let value: serde_json::Value = serde_json::from_str(&contents)?;
                Ok(serde_yaml::to_string(&value)?.into_bytes())
            }
            ("yaml" | "yml", "json") => {
                let value: serde_yaml::Value = serde_yaml::from_str(&contents)?;
                Ok(serde_json::to_vec_pretty(&yaml_to_json(value))?)
            }
            _ => Err(Error::internal(format!(
                "cannot convert {} to {target}",
                self.path.display()
            ))),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Names of files that may be converted into a file named `name`.
///
/// JSON and YAML are interchangeable: `colors.json` can be served from
/// `colors.yaml` or `colors.yml`, and the other way around.
#[must_use]
pub fn alternate_names(name: &str) -> Vec<String> {
    let Some((stem, ext)) = name.rsplit_once('.') else {
        return Vec::new();
    };
    match ext.to_lowercase().as_str() {
        "json" => vec![format!("{stem}.yaml"), format!("{stem}.yml")],
        "yaml" | "yml" => vec![format!("{stem}.json")],
        _ => Vec::new(),
    }
}

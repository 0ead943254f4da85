//! Tree configuration from the `dsk.{json,yaml,yml}` sidecar.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::Glob;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Allowed basenames of the configuration file.
pub static BASENAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(dsk|dsk\.(json|ya?ml))$").expect("valid regex"));

/// Configuration for a tag, i.e. to display it in a custom color.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
}

/// Configuration related to figma.com.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigmaConfig {
    #[serde(
        default,
        rename = "accessToken",
        skip_serializing_if = "String::is_empty"
    )]
    pub access_token: String,
}

/// The tree configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Organization the design system is for.
    pub org: String,
    /// Project name, defaults to the basename of the tree root.
    pub project: String,
    /// Language documents are authored in; selects search analysis.
    pub lang: String,
    pub tags: Vec<TagConfig>,
    /// Shell patterns of version names that may be served.
    pub sources: Vec<String>,
    pub figma: FigmaConfig,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub custom: serde_json::Value,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            org: "DSK".to_string(),
            project: String::new(),
            lang: "en".to_string(),
            tags: Vec::new(),
            sources: vec!["live".to_string()],
            figma: FigmaConfig::default(),
            custom: serde_json::Value::Null,
        }
    }
}

impl TreeConfig {
    /// Defaults for the given project name.
    #[must_use]
    pub fn with_project(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Self::default()
        }
    }

    /// Parse a config file's contents; the format follows the extension,
    /// an extensionless `dsk` is read as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the contents cannot be parsed.
    pub fn parse(path: &Path, contents: &str, project: &str) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let mut config: Self = if ext == "json" {
            serde_json::from_str(contents)?
        } else {
            let value: serde_yaml::Value = serde_yaml::from_str(contents)?;
            serde_json::from_value(yaml_to_json(value))?
        };
        if config.project.is_empty() {
            config.project = project.to_string();
        }
        Ok(config)
    }

    /// Whether `name` matches one of the configured source patterns.
    #[must_use]
    pub fn is_accepted_source(&self, name: &str) -> bool {
        self.sources.iter().any(|pattern| match Glob::new(pattern) {
            Ok(glob) => glob.compile_matcher().is_match(name),
            Err(_) => pattern == name,
        })
    }
}

/// Convert a YAML value into a JSON value, stringifying non-string map
/// keys so the result always serializes.
#[must_use]
pub fn yaml_to_json(value: serde_yaml::Value) -> serde_json::Value {
    use serde_json::Value as J;
    use serde_yaml::Value as Y;

    match value {
        Y::Null => J::Null,
        Y::Bool(b) => J::Bool(b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                J::from(i)
            } else if let Some(u) = n.as_u64() {
                J::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(J::Null, J::Number)
            }
        }
        Y::String(s) => J::String(s),
        Y::Sequence(seq) => J::Array(seq.into_iter().map(yaml_to_json).collect()),
        Y::Mapping(map) => J::Object(
            map.into_iter()
                .map(|(k, v)| (yaml_key(k), yaml_to_json(v)))
                .collect(),
        ),
        Y::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

fn yaml_key(key: serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Null => "null".to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(&other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Locate the configuration file directly inside `root`.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn find_file(root: &Path) -> Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        if BASENAME_REGEX.is_match(&entry.file_name().to_string_lossy()) {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

#[derive(Debug)]
struct State {
    hash: Option<blake3::Hash>,
    data: Arc<TreeConfig>,
}

/// Configuration backed by a file, reloaded on [`FileConfigStore::refresh`].
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    project: String,
    state: RwLock<State>,
}

impl FileConfigStore {
    /// Open and load the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>, project: impl Into<String>) -> Result<Self> {
        let project = project.into();
        let store = Self {
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(State {
                hash: None,
                data: Arc::new(TreeConfig::with_project(project.clone())),
            }),
            project,
        };
        store.refresh()?;
        Ok(store)
    }

    /// Re-read the file if its contents changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed; the previous
    /// configuration is kept.
    pub fn refresh(&self) -> Result<()> {
        let contents = std::fs::read_to_string(&self.path)?;
        let hash = blake3::hash(contents.as_bytes());
        if self.state.read().hash == Some(hash) {
            return Ok(());
        }
        tracing::info!(path = %self.path.display(), "Refreshing configuration");

        let data = TreeConfig::parse(&self.path, &contents, &self.project)
            .map_err(|e| Error::config(format!("{}: {e}", self.path.display())))?;

        let mut state = self.state.write();
        state.hash = Some(hash);
        state.data = Arc::new(data);
        Ok(())
    }

    /// Whether the file is gone or its contents changed since last load.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        let Ok(contents) = std::fs::read(&self.path) else {
            return true;
        };
        self.state.read().hash != Some(blake3::hash(&contents))
    }

    /// Current configuration.
    #[must_use]
    pub fn data(&self) -> Arc<TreeConfig> {
        Arc::clone(&self.state.read().data)
    }
}

/// Source of the tree configuration.
#[derive(Debug)]
pub enum ConfigStore {
    /// Defaults only; accepts just the live source.
    Static(Arc<TreeConfig>),
    /// Loaded from a sidecar file.
    File(FileConfigStore),
}

impl ConfigStore {
    /// Static defaults for `project`.
    #[must_use]
    pub fn static_defaults(project: impl Into<String>) -> Self {
        Self::Static(Arc::new(TreeConfig::with_project(project)))
    }

    /// Current configuration.
    #[must_use]
    pub fn data(&self) -> Arc<TreeConfig> {
        match self {
            Self::Static(data) => Arc::clone(data),
            Self::File(db) => db.data(),
        }
    }

    /// Reload from disk when file backed.
    ///
    /// # Errors
    ///
    /// Returns an error if reloading fails.
    pub fn refresh(&self) -> Result<()> {
        match self {
            Self::Static(_) => Ok(()),
            Self::File(db) => db.refresh(),
        }
    }

    /// Whether a version with this name may be served.
    #[must_use]
    pub fn is_accepted_source(&self, name: &str) -> bool {
        match self {
            Self::Static(_) => name == "live",
            Self::File(db) => db.data().is_accepted_source(name),
        }
    }
}

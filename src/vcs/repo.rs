//! Read-only view of a git repository backing a tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{AutotagOption, Delta, FetchOptions, Oid, Repository, Sort};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::lookup::{BuildFn, Lookup};
use super::version::{self, Version};
use crate::bus::Broker;
use crate::error::RepoError;
use crate::pathutil::any_segment_hidden;
use crate::{Error, Result};

/// How often HEAD is checked for movement.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Topic published when HEAD moved.
pub const TOPIC_CHANGED: &str = "repo.changed";

/// Per-file last modification times derived from the commit log.
#[derive(Debug, Default)]
pub struct ModifiedTable {
    /// Author time of the HEAD commit; `None` for repositories without
    /// commits.
    pub head_time: Option<DateTime<Utc>>,
    /// Paths relative to the repository root.
    pub files: HashMap<PathBuf, DateTime<Utc>>,
}

impl ModifiedTable {
    /// Last modification of a file, or of the most recently modified file
    /// below a directory. Falls back to the HEAD commit time.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NoData`] when there is nothing to go by.
    pub fn modified(&self, rel: &Path) -> Result<DateTime<Utc>> {
        if let Some(t) = self.files.get(rel) {
            return Ok(*t);
        }
        let newest = self
            .files
            .iter()
            .filter(|(p, _)| p.starts_with(rel))
            .map(|(_, t)| *t)
            .max();

        newest
            .or(self.head_time)
            .ok_or_else(|| RepoError::NoData.into())
    }
}

/// A repository, its HEAD poller and the lookups derived from it.
pub struct Repo {
    path: PathBuf,
    git: Arc<Mutex<Repository>>,
    head: RwLock<Option<String>>,
    modified: Lookup<ModifiedTable>,
    versions: Lookup<Vec<Version>>,
    broker: Broker,
    shutdown: CancellationToken,
}

impl Repo {
    /// Open the repository at `main`. When `submodule` points below it, the
    /// submodule is resolved through the main repository and opened
    /// instead.
    ///
    /// `repo.changed` is published on `broker` whenever HEAD moves. Must
    /// be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be opened, or the
    /// submodule does not match any of the main repository's submodules.
    pub fn open(main: &Path, submodule: Option<&Path>, broker: Broker) -> Result<Arc<Self>> {
        let main = std::path::absolute(main)?;
        let main_repo = Repository::open(&main)?;

        let (path, repo) = match submodule {
            Some(sub) if sub != main => {
                let sub = std::path::absolute(sub)?;
                let subs = main_repo.submodules()?;
                if subs.is_empty() {
                    return Err(RepoError::Submodule(format!(
                        "{}: no submodules available, missing .gitmodules?",
                        sub.display()
                    ))
                    .into());
                }
                let found = subs.iter().find(|s| main.join(s.path()) == sub);
                match found {
                    Some(s) => {
                        let repo = s.open()?;
                        (sub, repo)
                    }
                    None => return Err(RepoError::Submodule(sub.display().to_string()).into()),
                }
            }
            _ => (main, main_repo),
        };

        let head = read_head(&repo).map(|(_, oid)| oid);
        let git = Arc::new(Mutex::new(repo));
        tracing::info!(path = %path.display(), head = ?head, "Opened repository");

        let this = Arc::new(Self {
            modified: Lookup::new("modified", modified_build_fn(&git, &path)),
            versions: Lookup::new("versions", versions_build_fn(&git)),
            path,
            git,
            head: RwLock::new(head.clone()),
            broker,
            shutdown: CancellationToken::new(),
        });
        this.modified.request_build(head.clone());
        this.versions.request_build(head);
        Ok(this)
    }

    /// Start polling HEAD every `interval`.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = this.shutdown.cancelled() => break,
                    _ = ticker.tick() => this.poll().await,
                }
            }
            tracing::debug!(path = %this.path.display(), "Stopped repository poller");
        });
    }

    async fn poll(&self) {
        let git = Arc::clone(&self.git);
        let head = tokio::task::spawn_blocking(move || read_head(&git.lock()).map(|(_, oid)| oid))
            .await
            .ok()
            .flatten();

        if head == *self.head.read() {
            return;
        }
        tracing::info!(head = ?head, "Repository HEAD moved");
        *self.head.write() = head.clone();

        self.broker
            .accept(TOPIC_CHANGED, head.clone().unwrap_or_default());
        self.modified.request_build(head.clone());
        self.versions.request_build(head);
    }

    /// Working directory of the repository.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last observed HEAD commit, hex encoded.
    #[must_use]
    pub fn head(&self) -> Option<String> {
        self.head.read().clone()
    }

    /// Last modification time of a file or directory below the working
    /// directory, according to the commit log.
    ///
    /// With a deadline, gives up waiting for the lookup table once it
    /// passes.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NoData`] when no table is available in time, or
    /// the path is outside the repository.
    pub async fn modified(&self, path: &Path, deadline: Option<Duration>) -> Result<DateTime<Utc>> {
        let rx = self.modified.get_dirty_okay(self.head());
        let table = match deadline {
            Some(d) => tokio::time::timeout(d, rx)
                .await
                .map_err(|_| Error::from(RepoError::NoData))?,
            None => rx.await,
        }
        .map_err(|_| Error::from(RepoError::NoData))?;

        let rel = path
            .strip_prefix(&self.path)
            .map_err(|_| Error::from(RepoError::NoData))?;
        table.modified(rel)
    }

    /// All branches and tags plus the live version, sorted for display.
    ///
    /// # Errors
    ///
    /// Returns an error if the versions could not be enumerated.
    pub async fn versions(&self) -> Result<Vec<Version>> {
        let table = self
            .versions
            .get_dirty_okay(self.head())
            .await
            .map_err(|_| Error::from(RepoError::NoData))?;
        Ok(table.as_ref().clone())
    }

    /// Fetch `origin` and force the current branch to its upstream.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching or checking out fails. Being already up
    /// to date is not an error.
    pub async fn update_from_upstream(&self) -> Result<()> {
        let git = Arc::clone(&self.git);
        tokio::task::spawn_blocking(move || pull_forced(&git.lock()))
            .await
            .map_err(|e| Error::internal(format!("update task failed: {e}")))?
    }

    /// Clone this repository into `dir` and check out `version`.
    ///
    /// # Errors
    ///
    /// Returns an error if cloning or checking out fails.
    pub async fn checkout_into(&self, version: &Version, dir: &Path) -> Result<()> {
        let url = self.path.to_string_lossy().into_owned();
        let dir = dir.to_path_buf();
        let target = version.target.clone();
        tracing::info!(version = %version, dir = %dir.display(), "Cloning repository");

        tokio::task::spawn_blocking(move || {
            let mut fetch = FetchOptions::new();
            fetch.download_tags(AutotagOption::All);
            let cloned = RepoBuilder::new().fetch_options(fetch).clone(&url, &dir)?;

            let oid = Oid::from_str(&target)?;
            let commit = cloned.find_commit(oid)?;
            cloned.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
            cloned.set_head_detached(oid)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::internal(format!("clone task failed: {e}")))?
    }

    /// Stop polling and close both lookups.
    pub fn close(&self) {
        tracing::debug!(path = %self.path.display(), "Closing repository");
        self.shutdown.cancel();
        self.modified.close();
        self.versions.close();
    }
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("path", &self.path)
            .field("head", &*self.head.read())
            .finish_non_exhaustive()
    }
}

/// Full name and target commit of HEAD; `None` while unborn.
fn read_head(repo: &Repository) -> Option<(String, String)> {
    let head = repo.head().ok()?;
    let name = head.name().unwrap_or("HEAD").to_string();
    let oid = head.peel_to_commit().ok()?.id().to_string();
    Some((name, oid))
}

fn to_datetime(t: git2::Time) -> DateTime<Utc> {
    DateTime::from_timestamp(t.seconds(), 0).unwrap_or_default()
}

fn blocking<T: Send + 'static>(
    f: impl FnOnce() -> Result<T> + Send + 'static,
) -> futures::future::BoxFuture<'static, Result<T>> {
    Box::pin(async move {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| Error::internal(format!("lookup build task failed: {e}")))?
    })
}

fn modified_build_fn(git: &Arc<Mutex<Repository>>, path: &Path) -> BuildFn<ModifiedTable> {
    let git = Arc::clone(git);
    let path = path.to_path_buf();
    Arc::new(move || {
        let git = Arc::clone(&git);
        let path = path.clone();
        blocking(move || build_modified(&git.lock(), &path))
    })
}

fn versions_build_fn(git: &Arc<Mutex<Repository>>) -> BuildFn<Vec<Version>> {
    let git = Arc::clone(git);
    Arc::new(move || {
        let git = Arc::clone(&git);
        blocking(move || build_versions(&git.lock()))
    })
}

/// Walk the commit log from HEAD, recording for every file in the working
/// directory the author time of the newest commit that touched it.
fn build_modified(repo: &Repository, workdir: &Path) -> Result<(String, ModifiedTable)> {
    let Some((_, head_oid)) = read_head(repo) else {
        tracing::info!(path = %workdir.display(), "No commits in repository, yet");
        return Ok((String::new(), ModifiedTable::default()));
    };
    let head_commit = repo.find_commit(Oid::from_str(&head_oid)?)?;

    let mut pending: HashMap<PathBuf, bool> = walkdir::WalkDir::new(workdir)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
        })
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(workdir).ok().map(Path::to_path_buf))
        .filter(|rel| !any_segment_hidden(rel))
        .map(|rel| (rel, false))
        .collect();

    let total = pending.len();
    let mut table = ModifiedTable {
        head_time: Some(to_datetime(head_commit.author().when())),
        files: HashMap::with_capacity(total),
    };

    let mut record = |path: Option<&Path>, when: DateTime<Utc>, table: &mut ModifiedTable| {
        let Some(path) = path else {
            return;
        };
        if let Some(seen) = pending.get_mut(path) {
            if !*seen {
                *seen = true;
                table.files.insert(path.to_path_buf(), when);
            }
        }
    };

    let mut revwalk = repo.revwalk()?;
    revwalk.push(head_commit.id())?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

    let mut prev: Option<(DateTime<Utc>, git2::Tree<'_>)> = None;
    for oid in revwalk {
        let commit = repo.find_commit(oid?)?;
        let tree = commit.tree()?;
        let when = to_datetime(commit.author().when());

        if let Some((prev_when, prev_tree)) = &prev {
            let diff = repo.diff_tree_to_tree(Some(&tree), Some(prev_tree), None)?;
            for delta in diff.deltas() {
                if delta.status() == Delta::Deleted {
                    continue;
                }
                record(delta.new_file().path(), *prev_when, &mut table);
            }
            if table.files.len() >= total {
                tracing::debug!(files = total, "Built file modification table early");
                return Ok((head_oid, table));
            }
        }
        prev = Some((when, tree));
    }

    // Whatever is left was introduced by the root commit.
    if let Some((when, tree)) = &prev {
        let diff = repo.diff_tree_to_tree(None, Some(tree), None)?;
        for delta in diff.deltas() {
            record(delta.new_file().path(), *when, &mut table);
        }
    }
    tracing::debug!(files = table.files.len(), "Built file modification table");
    Ok((head_oid, table))
}

fn build_versions(repo: &Repository) -> Result<(String, Vec<Version>)> {
    let head = read_head(repo);
    let mut versions = Vec::new();

    if let Some((name, oid)) = &head {
        versions.push(Version::live(name, oid.clone()));
    }
    for reference in repo.references()? {
        let reference = reference?;
        let Some(name) = reference.name() else {
            continue;
        };
        if !name.starts_with("refs/tags/") && !name.starts_with("refs/heads/") {
            continue;
        }
        let Ok(commit) = reference.peel_to_commit() else {
            continue;
        };
        versions.push(Version::from_reference(name, commit.id().to_string()));
    }
    version::sort(&mut versions);

    Ok((head.map(|(_, oid)| oid).unwrap_or_default(), versions))
}

fn pull_forced(repo: &Repository) -> Result<()> {
    let mut remote = repo.find_remote("origin")?;
    remote.fetch::<&str>(&[], None, None)?;

    let head = repo.head()?;
    if !head.is_branch() {
        tracing::debug!("HEAD is detached, nothing to pull");
        return Ok(());
    }
    let (Some(name), Some(short)) = (head.name(), head.shorthand()) else {
        return Ok(());
    };
    let Ok(upstream) = repo.find_reference(&format!("refs/remotes/origin/{short}")) else {
        tracing::debug!(branch = short, "No upstream branch, nothing to pull");
        return Ok(());
    };
    let target = upstream.peel_to_commit()?.id();
    if head.target() == Some(target) {
        tracing::debug!(branch = short, "Already up to date");
        return Ok(());
    }

    repo.reference(name, target, true, "dsk: forced pull from upstream")?;
    repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
    tracing::info!(branch = short, target = %target, "Updated from upstream");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn commit(repo: &Repository, files: &[&str], when: DateTime<Utc>) -> Oid {
        let mut index = repo.index().unwrap();
        for f in files {
            index.add_path(Path::new(f)).unwrap();
        }
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::new(
            "Test",
            "test@example.org",
            &git2::Time::new(when.timestamp(), 0),
        )
        .unwrap();
        let parents: Vec<git2::Commit<'_>> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parents: Vec<&git2::Commit<'_>> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, "message", &tree, &parents)
            .unwrap()
    }

    #[test]
    fn test_modified_table_lookup() {
        let t0 = Utc.with_ymd_and_hms(1981, 8, 11, 12, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(1981, 8, 11, 14, 0, 0).unwrap();
        let mut table = ModifiedTable {
            head_time: Some(t1),
            files: HashMap::new(),
        };
        table.files.insert(PathBuf::from("Diversity/doc0.md"), t0);
        table.files.insert(PathBuf::from("Diversity/doc1.md"), t1);

        assert_eq!(table.modified(Path::new("Diversity/doc0.md")).unwrap(), t0);
        assert_eq!(table.modified(Path::new("Diversity")).unwrap(), t1);
        assert_eq!(table.modified(Path::new("Other")).unwrap(), t1);

        let empty = ModifiedTable::default();
        assert!(empty.modified(Path::new("x")).unwrap_err().is_no_data());
    }

    #[test]
    fn test_build_modified() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();
        std::fs::create_dir(tmp.path().join("Diversity")).unwrap();
        std::fs::write(tmp.path().join("Diversity/doc0.md"), "a").unwrap();
        std::fs::write(tmp.path().join("Diversity/doc1.md"), "a").unwrap();

        let t0 = Utc.with_ymd_and_hms(1981, 8, 11, 12, 0, 0).unwrap();
        commit(&repo, &["Diversity/doc0.md"], t0);

        let (_, table) = build_modified(&repo, tmp.path()).unwrap();
        assert_eq!(table.modified(Path::new("Diversity")).unwrap(), t0);

        let t1 = t0 + chrono::Duration::hours(2);
        commit(&repo, &["Diversity/doc1.md"], t1);

        let (_, table) = build_modified(&repo, tmp.path()).unwrap();
        assert_eq!(table.modified(Path::new("Diversity/doc0.md")).unwrap(), t0);
        assert_eq!(table.modified(Path::new("Diversity/doc1.md")).unwrap(), t1);
        assert_eq!(table.modified(Path::new("Diversity")).unwrap(), t1);
    }

    #[test]
    fn test_build_versions() {
        let tmp = TempDir::new().unwrap();
        let repo = Repository::init(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("readme.md"), "a").unwrap();
        let oid = commit(&repo, &["readme.md"], Utc::now());

        let obj = repo.find_object(oid, None).unwrap();
        repo.tag_lightweight("v1.0.0", &obj, false).unwrap();
        repo.tag_lightweight("v1.1.0", &obj, false).unwrap();

        let (head, versions) = build_versions(&repo).unwrap();
        assert_eq!(head, oid.to_string());
        let names = version::names(&versions);
        assert_eq!(names[0], "live");
        assert_eq!(names[1], "1.1.0");
        assert_eq!(names[2], "1.0.0");
        assert!(names.iter().any(|n| n.starts_with("dev-")));
    }

    #[tokio::test]
    async fn test_repo_modified_and_clone() {
        let tmp = TempDir::new().unwrap();
        let git = Repository::init(tmp.path()).unwrap();
        std::fs::create_dir(tmp.path().join("foo")).unwrap();
        std::fs::write(tmp.path().join("foo/readme.md"), "a").unwrap();
        let t0 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let oid = commit(&git, &["foo/readme.md"], t0);
        let obj = git.find_object(oid, None).unwrap();
        git.tag_lightweight("v2.0.0", &obj, false).unwrap();

        let repo = Repo::open(tmp.path(), None, Broker::new()).unwrap();
        let modified = repo
            .modified(&tmp.path().join("foo"), None)
            .await
            .unwrap();
        assert_eq!(modified, t0);

        let versions = repo.versions().await.unwrap();
        let tag = versions.iter().find(|v| v.name == "2.0.0").unwrap();

        let into = TempDir::new().unwrap();
        let dir = into.path().join("clone");
        repo.checkout_into(tag, &dir).await.unwrap();
        assert!(dir.join("foo/readme.md").is_file());

        repo.close();
    }
}

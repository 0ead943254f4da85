//! Integration tests for the file watcher and the broker.

use std::fs;
use std::time::Duration;

use dsk::bus::{Broker, Message, Subscription};
use dsk::watcher::{FileWatcher, TOPIC_CHANGED};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);

async fn next(sub: &mut Subscription) -> Option<Message> {
    tokio::time::timeout(WAIT, sub.recv()).await.ok().flatten()
}

/// Test that a new file is published as a change.
#[tokio::test]
async fn test_change_is_published() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("Colors")).unwrap();

    let watcher = FileWatcher::new(tmp.path(), Duration::from_millis(50)).unwrap();
    let mut sub = watcher.broker().subscribe(TOPIC_CHANGED);

    fs::write(tmp.path().join("Colors/readme.md"), "# Colors").unwrap();

    let m = next(&mut sub).await.expect("change message");
    assert_eq!(m.topic, "changed");
    // Relative to the parent of the root.
    let name = watcher.root().file_name().unwrap().to_string_lossy().into_owned();
    assert!(m.text.starts_with(&format!("{name}/Colors")), "{}", m.text);

    watcher.close().unwrap();
}

/// Test that changes below hidden directories are not published.
#[tokio::test]
async fn test_hidden_changes_are_ignored() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join(".git")).unwrap();

    let watcher = FileWatcher::new(tmp.path(), Duration::from_millis(50)).unwrap();
    let mut sub = watcher.broker().subscribe(TOPIC_CHANGED);

    fs::write(tmp.path().join(".git/index"), "x").unwrap();
    let hidden = tokio::time::timeout(Duration::from_millis(500), sub.recv()).await;
    assert!(hidden.is_err(), "unexpected message: {hidden:?}");

    fs::write(tmp.path().join("visible.md"), "x").unwrap();
    let m = next(&mut sub).await.expect("change message");
    assert!(!m.text.contains(".git"), "{}", m.text);

    watcher.close().unwrap();
}

/// Test that closing the watcher ends subscriptions.
#[tokio::test]
async fn test_close_ends_subscriptions() {
    let tmp = TempDir::new().unwrap();
    let watcher = FileWatcher::new(tmp.path(), Duration::from_millis(50)).unwrap();
    let mut sub = watcher.broker().subscribe("*");

    watcher.close().unwrap();
    assert!(next(&mut sub).await.is_none());
}

/// Test that watching a missing directory fails.
#[tokio::test]
async fn test_missing_directory() {
    let tmp = TempDir::new().unwrap();
    assert!(FileWatcher::new(tmp.path().join("nope"), Duration::from_millis(50)).is_err());
}

/// Test that a connected watcher's changes arrive namespaced.
#[tokio::test]
async fn test_connected_brokers_namespace_topics() {
    let tmp = TempDir::new().unwrap();
    let watcher = FileWatcher::new(tmp.path(), Duration::from_millis(50)).unwrap();

    let source = Broker::new();
    source.connect(watcher.broker(), "fs");
    let app = Broker::new();
    app.connect(&source, "live");
    let mut sub = app.subscribe("live.fs.*");

    fs::write(tmp.path().join("a.md"), "x").unwrap();

    let m = next(&mut sub).await.expect("change message");
    assert_eq!(m.topic, "live.fs.changed");

    watcher.close().unwrap();
    source.close();
    app.close();
}

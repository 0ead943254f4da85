//! Performance benchmarks for dsk
//!
//! **Benchmarks Included:**
//! - `tree_sync`: walking and loading trees of 100 and 1000 nodes
//! - `normalize_node_url`: URL normalization of a typical node path
//! - `search`: filter and full-text search over 1000 nodes
//!
//! **Run benchmarks:**
//! ```bash
//! cargo bench                      # Run all benchmarks
//! cargo bench -- tree_sync         # Tree sync only
//! ```

use std::path::Path;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dsk::author::AuthorStore;
use dsk::bus::Broker;
use dsk::config::ConfigStore;
use dsk::ddt::{normalize_node_url, NodeContext, Tree};
use dsk::meta::MetaStore;
use dsk::search::Search;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Create a tree of `count` nodes, ten per parent, each with a document.
fn create_fixture(count: usize) -> TempDir {
    let tmpdir = TempDir::new().expect("failed to create temp dir");
    for i in 0..count {
        let dir = tmpdir
            .path()
            .join(format!("{:02}_Group {}", i / 10, i / 10))
            .join(format!("{:02}_Node {i}", i % 10));
        std::fs::create_dir_all(&dir).expect("failed to create node");
        std::fs::write(
            dir.join("readme.md"),
            format!("# Node {i}\n\nThe palette number {i} with warm and cold tones.\n"),
        )
        .expect("failed to write doc");
    }
    tmpdir
}

fn create_tree(root: &Path) -> Arc<Tree> {
    let ctx = Arc::new(NodeContext {
        root: root.to_path_buf(),
        config: Arc::new(ConfigStore::static_defaults("Bench")),
        meta: MetaStore::Noop,
        authors: Arc::new(AuthorStore::Noop),
    });
    Arc::new(Tree::new(ctx, "live", Broker::new()))
}

fn bench_tree_sync(c: &mut Criterion) {
    let rt = Runtime::new().expect("failed to create runtime");
    let _guard = rt.enter();

    let mut group = c.benchmark_group("tree_sync");
    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(5));

    for count in &[100, 1000] {
        let fixture = create_fixture(*count);
        let tree = create_tree(fixture.path());
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| rt.block_on(tree.sync()).expect("sync failed"));
        });
    }

    group.finish();
}

fn bench_normalize_node_url(c: &mut Criterion) {
    c.bench_function("normalize_node_url", |b| {
        b.iter(|| normalize_node_url(black_box("01_Foundation/02_Typografie & Schrift/03_Größen")));
    });
}

fn bench_search(c: &mut Criterion) {
    let rt = Runtime::new().expect("failed to create runtime");
    let _guard = rt.enter();

    let fixture = create_fixture(1000);
    let tree = create_tree(fixture.path());
    rt.block_on(tree.sync()).expect("sync failed");
    let search = Search::new(Arc::clone(&tree), "en", None).expect("failed to create search");
    rt.block_on(search.refresh()).expect("failed to index");

    let mut group = c.benchmark_group("search");
    group.sample_size(10);
    group.measurement_time(std::time::Duration::from_secs(5));

    group.bench_function("filter", |b| {
        b.iter(|| rt.block_on(search.filter_search(black_box("node 42"))).expect("filter failed"));
    });
    group.bench_function("full", |b| {
        b.iter(|| rt.block_on(search.full_search(black_box("warm palette"))).expect("search failed"));
    });
    group.bench_function("legacy", |b| {
        b.iter(|| search.legacy_filter_search(black_box("node 4")));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_tree_sync,
    bench_normalize_node_url,
    bench_search
);
criterion_main!(benches);

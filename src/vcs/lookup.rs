//! Coalescing builder for derived, per-ref lookup tables.
//!
//! Building a table (e.g. per-file modification times from the commit log)
//! is expensive and many callers ask for the same ref at once. A lookup
//! runs at most one build at a time; requests for the ref currently being
//! built wait for that build instead of starting another.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Capacity of the build request queues.
pub const QUEUE_CAPACITY: usize = 5000;

/// Builds the table, returning the ref it was built for alongside it.
pub type BuildFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<(String, T)>> + Send + Sync>;

/// A request to be answered with a table for `reference`.
///
/// `None` can never be satisfied directly and waits for the next build.
pub struct BuildRequest<T> {
    pub reference: Option<String>,
    pub reply: oneshot::Sender<Arc<T>>,
}

struct State<T> {
    built: Option<(String, Arc<T>)>,
    building: Option<String>,
    waiting: VecDeque<oneshot::Sender<Arc<T>>>,
}

impl<T> State<T> {
    fn enqueue(&mut self, scope: &str, reply: oneshot::Sender<Arc<T>>) {
        if self.waiting.len() >= QUEUE_CAPACITY {
            tracing::warn!(scope, "Build queue full, dropping request");
            return;
        }
        self.waiting.push_back(reply);
    }
}

enum Dispatch<T> {
    Build(BuildRequest<T>),
    Done,
}

/// A coalescing lookup table builder.
pub struct Lookup<T> {
    scope: String,
    state: Arc<RwLock<State<T>>>,
    requests: mpsc::Sender<BuildRequest<T>>,
    shutdown: CancellationToken,
}

impl<T: Send + Sync + 'static> Lookup<T> {
    /// Create a lookup and start its dispatcher and builder tasks.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(scope: impl Into<String>, build: BuildFn<T>) -> Self {
        let scope = scope.into();
        let state = Arc::new(RwLock::new(State {
            built: None,
            building: None,
            waiting: VecDeque::new(),
        }));
        let (requests, requests_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (builds, builds_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();

        tokio::spawn(dispatch(
            scope.clone(),
            Arc::clone(&state),
            requests_rx,
            builds,
            shutdown.clone(),
        ));
        tokio::spawn(run_builds(
            scope.clone(),
            Arc::clone(&state),
            builds_rx,
            build,
            shutdown.clone(),
        ));

        Self {
            scope,
            state,
            requests,
            shutdown,
        }
    }

    /// Ask for a (re)build for `reference`, without waiting for it.
    pub fn request_build(&self, reference: Option<String>) {
        let (reply, _) = oneshot::channel();
        self.send(BuildRequest { reference, reply });
    }

    /// Returns the last built table right away if there is one, otherwise
    /// waits for a build.
    ///
    /// The receiver errors when the build fails or the lookup is closed.
    #[must_use]
    pub fn get_dirty_okay(&self, reference: Option<String>) -> oneshot::Receiver<Arc<T>> {
        let (reply, rx) = oneshot::channel();

        if let Some((_, data)) = &self.state.read().built {
            let _ = reply.send(Arc::clone(data));
            return rx;
        }
        self.send(BuildRequest { reference, reply });
        rx
    }

    /// Whether the last built table is for a ref other than `head`.
    #[must_use]
    pub fn is_stale(&self, head: Option<&str>) -> bool {
        let Some(head) = head else {
            return false;
        };
        match &self.state.read().built {
            None => true,
            Some((reference, _)) => reference != head,
        }
    }

    /// The last built table and its ref.
    #[must_use]
    pub fn current(&self) -> Option<(String, Arc<T>)> {
        self.state.read().built.clone()
    }

    /// Stop both tasks. Pending requests observe a closed channel.
    pub fn close(&self) {
        tracing::debug!(scope = %self.scope, "Closing lookup");
        self.shutdown.cancel();
        self.state.write().waiting.clear();
    }

    fn send(&self, req: BuildRequest<T>) {
        if self.requests.try_send(req).is_err() {
            tracing::warn!(scope = %self.scope, "Build request queue full or closed, dropping request");
        }
    }
}

impl<T> std::fmt::Debug for Lookup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Lookup")
            .field("scope", &self.scope)
            .field("ref", &state.built.as_ref().map(|(r, _)| r))
            .field("building", &state.building)
            .finish_non_exhaustive()
    }
}

async fn dispatch<T: Send + Sync + 'static>(
    scope: String,
    state: Arc<RwLock<State<T>>>,
    mut requests: mpsc::Receiver<BuildRequest<T>>,
    builds: mpsc::Sender<Dispatch<T>>,
    shutdown: CancellationToken,
) {
    loop {
        let req = tokio::select! {
            () = shutdown.cancelled() => break,
            req = requests.recv() => match req {
                Some(req) => req,
                None => break,
            },
        };

        let to_build = {
            let mut state = state.write();
            match &req.reference {
                None => {
                    tracing::debug!(%scope, "Build request for no ref, queuing for next build");
                    state.enqueue(&scope, req.reply);
                    None
                }
                Some(r) if state.building.as_deref() == Some(r.as_str()) => {
                    state.enqueue(&scope, req.reply);
                    None
                }
                Some(r) => match &state.built {
                    Some((built, data)) if built == r => {
                        let _ = req.reply.send(Arc::clone(data));
                        None
                    }
                    _ => {
                        // Claimed here so requests for the same ref arriving
                        // before the builder picks this up are queued.
                        state.building = Some(r.clone());
                        Some(req)
                    }
                },
            }
        };

        if let Some(req) = to_build {
            if builds.send(Dispatch::Build(req)).await.is_err() {
                break;
            }
        }
    }
    let _ = builds.send(Dispatch::Done).await;
    tracing::debug!(%scope, "Stopped lookup dispatcher");
}

async fn run_builds<T: Send + Sync + 'static>(
    scope: String,
    state: Arc<RwLock<State<T>>>,
    mut builds: mpsc::Receiver<Dispatch<T>>,
    build: BuildFn<T>,
    shutdown: CancellationToken,
) {
    while let Some(Dispatch::Build(req)) = builds.recv().await {
        if shutdown.is_cancelled() {
            break;
        }
        let requested = req.reference.clone();
        tracing::debug!(%scope, reference = ?requested, "Building lookup");
        let start = Instant::now();

        match build().await {
            Ok((reference, data)) => {
                let data = Arc::new(data);
                let waiting = {
                    let mut state = state.write();
                    if state.building == requested {
                        state.building = None;
                    }
                    state.built = Some((reference, Arc::clone(&data)));
                    std::mem::take(&mut state.waiting)
                };
                tracing::info!(%scope, waiting = waiting.len(), took = ?start.elapsed(), "Built lookup");

                let _ = req.reply.send(Arc::clone(&data));
                for reply in waiting {
                    let _ = reply.send(Arc::clone(&data));
                }
            }
            Err(e) => {
                tracing::warn!(%scope, error = %e, "Failed to build lookup");
                let mut state = state.write();
                if state.building == requested {
                    state.building = None;
                }
                // Dropping the senders tells waiters there is no data.
                state.waiting.clear();
            }
        }
    }
    tracing::debug!(%scope, "Stopped lookup builder");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(builds: Arc<AtomicUsize>, reference: &'static str) -> BuildFn<String> {
        Arc::new(move || {
            let builds = Arc::clone(&builds);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let n = builds.fetch_add(1, Ordering::SeqCst);
                Ok((reference.to_string(), format!("table-{n}")))
            })
        })
    }

    #[tokio::test]
    async fn test_concurrent_requests_coalesce() {
        let builds = Arc::new(AtomicUsize::new(0));
        let lookup = Lookup::new("test", counting(Arc::clone(&builds), "abc"));

        let a = lookup.get_dirty_okay(Some("abc".to_string()));
        let b = lookup.get_dirty_okay(Some("abc".to_string()));
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dirty_okay_returns_last_result() {
        let builds = Arc::new(AtomicUsize::new(0));
        let lookup = Lookup::new("test", counting(Arc::clone(&builds), "abc"));

        let first = lookup.get_dirty_okay(Some("abc".to_string())).await.unwrap();
        let second = lookup.get_dirty_okay(Some("def".to_string())).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_is_stale() {
        let builds = Arc::new(AtomicUsize::new(0));
        let lookup = Lookup::new("test", counting(Arc::clone(&builds), "abc"));

        assert!(!lookup.is_stale(None));
        assert!(lookup.is_stale(Some("abc")));

        lookup.get_dirty_okay(Some("abc".to_string())).await.unwrap();
        assert!(!lookup.is_stale(Some("abc")));
        assert!(lookup.is_stale(Some("def")));
    }

    #[tokio::test]
    async fn test_request_build_rebuilds_for_new_ref() {
        let builds = Arc::new(AtomicUsize::new(0));
        let lookup = Lookup::new("test", counting(Arc::clone(&builds), "abc"));

        lookup.get_dirty_okay(Some("abc".to_string())).await.unwrap();
        lookup.request_build(Some("def".to_string()));

        for _ in 0..100 {
            if builds.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_build_answers_no_data() {
        let build: BuildFn<String> =
            Arc::new(|| Box::pin(async { Err(crate::Error::internal("boom")) }));
        let lookup = Lookup::new("test", build);

        let a = lookup.get_dirty_okay(Some("abc".to_string()));
        let b = lookup.get_dirty_okay(Some("abc".to_string()));
        assert!(a.await.is_err());
        assert!(b.await.is_err());
        assert!(lookup.current().is_none());
    }
}

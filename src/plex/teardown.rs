//! Ordered cleanup of everything a source or the app opened.

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::{Error, Result};

type SyncFn = Box<dyn FnOnce() -> Result<()> + Send>;
type AsyncFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

enum Cleanup {
    Sync(&'static str, SyncFn),
    Async(&'static str, AsyncFn),
}

/// Collects cleanup functions and runs them in reverse order of
/// registration.
///
/// A failing function does not stop the remaining ones. Asynchronous
/// functions are started in order and awaited together at the end.
pub struct Teardown {
    scope: String,
    fns: Mutex<Vec<Cleanup>>,
}

impl Teardown {
    #[must_use]
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            fns: Mutex::new(Vec::new()),
        }
    }

    /// Register a synchronous cleanup function.
    pub fn add_func<F>(&self, name: &'static str, f: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.fns.lock().push(Cleanup::Sync(name, Box::new(f)));
    }

    /// Register an asynchronous cleanup function.
    pub fn add_async_func<F, Fut>(&self, name: &'static str, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.fns
            .lock()
            .push(Cleanup::Async(name, Box::new(move || Box::pin(f()))));
    }

    /// Number of pending functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fns.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fns.lock().is_empty()
    }

    /// Run all registered functions, last registered first.
    ///
    /// Functions registered while closing are run on the next call.
    ///
    /// # Errors
    ///
    /// Returns the last error encountered; every function has been run
    /// regardless.
    pub async fn close(&self) -> Result<()> {
        let fns = std::mem::take(&mut *self.fns.lock());
        let total = fns.len();

        let mut last_err: Option<Error> = None;
        let mut pending = Vec::new();

        for cleanup in fns.into_iter().rev() {
            match cleanup {
                Cleanup::Sync(name, f) => {
                    if let Err(e) = f() {
                        tracing::warn!(scope = %self.scope, func = name, error = %e, "Teardown function failed");
                        last_err = Some(e);
                    }
                }
                Cleanup::Async(name, f) => pending.push((name, f())),
            }
        }

        let (names, futures): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        for (name, result) in names.into_iter().zip(futures::future::join_all(futures).await) {
            if let Err(e) = result {
                tracing::warn!(scope = %self.scope, func = name, error = %e, "Teardown function failed");
                last_err = Some(e);
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => {
                tracing::debug!(scope = %self.scope, "Successfully completed teardown with {total} func/s");
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("scope", &self.scope)
            .field("pending", &self.len())
            .finish()
    }
}

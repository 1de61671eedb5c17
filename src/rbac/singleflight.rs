use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;

use super::error::RbacError;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, RbacError>>>;

/// Keyed registry of in-flight fetches.
///
/// While a fetch for a key is running, every other caller for that key
/// awaits the same shared future instead of starting its own. The lock only
/// guards the registry. The fetch itself runs outside it, and removes its
/// own entry when it resolves.
pub struct SingleFlight<T> {
    calls: Arc<Mutex<HashMap<String, SharedFetch<T>>>>,
}

// Manual Clone: clones share one registry and avoid a `T: Clone` bound.
impl<T> Clone for SingleFlight<T> {
    fn clone(&self) -> Self {
        Self {
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `fetch` unless a fetch for `key` is already in flight, in which
    /// case its result is shared.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> Result<T, RbacError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RbacError>> + Send + 'static,
    {
        let call = {
            let mut calls = self.calls.lock();
            match calls.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let registry = Arc::clone(&self.calls);
                    let owned_key = key.to_owned();
                    let inner = fetch();
                    let call = async move {
                        let result = inner.await;
                        registry.lock().remove(&owned_key);
                        result
                    }
                    .boxed()
                    .shared();
                    calls.insert(key.to_owned(), call.clone());
                    call
                }
            }
        };
        call.await
    }

    /// Number of keys with a fetch in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

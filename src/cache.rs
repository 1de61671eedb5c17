//! Advisory byte cache used for bearer revalidation and RBAC lookups.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::future::BoxFuture;

/// Consumer-provided cache backend.
///
/// Entries are advisory. `get` returns `None` for a miss *and* for any
/// backend failure. `set` returns `false` when the write did not happen.
/// Neither may surface an error into request handling.
///
/// # Example
///
/// ```rust,ignore
/// impl Cache for RedisCache {
///     async fn get(&self, key: &str) -> Option<Vec<u8>> {
///         self.pool.get(key).await.ok().flatten()
///     }
///
///     async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
///         self.pool.set_ex(key, value, ttl.as_secs()).await.is_ok()
///     }
/// }
/// ```
pub trait Cache: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = Option<Vec<u8>>> + Send;

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> impl Future<Output = bool> + Send;
}

impl<C: Cache> Cache for Arc<C> {
    fn get(&self, key: &str) -> impl Future<Output = Option<Vec<u8>>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> impl Future<Output = bool> + Send {
        (**self).set(key, value, ttl)
    }
}

/// Object-safe wrapper for Cache (needed for Arc<dyn>).
pub(crate) trait CacheDyn: Send + Sync {
    fn get_dyn<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Vec<u8>>>;

    fn set_dyn<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> BoxFuture<'a, bool>;
}

impl<T: Cache> CacheDyn for T {
    fn get_dyn<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Vec<u8>>> {
        Box::pin(self.get(key))
    }

    fn set_dyn<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> BoxFuture<'a, bool> {
        Box::pin(self.set(key, value, ttl))
    }
}

pub(crate) type SharedCache = Arc<dyn CacheDyn>;

/// Writes between opportunistic sweeps of expired entries.
const PURGE_EVERY: usize = 256;

/// In-process cache with per-entry expiry.
///
/// Expired entries are dropped when read, and every few hundred writes a
/// sweep removes the ones nobody reads again.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Instant, Vec<u8>)>,
    writes: AtomicUsize,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes an entry, returning whether one was present and unexpired.
    pub fn remove(&self, key: &str) -> bool {
        self.entries
            .remove(key)
            .is_some_and(|(_, (deadline, _))| deadline > Instant::now())
    }

    /// Removes every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (deadline, _)| *deadline > now);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let value = {
            let entry = self.entries.get(key)?;
            let (deadline, value) = entry.value();
            (*deadline > now).then(|| value.clone())
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, (deadline, _)| *deadline <= now);
        }
        value
    }
}

impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lookup(key)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(ttl) else {
            return false;
        };
        self.entries.insert(key.to_owned(), (deadline, value));
        if self.writes.fetch_add(1, Ordering::Relaxed) % PURGE_EVERY == PURGE_EVERY - 1 {
            self.purge_expired();
        }
        true
    }
}

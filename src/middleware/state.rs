use std::fmt;
use std::sync::Arc;

use super::config::AuthConfig;
use super::traits::{SessionStore, SessionStoreDyn};
use crate::cache::{Cache, SharedCache};
use crate::keys::KeyStore;
use crate::rbac::{Manager, RbacEngine};

/// Shared state for orchestrated routes.
///
/// Owns the frozen [`AuthConfig`] and the consumer's collaborators. Cloning
/// is cheap.
#[derive(Clone)]
pub struct AuthState {
    pub(crate) config: Arc<AuthConfig>,
    pub(crate) keys: Arc<dyn KeyStore>,
    pub(crate) sessions: Arc<dyn SessionStoreDyn>,
    pub(crate) cache: Option<SharedCache>,
    pub(crate) rbac: Option<Arc<RbacEngine>>,
}

impl AuthState {
    #[must_use]
    pub fn new<K: KeyStore, S: SessionStore>(config: AuthConfig, keys: K, sessions: S) -> Self {
        Self {
            config: Arc::new(config),
            keys: Arc::new(keys),
            sessions: Arc::new(sessions),
            cache: None,
            rbac: None,
        }
    }

    /// Cache used for bearer revalidation deadlines and RBAC lookups.
    #[must_use]
    pub fn with_cache<C: Cache>(mut self, cache: C) -> Self {
        let cache: SharedCache = Arc::new(cache);
        self.rbac = self
            .rbac
            .map(|engine| Arc::new(engine.as_ref().clone().with_shared_cache(Arc::clone(&cache))));
        self.cache = Some(cache);
        self
    }

    /// Enables RBAC checks. The engine uses this state's cache.
    #[must_use]
    pub fn with_rbac<M: Manager>(mut self, manager: M) -> Self {
        let mut engine = RbacEngine::new(manager);
        if let Some(cache) = &self.cache {
            engine = engine.with_shared_cache(Arc::clone(cache));
        }
        self.rbac = Some(Arc::new(engine));
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn rbac(&self) -> Option<&RbacEngine> {
        self.rbac.as_deref()
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("config", &self.config)
            .field("cache", &self.cache.is_some())
            .field("rbac", &self.rbac.is_some())
            .finish_non_exhaustive()
    }
}

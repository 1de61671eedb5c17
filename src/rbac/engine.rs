use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::error::RbacError;
use super::manager::{CacheTtls, Manager, ManagerDyn};
use super::permission::{Permission, Permissions};
use super::policy::{Combinator, Requirement, RoleMatch};
use super::singleflight::SingleFlight;
use super::{
    ROLE_PERMISSIONS_PREFIX, ROLE_SINGLE_FLIGHT_PREFIX, SUBJECT_PERMISSIONS_PREFIX,
    SUBJECT_ROLES_PREFIX, SUBJECT_SINGLE_FLIGHT_PREFIX,
};
use crate::cache::{Cache, SharedCache};

/// A subject's direct permissions and assigned roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAccess {
    pub permissions: Permissions,
    pub roles: Vec<String>,
}

/// Cache-first RBAC resolution with per-key fetch deduplication.
///
/// Subject data is cached under the session's RBAC cache id. Role
/// permissions are cached under the role id. Corrupt or missing entries
/// fall back to the [`Manager`]. Cache write failures are logged and ignored.
///
/// Clones share the manager, the cache and the in-flight registries.
#[derive(Clone)]
pub struct RbacEngine {
    manager: Arc<dyn ManagerDyn>,
    cache: Option<SharedCache>,
    ttls: CacheTtls,
    subjects: SingleFlight<SubjectAccess>,
    roles: SingleFlight<Permissions>,
}

impl RbacEngine {
    #[must_use]
    pub fn new<M: Manager>(manager: M) -> Self {
        let ttls = ManagerDyn::ttls(&manager);
        Self {
            manager: Arc::new(manager),
            cache: None,
            ttls,
            subjects: SingleFlight::new(),
            roles: SingleFlight::new(),
        }
    }

    #[must_use]
    pub fn with_cache<C: Cache>(self, cache: C) -> Self {
        self.with_shared_cache(Arc::new(cache))
    }

    #[must_use]
    pub(crate) fn with_shared_cache(mut self, cache: SharedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Resolves direct permissions and roles for a subject.
    ///
    /// Both halves are read from the cache concurrently. A miss on either
    /// half refetches both from the manager, and both are written back with
    /// their own TTLs.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Manager`] if the manager fails.
    pub async fn subject_access(
        &self,
        subject_id: &str,
        rbac_cache_id: &str,
    ) -> Result<SubjectAccess, RbacError> {
        let perms_key = format!("{SUBJECT_PERMISSIONS_PREFIX}{rbac_cache_id}");
        let roles_key = format!("{SUBJECT_ROLES_PREFIX}{rbac_cache_id}");

        if let Some(cache) = &self.cache {
            let (permissions, roles) = futures::join!(
                read::<Permissions>(cache, &perms_key),
                read::<Vec<String>>(cache, &roles_key),
            );
            if let (Some(permissions), Some(roles)) = (permissions, roles) {
                return Ok(SubjectAccess { permissions, roles });
            }
        }

        let manager = Arc::clone(&self.manager);
        let cache = self.cache.clone();
        let ttls = self.ttls;
        let subject_id = subject_id.to_owned();
        let flight_key = format!("{SUBJECT_SINGLE_FLIGHT_PREFIX}{rbac_cache_id}");

        self.subjects
            .run(&flight_key, move || async move {
                let (permissions, roles) = manager
                    .subject_dyn(&subject_id)
                    .await
                    .map_err(RbacError::manager)?;

                if let Some(cache) = &cache {
                    futures::join!(
                        write(cache, &perms_key, &permissions, ttls.subject_permissions),
                        write(cache, &roles_key, &roles, ttls.subject_roles),
                    );
                }
                Ok(SubjectAccess { permissions, roles })
            })
            .await
    }

    /// Resolves the permissions granted by one role.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Manager`] if the manager fails.
    pub async fn role_permissions(&self, role_id: &str) -> Result<Permissions, RbacError> {
        let key = format!("{ROLE_PERMISSIONS_PREFIX}{role_id}");
        if let Some(cache) = &self.cache {
            if let Some(permissions) = read::<Permissions>(cache, &key).await {
                return Ok(permissions);
            }
        }

        let manager = Arc::clone(&self.manager);
        let cache = self.cache.clone();
        let ttl = self.ttls.role_permissions;
        let role_id = role_id.to_owned();
        let flight_key = format!("{ROLE_SINGLE_FLIGHT_PREFIX}{role_id}");

        self.roles
            .run(&flight_key, move || async move {
                let permissions = manager
                    .role_dyn(&role_id)
                    .await
                    .map_err(RbacError::manager)?;
                if let Some(cache) = &cache {
                    write(cache, &key, &permissions, ttl).await;
                }
                Ok(permissions)
            })
            .await
    }

    /// OR of the permissions of every role, resolved one role at a time.
    ///
    /// # Errors
    ///
    /// Returns the first manager failure.
    pub async fn merged_role_permissions(&self, roles: &[String]) -> Result<Permission, RbacError> {
        let mut merged = Permissions::new();
        for role in roles {
            merged.extend(self.role_permissions(role).await?);
        }
        Ok(merged.flatten())
    }

    /// Decides whether a subject satisfies `requirement`.
    ///
    /// An empty requirement is satisfied without any lookup. Unknown policy
    /// values deny.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Manager`] if the manager fails.
    pub async fn check(
        &self,
        subject_id: &str,
        rbac_cache_id: &str,
        requirement: &Requirement,
    ) -> Result<bool, RbacError> {
        if requirement.is_empty() {
            return Ok(true);
        }
        let Some(combinator) = requirement.policy().combinator() else {
            tracing::warn!(policy = requirement.policy().bits(), "Unknown RBAC policy, denying");
            return Ok(false);
        };

        let access = self.subject_access(subject_id, rbac_cache_id).await?;
        let roles_declared = !requirement.roles().is_empty();
        let perms_declared = requirement.permissions().is_some();

        match combinator {
            Combinator::Or(mode) => {
                if roles_declared && requirement.roles_match(&access.roles, mode) {
                    return Ok(true);
                }
                if !perms_declared {
                    return Ok(false);
                }
                self.permissions_satisfied(&access, requirement).await
            }
            Combinator::And(mode) => {
                if !requirement.roles_match(&access.roles, mode) {
                    return Ok(false);
                }
                self.permissions_satisfied(&access, requirement).await
            }
            Combinator::PermissionsOnly => self.permissions_satisfied(&access, requirement).await,
            Combinator::RoleOnly => {
                Ok(roles_declared && requirement.roles_match(&access.roles, RoleMatch::Any))
            }
        }
    }

    /// Direct permissions first, then the merged permissions of every role.
    async fn permissions_satisfied(
        &self,
        access: &SubjectAccess,
        requirement: &Requirement,
    ) -> Result<bool, RbacError> {
        let Some(required) = requirement.permissions() else {
            return Ok(true);
        };
        if access.permissions.flatten().has(required) {
            return Ok(true);
        }
        if access.roles.is_empty() {
            return Ok(false);
        }
        Ok(self.merged_role_permissions(&access.roles).await?.has(required))
    }
}

async fn read<T: DeserializeOwned>(cache: &SharedCache, key: &str) -> Option<T> {
    let bytes = cache.get_dyn(key).await?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(key, error = %e, "Discarding unreadable RBAC cache entry");
            None
        }
    }
}

async fn write<T: Serialize>(cache: &SharedCache, key: &str, value: &T, ttl: Duration) {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to serialize RBAC cache entry");
            return;
        }
    };
    if !cache.set_dyn(key, bytes, ttl).await {
        tracing::warn!(key, "Failed to write RBAC cache entry");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::BoxError;
    use crate::rbac::RbacPolicy;

    const CACHE_ID: &str = "0123456789abcdef0123456789abcdef";

    #[derive(Default)]
    struct TestManager {
        subjects: HashMap<String, (Permissions, Vec<String>)>,
        roles: HashMap<String, Permissions>,
        subject_calls: AtomicUsize,
        role_calls: AtomicUsize,
        fail: bool,
    }

    impl TestManager {
        fn with_subject(mut self, id: &str, perms: Vec<Permission>, roles: &[&str]) -> Self {
            self.subjects.insert(
                id.into(),
                (perms.into(), roles.iter().map(|r| (*r).to_string()).collect()),
            );
            self
        }

        fn with_role(mut self, id: &str, perms: Vec<Permission>) -> Self {
            self.roles.insert(id.into(), perms.into());
            self
        }
    }

    impl Manager for TestManager {
        async fn subject_roles_and_permissions(
            &self,
            subject_id: &str,
        ) -> Result<(Permissions, Vec<String>), BoxError> {
            self.subject_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail {
                return Err("manager down".into());
            }
            Ok(self.subjects.get(subject_id).cloned().unwrap_or_default())
        }

        async fn role_permissions(&self, role_id: &str) -> Result<Permissions, BoxError> {
            self.role_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("manager down".into());
            }
            Ok(self.roles.get(role_id).cloned().unwrap_or_default())
        }
    }

    /// Cache that never stores anything.
    struct RefusingCache;

    impl Cache for RefusingCache {
        async fn get(&self, _key: &str) -> Option<Vec<u8>> {
            None
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> bool {
            false
        }
    }

    fn admin_manager() -> TestManager {
        TestManager::default()
            .with_subject("alice", vec![], &["admin"])
            .with_role("admin", vec![Permission::bit(0)])
    }

    #[tokio::test]
    async fn test_role_permission_grants_access_under_or_policy() {
        let engine = RbacEngine::new(admin_manager()).with_cache(MemoryCache::new());
        let req = Requirement::new(RbacPolicy::PERMISSIONS_OR_ROLE).with_permission(Permission::bit(0));
        assert!(engine.check("alice", CACHE_ID, &req).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_role_denies_under_and_all_policy() {
        let engine = RbacEngine::new(admin_manager()).with_cache(MemoryCache::new());
        let req = Requirement::new(RbacPolicy::PERMISSIONS_AND_ALL_ROLES)
            .with_permission(Permission::bit(5))
            .with_roles(["superadmin"]);
        assert!(!engine.check("alice", CACHE_ID, &req).await.unwrap());
    }

    #[tokio::test]
    async fn test_or_policy_short_circuits_on_role() {
        let manager = Arc::new(admin_manager());
        let engine = RbacEngine::new(Arc::clone(&manager));
        let req = Requirement::new(RbacPolicy::PERMISSIONS_OR_ROLE)
            .with_permission(Permission::bit(40))
            .with_roles(["admin"]);
        assert!(engine.check("alice", CACHE_ID, &req).await.unwrap());
        assert_eq!(manager.role_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_or_policy_with_unmatched_roles_only_denies() {
        let engine = RbacEngine::new(admin_manager());
        let req = Requirement::new(RbacPolicy::PERMISSIONS_OR_ALL_ROLES).with_roles(["admin", "ops"]);
        assert!(!engine.check("alice", CACHE_ID, &req).await.unwrap());
    }

    #[tokio::test]
    async fn test_direct_permissions_skip_role_lookup() {
        let manager = Arc::new(
            TestManager::default().with_subject("bob", vec![Permission::from_bits([1, 2])], &["viewer"]),
        );
        let engine = RbacEngine::new(Arc::clone(&manager));
        let req = Requirement::new(RbacPolicy::PERMISSIONS_ONLY).with_permission(Permission::bit(2));
        assert!(engine.check("bob", CACHE_ID, &req).await.unwrap());
        assert_eq!(manager.role_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_and_policy_requires_both() {
        let manager = TestManager::default()
            .with_subject("carol", vec![Permission::bit(3)], &["editor"])
            .with_role("editor", vec![Permission::bit(4)]);
        let engine = RbacEngine::new(manager);

        let via_role = Requirement::new(RbacPolicy::PERMISSIONS_AND_ROLE)
            .with_permission(Permission::bit(4))
            .with_roles(["editor", "owner"]);
        assert!(engine.check("carol", CACHE_ID, &via_role).await.unwrap());

        let wrong_role = Requirement::new(RbacPolicy::PERMISSIONS_AND_ROLE)
            .with_permission(Permission::bit(3))
            .with_roles(["owner"]);
        assert!(!engine.check("carol", CACHE_ID, &wrong_role).await.unwrap());

        let too_much = Requirement::new(RbacPolicy::PERMISSIONS_AND_ROLE)
            .with_permission(Permission::bit(9))
            .with_roles(["editor"]);
        assert!(!engine.check("carol", CACHE_ID, &too_much).await.unwrap());
    }

    #[tokio::test]
    async fn test_direct_and_role_permissions_are_not_combined() {
        let manager = TestManager::default()
            .with_subject("carol", vec![Permission::bit(3)], &["editor"])
            .with_role("editor", vec![Permission::bit(4)]);
        let engine = RbacEngine::new(manager);

        // Direct bits and role bits are tested separately, never as a union.
        let split = Requirement::new(RbacPolicy::PERMISSIONS_ONLY)
            .with_permission(Permission::from_bits([3, 4]));
        assert!(!engine.check("carol", CACHE_ID, &split).await.unwrap());
    }

    #[tokio::test]
    async fn test_role_only_policy() {
        let engine = RbacEngine::new(admin_manager());
        let admin = Requirement::new(RbacPolicy::ROLE_ONLY).with_roles(["admin", "root"]);
        let root = Requirement::new(RbacPolicy::ROLE_ONLY).with_roles(["root"]);
        assert!(engine.check("alice", CACHE_ID, &admin).await.unwrap());
        assert!(!engine.check("alice", CACHE_ID, &root).await.unwrap());

        let no_roles = Requirement::new(RbacPolicy::ROLE_ONLY).with_permission(Permission::bit(0));
        assert!(!engine.check("alice", CACHE_ID, &no_roles).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_policy_denies() {
        let engine = RbacEngine::new(admin_manager());
        let req = Requirement::new(RbacPolicy::PERMISSIONS_OR_ROLE | RbacPolicy::ROLE_ONLY)
            .with_roles(["admin"]);
        assert!(!engine.check("alice", CACHE_ID, &req).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_requirement_skips_lookup() {
        let manager = Arc::new(admin_manager());
        let engine = RbacEngine::new(Arc::clone(&manager));
        assert!(engine.check("alice", CACHE_ID, &Requirement::default()).await.unwrap());
        assert_eq!(manager.subject_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_misses_call_manager_once() {
        let manager = Arc::new(admin_manager());
        let engine = RbacEngine::new(Arc::clone(&manager)).with_cache(MemoryCache::new());

        let lookups = (0..32).map(|_| engine.subject_access("alice", CACHE_ID));
        let results = futures::future::join_all(lookups).await;

        assert_eq!(manager.subject_calls.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        assert!(results.iter().all(|r| r.as_ref().unwrap() == first));
        assert_eq!(first.roles, vec!["admin".to_string()]);
    }

    #[tokio::test]
    async fn test_cache_hit_avoids_manager() {
        let manager = Arc::new(admin_manager());
        let cache = Arc::new(MemoryCache::new());
        let engine = RbacEngine::new(Arc::clone(&manager)).with_cache(Arc::clone(&cache));

        engine.subject_access("alice", CACHE_ID).await.unwrap();
        engine.subject_access("alice", CACHE_ID).await.unwrap();
        engine.role_permissions("admin").await.unwrap();
        engine.role_permissions("admin").await.unwrap();

        assert_eq!(manager.subject_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.role_calls.load(Ordering::SeqCst), 1);
        assert!(cache.get(&format!("{SUBJECT_PERMISSIONS_PREFIX}{CACHE_ID}")).await.is_some());
        assert!(cache.get(&format!("{SUBJECT_ROLES_PREFIX}{CACHE_ID}")).await.is_some());
        assert!(cache.get("role_perms:admin").await.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_falls_back_to_manager() {
        let manager = Arc::new(admin_manager());
        let cache = Arc::new(MemoryCache::new());
        let ttl = Duration::from_secs(60);
        cache.set(&format!("{SUBJECT_PERMISSIONS_PREFIX}{CACHE_ID}"), b"\xff\x00garbage".to_vec(), ttl).await;
        cache.set(&format!("{SUBJECT_ROLES_PREFIX}{CACHE_ID}"), b"[\"admin\"]".to_vec(), ttl).await;
        cache.set("role_perms:admin", b"{not json".to_vec(), ttl).await;

        let engine = RbacEngine::new(Arc::clone(&manager)).with_cache(Arc::clone(&cache));
        let access = engine.subject_access("alice", CACHE_ID).await.unwrap();
        assert_eq!(access.roles, vec!["admin".to_string()]);
        assert_eq!(manager.subject_calls.load(Ordering::SeqCst), 1);

        let perms = engine.role_permissions("admin").await.unwrap();
        assert_eq!(perms.flatten(), Permission::bit(0));
        assert_eq!(manager.role_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_hit_refetches_both_halves() {
        let manager = Arc::new(admin_manager());
        let cache = Arc::new(MemoryCache::new());
        cache
            .set(&format!("{SUBJECT_ROLES_PREFIX}{CACHE_ID}"), b"[\"stale\"]".to_vec(), Duration::from_secs(60))
            .await;

        let engine = RbacEngine::new(Arc::clone(&manager)).with_cache(Arc::clone(&cache));
        let access = engine.subject_access("alice", CACHE_ID).await.unwrap();

        assert_eq!(access.roles, vec!["admin".to_string()]);
        let cached = cache.get(&format!("{SUBJECT_ROLES_PREFIX}{CACHE_ID}")).await.unwrap();
        assert_eq!(cached, b"[\"admin\"]".to_vec());
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_an_error() {
        let manager = Arc::new(admin_manager());
        let engine = RbacEngine::new(Arc::clone(&manager)).with_cache(RefusingCache);
        let req = Requirement::new(RbacPolicy::PERMISSIONS_OR_ROLE).with_permission(Permission::bit(0));

        assert!(engine.check("alice", CACHE_ID, &req).await.unwrap());
        assert!(engine.check("alice", CACHE_ID, &req).await.unwrap());
        assert_eq!(manager.subject_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_manager_error_propagates() {
        let manager = TestManager {
            fail: true,
            ..admin_manager()
        };
        let engine = RbacEngine::new(manager).with_cache(MemoryCache::new());
        let req = Requirement::new(RbacPolicy::PERMISSIONS_OR_ROLE).with_permission(Permission::bit(0));
        assert!(matches!(
            engine.check("alice", CACHE_ID, &req).await,
            Err(RbacError::Manager(_))
        ));
    }
}

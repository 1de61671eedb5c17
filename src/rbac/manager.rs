use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use super::permission::Permissions;
use crate::error::BoxError;

pub const DEFAULT_SUBJECT_PERMISSIONS_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_SUBJECT_ROLES_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_ROLE_PERMISSIONS_TTL: Duration = Duration::from_secs(3 * 60);

/// Consumer-provided source of truth for roles and permissions.
///
/// # Example
///
/// ```rust,ignore
/// impl Manager for MyRbac {
///     async fn subject_roles_and_permissions(
///         &self,
///         subject_id: &str,
///     ) -> Result<(Permissions, Vec<String>), BoxError> {
///         let row = self.db.subject(subject_id).await?;
///         Ok((row.permissions, row.roles))
///     }
///
///     async fn role_permissions(&self, role_id: &str) -> Result<Permissions, BoxError> {
///         Ok(self.db.role(role_id).await?.permissions)
///     }
/// }
/// ```
pub trait Manager: Send + Sync + 'static {
    /// Direct permissions and assigned roles of a subject.
    fn subject_roles_and_permissions(
        &self,
        subject_id: &str,
    ) -> impl Future<Output = Result<(Permissions, Vec<String>), BoxError>> + Send;

    fn role_permissions(
        &self,
        role_id: &str,
    ) -> impl Future<Output = Result<Permissions, BoxError>> + Send;

    fn subject_permissions_ttl(&self) -> Duration {
        DEFAULT_SUBJECT_PERMISSIONS_TTL
    }

    fn subject_roles_ttl(&self) -> Duration {
        DEFAULT_SUBJECT_ROLES_TTL
    }

    fn role_permissions_ttl(&self) -> Duration {
        DEFAULT_ROLE_PERMISSIONS_TTL
    }
}

impl<M: Manager> Manager for Arc<M> {
    fn subject_roles_and_permissions(
        &self,
        subject_id: &str,
    ) -> impl Future<Output = Result<(Permissions, Vec<String>), BoxError>> + Send {
        (**self).subject_roles_and_permissions(subject_id)
    }

    fn role_permissions(
        &self,
        role_id: &str,
    ) -> impl Future<Output = Result<Permissions, BoxError>> + Send {
        (**self).role_permissions(role_id)
    }

    fn subject_permissions_ttl(&self) -> Duration {
        (**self).subject_permissions_ttl()
    }

    fn subject_roles_ttl(&self) -> Duration {
        (**self).subject_roles_ttl()
    }

    fn role_permissions_ttl(&self) -> Duration {
        (**self).role_permissions_ttl()
    }
}

/// Object-safe wrapper for Manager (needed for Arc<dyn>).
pub(crate) trait ManagerDyn: Send + Sync {
    fn subject_dyn<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> BoxFuture<'a, Result<(Permissions, Vec<String>), BoxError>>;

    fn role_dyn<'a>(&'a self, role_id: &'a str) -> BoxFuture<'a, Result<Permissions, BoxError>>;

    fn ttls(&self) -> CacheTtls;
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CacheTtls {
    pub(crate) subject_permissions: Duration,
    pub(crate) subject_roles: Duration,
    pub(crate) role_permissions: Duration,
}

impl<T: Manager> ManagerDyn for T {
    fn subject_dyn<'a>(
        &'a self,
        subject_id: &'a str,
    ) -> BoxFuture<'a, Result<(Permissions, Vec<String>), BoxError>> {
        Box::pin(self.subject_roles_and_permissions(subject_id))
    }

    fn role_dyn<'a>(&'a self, role_id: &'a str) -> BoxFuture<'a, Result<Permissions, BoxError>> {
        Box::pin(self.role_permissions(role_id))
    }

    fn ttls(&self) -> CacheTtls {
        CacheTtls {
            subject_permissions: self.subject_permissions_ttl(),
            subject_roles: self.subject_roles_ttl(),
            role_permissions: self.role_permissions_ttl(),
        }
    }
}

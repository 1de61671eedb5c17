use std::future::Future;

use futures::future::BoxFuture;

use super::route::RouteConfig;
use crate::error::BoxError;
use crate::session::{SessionClaims, SessionHeader};

/// Consumer-provided session persistence and verification.
///
/// Session tokens are self-contained, so the store is only consulted at
/// issuance, on cookie refresh and on bearer revalidation.
///
/// # Example
///
/// ```rust,ignore
/// impl SessionStore for AppSessions {
///     async fn verify_session(&self, claims: &SessionClaims, _: &SessionHeader) -> Result<bool, BoxError> {
///         let id = claims.session_id().unwrap_or_default();
///         Ok(!self.db.is_revoked(id).await?)
///     }
///
///     async fn store_session(&self, claims: &SessionClaims, _: Option<&SessionHeader>) -> Result<(), BoxError> {
///         self.db.insert_session(claims.session_id().unwrap_or_default()).await?;
///         Ok(())
///     }
///
///     fn subject_id(&self, claims: &SessionClaims) -> Result<String, BoxError> {
///         claims.get("user_id").map(str::to_owned).ok_or_else(|| "no user".into())
///     }
/// }
/// ```
pub trait SessionStore: Send + Sync + 'static {
    /// Whether a presented session may still be used and extended.
    fn verify_session(
        &self,
        claims: &SessionClaims,
        header: &SessionHeader,
    ) -> impl Future<Output = Result<bool, BoxError>> + Send;

    /// Persist a newly issued session.
    fn store_session(
        &self,
        claims: &SessionClaims,
        header: Option<&SessionHeader>,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Whether the claims may use `route`. Defaults to [`default_verify_claims`].
    fn verify_claims(
        &self,
        claims: &SessionClaims,
        route: &RouteConfig,
    ) -> impl Future<Output = Result<bool, BoxError>> + Send {
        let verdict = default_verify_claims(claims, route);
        async move { Ok(verdict) }
    }

    /// RBAC subject for the claims.
    fn subject_id(&self, claims: &SessionClaims) -> Result<String, BoxError>;
}

/// Session mode must be present and admitted by the route's allow and block lists.
#[must_use]
pub fn default_verify_claims(claims: &SessionClaims, route: &RouteConfig) -> bool {
    claims
        .session_mode()
        .is_some_and(|mode| route.admits_mode(mode))
}

/// Object-safe wrapper for SessionStore (needed for Arc<dyn>).
pub(crate) trait SessionStoreDyn: Send + Sync {
    fn verify_session_dyn<'a>(
        &'a self,
        claims: &'a SessionClaims,
        header: &'a SessionHeader,
    ) -> BoxFuture<'a, Result<bool, BoxError>>;

    fn store_session_dyn<'a>(
        &'a self,
        claims: &'a SessionClaims,
        header: Option<&'a SessionHeader>,
    ) -> BoxFuture<'a, Result<(), BoxError>>;

    fn verify_claims_dyn<'a>(
        &'a self,
        claims: &'a SessionClaims,
        route: &'a RouteConfig,
    ) -> BoxFuture<'a, Result<bool, BoxError>>;

    fn subject_id_dyn(&self, claims: &SessionClaims) -> Result<String, BoxError>;
}

impl<T: SessionStore> SessionStoreDyn for T {
    fn verify_session_dyn<'a>(
        &'a self,
        claims: &'a SessionClaims,
        header: &'a SessionHeader,
    ) -> BoxFuture<'a, Result<bool, BoxError>> {
        Box::pin(self.verify_session(claims, header))
    }

    fn store_session_dyn<'a>(
        &'a self,
        claims: &'a SessionClaims,
        header: Option<&'a SessionHeader>,
    ) -> BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(self.store_session(claims, header))
    }

    fn verify_claims_dyn<'a>(
        &'a self,
        claims: &'a SessionClaims,
        route: &'a RouteConfig,
    ) -> BoxFuture<'a, Result<bool, BoxError>> {
        Box::pin(self.verify_claims(claims, route))
    }

    fn subject_id_dyn(&self, claims: &SessionClaims) -> Result<String, BoxError> {
        self.subject_id(claims)
    }
}

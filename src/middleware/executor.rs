use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;

use super::cookies;
use super::error::AuthError;
use super::establish::{self, Established, TokenSource};
use super::route::RouteConfig;
use super::state::AuthState;
use crate::csrf::CompleteCsrfToken;
use crate::rbac::Permission;
use crate::session::{ID_LENGTH, SessionClaims, SessionHeader};

/// What a route handler produced.
pub enum Reply<O> {
    /// Serialized as a `200` JSON body.
    Data(O),
    /// Sent as is. Cookies set during the request are still attached.
    Manual(Response),
}

impl<O> From<O> for Reply<O> {
    fn from(output: O) -> Self {
        Self::Data(output)
    }
}

/// Everything a handler knows about the request's session.
///
/// Cookies set through the context end up on the response, including
/// error responses.
pub struct RouteContext<T> {
    pub app: T,
    auth: AuthState,
    header: Option<SessionHeader>,
    claims: Option<SessionClaims>,
    csrf: Option<CompleteCsrfToken>,
    source: TokenSource,
    cookies: Arc<Mutex<CookieJar>>,
}

impl<T> RouteContext<T> {
    #[must_use]
    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    #[must_use]
    pub fn header(&self) -> Option<&SessionHeader> {
        self.header.as_ref()
    }

    #[must_use]
    pub fn claims(&self) -> Option<&SessionClaims> {
        self.claims.as_ref()
    }

    #[must_use]
    pub fn has_session(&self) -> bool {
        self.claims.as_ref().is_some_and(SessionClaims::has_session)
    }

    #[must_use]
    pub fn session_mode(&self) -> Option<&str> {
        self.claims.as_ref().and_then(SessionClaims::session_mode)
    }

    #[must_use]
    pub fn csrf_token(&self) -> Option<&CompleteCsrfToken> {
        self.csrf.as_ref()
    }

    #[must_use]
    pub fn source(&self) -> TokenSource {
        self.source
    }

    /// Snapshot of the request cookies plus everything set so far.
    #[must_use]
    pub fn cookies(&self) -> CookieJar {
        self.cookies.lock().clone()
    }

    pub fn add_cookie(&self, cookie: Cookie<'static>) {
        cookies::put(&mut self.cookies.lock(), cookie);
    }

    /// Issue a cookie session and its tied CSRF cookie on this response.
    ///
    /// # Errors
    ///
    /// See [`AuthState::issue_session`].
    pub async fn issue_session(
        &self,
        mode: &str,
        claims: SessionClaims,
    ) -> Result<SessionClaims, AuthError> {
        let (claims, issued) = self.auth.session_cookies(mode, claims).await?;
        let mut jar = self.cookies.lock();
        for cookie in issued {
            cookies::put(&mut jar, cookie);
        }
        Ok(claims)
    }

    /// # Errors
    ///
    /// See [`AuthState::issue_bearer`].
    pub async fn issue_bearer(
        &self,
        mode: &str,
        claims: SessionClaims,
    ) -> Result<(String, SessionClaims), AuthError> {
        self.auth.issue_bearer(mode, claims).await
    }

    pub fn clear_session(&self) {
        let mut jar = self.cookies.lock();
        cookies::put(&mut jar, cookies::removal(&self.auth.config.session_cookie));
        cookies::put(&mut jar, cookies::removal(&self.auth.config.csrf_cookie));
    }

    /// Issue a CSRF cookie matching the current session, or an anonymous one.
    ///
    /// # Errors
    ///
    /// See [`AuthState::issue_csrf`].
    pub fn issue_csrf(&self) -> Result<(), AuthError> {
        let cookie = self.auth.auto_csrf_cookie(self.claims.as_ref())?;
        self.add_cookie(cookie);
        Ok(())
    }

    pub fn clear_csrf(&self) {
        self.add_cookie(cookies::removal(&self.auth.config.csrf_cookie));
    }
}

/// Run one request through session, RBAC, input binding and the handler.
///
/// Always produces exactly one response. Cookies set along the way are
/// attached to it whether it succeeds or not.
pub async fn execute<T, I, M, O, F, Fut>(
    auth: &AuthState,
    app: T,
    route: &RouteConfig,
    request: Request,
    handler: F,
) -> Response
where
    T: Send + 'static,
    I: FromRequest<(), M> + Send,
    I::Rejection: Display,
    O: Serialize,
    F: FnOnce(I, RouteContext<T>) -> Fut,
    Fut: Future<Output = Result<Reply<O>, AuthError>>,
{
    let (parts, body) = request.into_parts();
    let mut jar = CookieJar::from_headers(&parts.headers);

    let established = establish::establish(auth, route, &parts.headers, &mut jar).await;
    let established = match established {
        Ok(established) => established,
        Err(e) => return (jar, e).into_response(),
    };

    if let Err(e) = authorize(auth, route, &established).await {
        return (jar, e).into_response();
    }

    let input = match I::from_request(Request::from_parts(parts, body), &()).await {
        Ok(input) => input,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Input binding failed");
            return (jar, AuthError::Validation(rejection.to_string())).into_response();
        }
    };

    let shared_jar = Arc::new(Mutex::new(jar));
    let (header, claims) = match established.session {
        Some(p) => (Some(p.header), Some(p.claims)),
        None => (None, None),
    };
    let ctx = RouteContext {
        app,
        auth: auth.clone(),
        header,
        claims,
        csrf: established.csrf,
        source: established.source,
        cookies: Arc::clone(&shared_jar),
    };

    let reply = handler(input, ctx).await;
    let jar = std::mem::take(&mut *shared_jar.lock());

    match reply {
        Ok(Reply::Manual(response)) => (jar, response).into_response(),
        Ok(Reply::Data(_)) if route.manual_response => (jar, StatusCode::OK).into_response(),
        Ok(Reply::Data(output)) => (jar, Json(output)).into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "Route handler returned an error");
            (jar, e).into_response()
        }
    }
}

/// RBAC gate. Skipped when the route requires nothing or there is no session.
async fn authorize(
    auth: &AuthState,
    route: &RouteConfig,
    established: &Established,
) -> Result<(), AuthError> {
    let requirement = &route.requirement;
    let Some(session) = &established.session else {
        return Ok(());
    };
    if requirement.is_empty() {
        return Ok(());
    }

    let engine = auth
        .rbac
        .as_ref()
        .ok_or_else(|| AuthError::Config("route requires RBAC but no manager is set".into()))?;

    let claims = &session.claims;
    let rbac_cache_id = claims
        .rbac_cache_id()
        .filter(|id| id.len() == ID_LENGTH)
        .ok_or_else(|| AuthError::Internal("rbac cache id missing or invalid".into()))?;
    let subject_id = auth
        .sessions
        .subject_id_dyn(claims)
        .map_err(|e| AuthError::Store(e.to_string()))?;

    if engine.check(&subject_id, rbac_cache_id, requirement).await? {
        return Ok(());
    }

    tracing::debug!(subject_id = %subject_id, "RBAC check denied");
    let details = auth.config.expose_rbac_details.then(|| {
        json!({
            "permissions": requirement.permissions().map(Permission::to_text),
            "roles": requirement.roles(),
        })
    });
    Err(AuthError::Forbidden { details })
}

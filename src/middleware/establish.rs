//! Per-request session and CSRF state machine.
//!
//! A bearer header wins over a session cookie. Bearer sessions are
//! revalidated on a cached deadline and never carry CSRF. Cookie sessions
//! are refreshed in place and must present a CSRF token tied to them.

use std::time::Duration;

use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;

use super::cookies;
use super::error::AuthError;
use super::route::RouteConfig;
use super::state::AuthState;
use crate::csrf::{CompleteCsrfToken, CsrfCheck};
use crate::error::Error;
use crate::session::{self, SessionClaims, SessionHeader, now_unix};

pub const BEARER_CACHE_PREFIX: &str = "bearer_token:";

/// Extra cache lifetime past the revalidation deadline.
const BEARER_CACHE_SLACK: Duration = Duration::from_secs(5 * 60);

/// Where the request's session token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    None,
    Bearer,
    Cookie,
}

#[derive(Debug, Clone)]
pub(crate) struct Presented {
    pub(crate) header: SessionHeader,
    pub(crate) claims: SessionClaims,
}

#[derive(Debug)]
pub(crate) struct Established {
    pub(crate) session: Option<Presented>,
    pub(crate) csrf: Option<CompleteCsrfToken>,
    pub(crate) source: TokenSource,
}

pub(crate) async fn establish(
    auth: &AuthState,
    route: &RouteConfig,
    headers: &HeaderMap,
    jar: &mut CookieJar,
) -> Result<Established, AuthError> {
    let (source, extracted) = extract_session(auth, headers, jar);
    let presented = match extracted {
        Ok(presented) => presented,
        Err(e) => {
            tracing::debug!(error = %e, ?source, "Session extraction failed");
            if route.session_required {
                return Err(AuthError::Unauthenticated);
            }
            None
        }
    };

    match source {
        TokenSource::Bearer => establish_bearer(auth, route, presented).await,
        TokenSource::Cookie | TokenSource::None => {
            establish_cookie(auth, route, headers, jar, presented).await
        }
    }
}

// ── Extraction ─────────────────────────────────────────────────────

fn extract_session(
    auth: &AuthState,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> (TokenSource, Result<Option<Presented>, Error>) {
    let config = &auth.config;
    let (source, token) = if let Some(token) = bearer_value(headers, &config.bearer_header) {
        (TokenSource::Bearer, token)
    } else if let Some(token) = cookies::value(jar, &config.session_cookie.name) {
        (TokenSource::Cookie, token)
    } else {
        return (TokenSource::None, Ok(None));
    };
    (source, open_session(auth, token).map(Some))
}

fn open_session(auth: &AuthState, token: &str) -> Result<Presented, Error> {
    let (header, mut claims) =
        session::decode_session(&auth.config.session_format, &*auth.keys, token)?;
    if claims.session_mode().is_none() {
        return Err(Error::Malformed("session mode claim missing"));
    }
    claims.mark_authenticated();
    Ok(Presented { header, claims })
}

/// Header value with an optional `Bearer ` prefix removed.
fn bearer_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let raw = headers.get(name)?.to_str().ok()?.trim_start();
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    (!token.is_empty()).then_some(token)
}

fn extract_csrf(
    auth: &AuthState,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Result<CompleteCsrfToken, Error> {
    let name = auth.config.csrf_cookie.name.as_str();
    let header = headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(Error::Malformed("csrf header missing"))?;
    let cookie = cookies::value(jar, name).ok_or(Error::Malformed("csrf cookie missing"))?;
    if header != cookie {
        return Err(Error::Malformed("csrf header does not match cookie"));
    }
    CompleteCsrfToken::decode(&auth.config.csrf_format, &*auth.keys, header)
}

// ── Shared checks ──────────────────────────────────────────────────

/// Reject on a required route, otherwise continue anonymously.
fn reject_or_clear(
    route: &RouteConfig,
    presented: &mut Option<Presented>,
    reason: &'static str,
) -> Result<(), AuthError> {
    if route.session_required {
        tracing::debug!(reason, "Session rejected");
        return Err(AuthError::Unauthenticated);
    }
    if presented.take().is_some() {
        tracing::debug!(reason, "Optional session dropped");
    }
    Ok(())
}

fn validate_header(
    route: &RouteConfig,
    mut presented: Option<Presented>,
) -> Result<Option<Presented>, AuthError> {
    let usable = presented
        .as_ref()
        .is_none_or(|p| p.header.is_valid() && !p.header.is_expired());
    if !usable {
        reject_or_clear(route, &mut presented, "session header invalid or expired")?;
    }
    Ok(presented)
}

async fn verify_claims(
    auth: &AuthState,
    route: &RouteConfig,
    mut presented: Option<Presented>,
) -> Result<Option<Presented>, AuthError> {
    let Some(p) = &presented else {
        return Ok(None);
    };
    let verdict = auth.sessions.verify_claims_dyn(&p.claims, route).await;
    match verdict {
        Ok(true) => {}
        Ok(false) => reject_or_clear(route, &mut presented, "claims verification failed")?,
        Err(e) => {
            tracing::debug!(error = %e, "Claims verification errored");
            reject_or_clear(route, &mut presented, "claims verification errored")?;
        }
    }
    Ok(presented)
}

fn require_session(route: &RouteConfig, presented: Option<&Presented>) -> Result<(), AuthError> {
    if route.session_required && presented.is_none_or(|p| !p.claims.has_session()) {
        return Err(AuthError::Unauthenticated);
    }
    Ok(())
}

// ── Bearer ─────────────────────────────────────────────────────────

async fn establish_bearer(
    auth: &AuthState,
    route: &RouteConfig,
    presented: Option<Presented>,
) -> Result<Established, AuthError> {
    let mut presented = validate_header(route, presented)?;

    let still_valid = match &presented {
        Some(p) => revalidate_bearer(auth, p).await?,
        None => true,
    };
    if !still_valid {
        reject_or_clear(route, &mut presented, "bearer revalidation failed")?;
    }

    let presented = verify_claims(auth, route, presented).await?;
    require_session(route, presented.as_ref())?;

    Ok(Established {
        session: presented,
        csrf: None,
        source: TokenSource::Bearer,
    })
}

/// `true` if the bearer session is still good.
///
/// The store is asked again once the cached deadline has passed. Without a
/// cache the store is asked on every request.
async fn revalidate_bearer(auth: &AuthState, presented: &Presented) -> Result<bool, AuthError> {
    let Some(session_id) = presented.claims.session_id() else {
        return Ok(false);
    };
    let key = format!("{BEARER_CACHE_PREFIX}{session_id}");
    let now = now_unix();

    if !bearer_needs_validation(auth, &key, now).await {
        return Ok(true);
    }

    let verified = auth
        .sessions
        .verify_session_dyn(&presented.claims, &presented.header)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;
    if !verified {
        return Ok(false);
    }

    if let Some(cache) = &auth.cache {
        let period = presented.header.refresh_period_sec;
        let deadline = now.saturating_add(period);
        let ttl = Duration::from_secs(u64::try_from(period).unwrap_or(0)) + BEARER_CACHE_SLACK;
        if !cache.set_dyn(&key, deadline.to_be_bytes().to_vec(), ttl).await {
            tracing::warn!(key, "Failed to cache bearer revalidation deadline");
        }
    }
    Ok(true)
}

async fn bearer_needs_validation(auth: &AuthState, key: &str, now: i64) -> bool {
    let Some(cache) = &auth.cache else {
        return true;
    };
    let Some(bytes) = cache.get_dyn(key).await else {
        return true;
    };
    match bytes.get(..8).and_then(|b| <[u8; 8]>::try_from(b).ok()) {
        Some(raw) => i64::from_be_bytes(raw) < now,
        None => {
            tracing::debug!(key, len = bytes.len(), "Discarding malformed bearer cache entry");
            true
        }
    }
}

// ── Cookie ─────────────────────────────────────────────────────────

async fn establish_cookie(
    auth: &AuthState,
    route: &RouteConfig,
    headers: &HeaderMap,
    jar: &mut CookieJar,
    presented: Option<Presented>,
) -> Result<Established, AuthError> {
    let csrf = match extract_csrf(auth, headers, jar) {
        Ok(token) => Some(token),
        Err(e) => {
            tracing::debug!(error = %e, "CSRF extraction failed");
            if route.require_csrf {
                // Claims are not trusted yet, so the replacement is anonymous.
                cookies::put(jar, auth.csrf_cookie("")?);
                return Err(AuthError::Csrf);
            }
            None
        }
    };

    let mut presented = validate_header(route, presented)?;

    if let Some(p) = presented.take() {
        if p.header.needs_refresh() {
            match auth.refreshed_session_cookie(&p.claims, &p.header).await? {
                Some((header, cookie)) => {
                    cookies::put(jar, cookie);
                    presented = Some(Presented {
                        header,
                        claims: p.claims,
                    });
                }
                None => reject_or_clear(route, &mut presented, "session refresh refused")?,
            }
        } else {
            presented = Some(p);
        }
    }

    let mut presented = verify_claims(auth, route, presented).await?;
    require_session(route, presented.as_ref())?;

    let csrf = match csrf {
        Some(token) => {
            let claims = presented.as_ref().map(|p| &p.claims);
            check_csrf(auth, route, jar, token, claims)?
        }
        None => None,
    };
    if csrf.is_none() {
        if presented.is_some() && !route.session_required {
            // Without a matching CSRF token the session is not trusted.
            tracing::debug!("Optional session dropped, csrf token missing or rejected");
            presented = None;
            cookies::put(jar, auth.csrf_cookie("")?);
        } else {
            heal_csrf_cookie(auth, jar, presented.as_ref().map(|p| &p.claims))?;
        }
    }

    let source = if presented.is_some() {
        TokenSource::Cookie
    } else {
        TokenSource::None
    };
    Ok(Established {
        session: presented,
        csrf,
        source,
    })
}

fn check_csrf(
    auth: &AuthState,
    route: &RouteConfig,
    jar: &mut CookieJar,
    token: CompleteCsrfToken,
    claims: Option<&SessionClaims>,
) -> Result<Option<CompleteCsrfToken>, AuthError> {
    match token.check(claims, now_unix()) {
        CsrfCheck::Valid => Ok(Some(token)),
        CsrfCheck::Stale => {
            cookies::put(jar, auth.auto_csrf_cookie(claims)?);
            Ok(Some(token))
        }
        CsrfCheck::Rejected(reason) => {
            tracing::debug!(reason, "CSRF token rejected");
            if route.require_csrf {
                cookies::put(jar, auth.auto_csrf_cookie(claims)?);
                return Err(AuthError::Csrf);
            }
            // The caller replaces the cookie once it knows whether the session survives.
            Ok(None)
        }
    }
}

/// On routes without CSRF enforcement, replaces a CSRF cookie that is
/// missing or would be rejected. A usable cookie is left alone.
fn heal_csrf_cookie(
    auth: &AuthState,
    jar: &mut CookieJar,
    claims: Option<&SessionClaims>,
) -> Result<(), AuthError> {
    let usable = cookies::value(jar, &auth.config.csrf_cookie.name)
        .and_then(|value| {
            CompleteCsrfToken::decode(&auth.config.csrf_format, &*auth.keys, value).ok()
        })
        .is_some_and(|token| token.check(claims, now_unix()) == CsrfCheck::Valid);
    if !usable {
        cookies::put(jar, auth.auto_csrf_cookie(claims)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_bearer_value() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_value(&headers, "x-api-key"), None);
        headers.insert("x-api-key", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_value(&headers, "x-api-key"), Some("abc.def"));
        headers.insert("x-api-key", HeaderValue::from_static("  raw "));
        assert_eq!(bearer_value(&headers, "X-Api-Key"), Some("raw"));
        headers.insert("x-api-key", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_value(&headers, "x-api-key"), None);
    }
}

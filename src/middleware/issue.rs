use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;

use super::cookies;
use super::error::AuthError;
use super::state::AuthState;
use crate::csrf::{CompleteCsrfToken, CsrfHeader};
use crate::session::{self, SessionClaims, SessionHeader, now_unix};

impl AuthState {
    // ── Sessions ───────────────────────────────────────────────────────

    /// Issue a cookie session, plus a CSRF cookie tied to it.
    ///
    /// Reserved claims are filled in first. An empty `mode` falls back to
    /// the configured default mode. Returns the authenticated claims.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Token`] if sealing fails and
    /// [`AuthError::Store`] if the session store rejects the session.
    pub async fn issue_session(
        &self,
        jar: CookieJar,
        mode: &str,
        claims: SessionClaims,
    ) -> Result<(CookieJar, SessionClaims), AuthError> {
        let (claims, issued) = self.session_cookies(mode, claims).await?;
        Ok((issued.into_iter().fold(jar, |jar, c| jar.add(c)), claims))
    }

    /// Issue a bearer token. Bearer sessions are never refreshed, only
    /// revalidated every verification interval.
    ///
    /// # Errors
    ///
    /// Same as [`issue_session`](Self::issue_session).
    pub async fn issue_bearer(
        &self,
        mode: &str,
        mut claims: SessionClaims,
    ) -> Result<(String, SessionClaims), AuthError> {
        let config = &self.config;
        self.fill_claims(mode, &mut claims);
        let header = SessionHeader::new(true, config.bearer_lifetime, config.bearer_verify_interval);
        let token = session::encode_session(&config.session_format, &*self.keys, &header, &claims)?;

        self.sessions
            .store_session_dyn(&claims, Some(&header))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        claims.mark_authenticated();
        tracing::debug!(session_id = claims.session_id().unwrap_or_default(), "Bearer token issued");
        Ok((token, claims))
    }

    /// Reissue a cookie session with a fresh issue time and the same
    /// absolute expiry.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Unauthenticated`] if the store no longer accepts
    /// the session or it has already expired.
    pub async fn refresh_session(
        &self,
        jar: CookieJar,
        claims: &SessionClaims,
        header: &SessionHeader,
    ) -> Result<(CookieJar, SessionHeader), AuthError> {
        match self.refreshed_session_cookie(claims, header).await? {
            Some((next, cookie)) => Ok((jar.add(cookie), next)),
            None => Err(AuthError::Unauthenticated),
        }
    }

    /// Remove the session cookie and the CSRF cookie.
    #[must_use]
    pub fn clear_session(&self, jar: CookieJar) -> CookieJar {
        jar.add(cookies::removal(&self.config.session_cookie))
            .add(cookies::removal(&self.config.csrf_cookie))
    }

    // ── CSRF ───────────────────────────────────────────────────────────

    /// Issue a CSRF cookie, tied when `claims` belong to an authenticated session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Internal`] if authenticated claims carry no tie.
    pub fn issue_csrf(
        &self,
        jar: CookieJar,
        claims: Option<&SessionClaims>,
    ) -> Result<CookieJar, AuthError> {
        Ok(jar.add(self.auto_csrf_cookie(claims)?))
    }

    #[must_use]
    pub fn clear_csrf(&self, jar: CookieJar) -> CookieJar {
        jar.add(cookies::removal(&self.config.csrf_cookie))
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn fill_claims(&self, mode: &str, claims: &mut SessionClaims) {
        let mode = if mode.is_empty() {
            self.config.default_mode.as_str()
        } else {
            mode
        };
        session::ensure_basic_claims(
            claims,
            mode,
            &self.config.session_format.version,
            self.rbac.is_some(),
        );
    }

    pub(crate) async fn session_cookies(
        &self,
        mode: &str,
        mut claims: SessionClaims,
    ) -> Result<(SessionClaims, [Cookie<'static>; 2]), AuthError> {
        let config = &self.config;
        self.fill_claims(mode, &mut claims);
        let header = SessionHeader::new(false, config.session_lifetime, config.session_refresh);
        let token = session::encode_session(&config.session_format, &*self.keys, &header, &claims)?;

        self.sessions
            .store_session_dyn(&claims, Some(&header))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let session_cookie = cookies::build(
            &config.session_cookie,
            token,
            cookies::max_age(config.session_lifetime),
        );
        let csrf_cookie = self.csrf_cookie(claims.csrf_tie().unwrap_or_default())?;

        claims.mark_authenticated();
        tracing::debug!(session_id = claims.session_id().unwrap_or_default(), "Session issued");
        Ok((claims, [session_cookie, csrf_cookie]))
    }

    /// `None` when the store refuses the session or it has already expired.
    pub(crate) async fn refreshed_session_cookie(
        &self,
        claims: &SessionClaims,
        header: &SessionHeader,
    ) -> Result<Option<(SessionHeader, Cookie<'static>)>, AuthError> {
        let verified = self
            .sessions
            .verify_session_dyn(claims, header)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        if !verified {
            return Ok(None);
        }

        let config = &self.config;
        let Some(next) = header.refreshed_at(now_unix(), config.session_refresh) else {
            return Ok(None);
        };
        let token = session::encode_session(&config.session_format, &*self.keys, &next, claims)?;
        let cookie = cookies::build(
            &config.session_cookie,
            token,
            time::Duration::seconds(next.lifetime_sec),
        );
        Ok(Some((next, cookie)))
    }

    pub(crate) fn csrf_cookie(&self, tie: &str) -> Result<Cookie<'static>, AuthError> {
        let config = &self.config;
        let header = CsrfHeader::new(config.csrf_lifetime, config.csrf_refresh);
        let token = CompleteCsrfToken::issue(
            header,
            config.csrf_token_size,
            tie,
            &config.csrf_format.version,
        );
        let value = token.encode(&config.csrf_format, &*self.keys)?;
        Ok(cookies::build(
            &config.csrf_cookie,
            value,
            cookies::max_age(config.csrf_lifetime),
        ))
    }

    pub(crate) fn auto_csrf_cookie(
        &self,
        claims: Option<&SessionClaims>,
    ) -> Result<Cookie<'static>, AuthError> {
        match claims.filter(|c| c.has_session()) {
            None => self.csrf_cookie(""),
            Some(claims) => {
                let tie = claims
                    .csrf_tie()
                    .ok_or_else(|| AuthError::Internal("session carries no csrf tie".into()))?;
                self.csrf_cookie(tie)
            }
        }
    }
}

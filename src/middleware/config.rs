use std::time::Duration;

use axum_extra::extract::cookie::SameSite;

use super::error::AuthError;
use crate::csrf::DEFAULT_TOKEN_SIZE;
use crate::token::{TokenFormat, TokenLimits};

pub const DEFAULT_SESSION_COOKIE_NAME: &str = "session";
pub const DEFAULT_CSRF_NAME: &str = "X-CSRF-Token";
pub const DEFAULT_BEARER_HEADER: &str = "x-api-key";
pub const DEFAULT_SESSION_MODE: &str = "default";

/// Attributes shared by the session and CSRF cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl CookieSettings {
    fn new(name: &str, http_only: bool) -> Self {
        Self {
            name: name.into(),
            path: "/".into(),
            domain: None,
            secure: true,
            http_only,
            same_site: SameSite::Strict,
        }
    }
}

/// Session, bearer and CSRF settings.
///
/// Build with [`new()`](AuthConfig::new) and `with_*` methods, or start from
/// [`from_env()`](AuthConfig::from_env). The config is frozen once handed to
/// [`AuthState`](super::AuthState).
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub(crate) session_cookie: CookieSettings,
    pub(crate) session_lifetime: Duration,
    pub(crate) session_refresh: Duration,
    pub(crate) bearer_header: String,
    pub(crate) bearer_lifetime: Duration,
    pub(crate) bearer_verify_interval: Duration,
    pub(crate) csrf_cookie: CookieSettings,
    pub(crate) csrf_lifetime: Duration,
    pub(crate) csrf_refresh: Duration,
    pub(crate) csrf_token_size: usize,
    pub(crate) session_format: TokenFormat,
    pub(crate) csrf_format: TokenFormat,
    pub(crate) default_mode: String,
    pub(crate) expose_rbac_details: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_cookie: CookieSettings::new(DEFAULT_SESSION_COOKIE_NAME, true),
            session_lifetime: Duration::from_secs(7 * 24 * 60 * 60),
            session_refresh: Duration::from_secs(5 * 60),
            bearer_header: DEFAULT_BEARER_HEADER.into(),
            bearer_lifetime: Duration::from_secs(30 * 24 * 60 * 60),
            bearer_verify_interval: Duration::from_secs(10 * 60),
            csrf_cookie: CookieSettings::new(DEFAULT_CSRF_NAME, false),
            csrf_lifetime: Duration::from_secs(8 * 60 * 60),
            csrf_refresh: Duration::from_secs(30 * 60),
            csrf_token_size: DEFAULT_TOKEN_SIZE,
            session_format: TokenFormat::session(),
            csrf_format: TokenFormat::csrf(),
            default_mode: DEFAULT_SESSION_MODE.into(),
            expose_rbac_details: false,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `AUTH_SESSION_COOKIE`: session cookie name
    /// - `AUTH_CSRF_COOKIE`: CSRF cookie and header name
    /// - `AUTH_BEARER_HEADER`: bearer token header name
    /// - `AUTH_SESSION_TTL_SECS`, `AUTH_SESSION_REFRESH_SECS`
    /// - `AUTH_BEARER_TTL_SECS`, `AUTH_BEARER_VERIFY_SECS`
    /// - `AUTH_CSRF_TTL_SECS`, `AUTH_CSRF_REFRESH_SECS`
    /// - `AUTH_EXPOSE_RBAC_DETAILS`: `"1"` or `"true"` to include requirements in 403 bodies
    /// - `DEV_AUTH`: `"1"` or `"true"` to disable secure cookies
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if a duration is not a positive integer.
    pub fn from_env() -> Result<Self, AuthError> {
        let mut config = Self::new();

        if let Ok(name) = std::env::var("AUTH_SESSION_COOKIE") {
            config = config.with_session_cookie_name(name);
        }
        if let Ok(name) = std::env::var("AUTH_CSRF_COOKIE") {
            config = config.with_csrf_name(name);
        }
        if let Ok(name) = std::env::var("AUTH_BEARER_HEADER") {
            config = config.with_bearer_header(name);
        }
        if let Some(d) = env_secs("AUTH_SESSION_TTL_SECS")? {
            config = config.with_session_lifetime(d);
        }
        if let Some(d) = env_secs("AUTH_SESSION_REFRESH_SECS")? {
            config = config.with_session_refresh(d);
        }
        if let Some(d) = env_secs("AUTH_BEARER_TTL_SECS")? {
            config = config.with_bearer_lifetime(d);
        }
        if let Some(d) = env_secs("AUTH_BEARER_VERIFY_SECS")? {
            config = config.with_bearer_verify_interval(d);
        }
        if let Some(d) = env_secs("AUTH_CSRF_TTL_SECS")? {
            config = config.with_csrf_lifetime(d);
        }
        if let Some(d) = env_secs("AUTH_CSRF_REFRESH_SECS")? {
            config = config.with_csrf_refresh(d);
        }

        let dev_auth = env_flag("DEV_AUTH");

        Ok(config
            .with_secure_cookies(!dev_auth)
            .with_expose_rbac_details(env_flag("AUTH_EXPOSE_RBAC_DETAILS")))
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie.name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.session_cookie.path = path.into();
        self
    }

    #[must_use]
    pub fn with_session_http_only(mut self, http_only: bool) -> Self {
        self.session_cookie.http_only = http_only;
        self
    }

    /// Name of both the CSRF cookie and the header that must echo it.
    #[must_use]
    pub fn with_csrf_name(mut self, name: impl Into<String>) -> Self {
        self.csrf_cookie.name = name.into();
        self
    }

    #[must_use]
    pub fn with_csrf_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.csrf_cookie.path = path.into();
        self
    }

    /// Applies to both cookies.
    #[must_use]
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        self.session_cookie.domain = Some(domain.clone());
        self.csrf_cookie.domain = Some(domain);
        self
    }

    /// Applies to both cookies.
    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.session_cookie.secure = secure;
        self.csrf_cookie.secure = secure;
        self
    }

    /// Applies to both cookies.
    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.session_cookie.same_site = same_site;
        self.csrf_cookie.same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_session_refresh(mut self, refresh: Duration) -> Self {
        self.session_refresh = refresh;
        self
    }

    #[must_use]
    pub fn with_bearer_header(mut self, name: impl Into<String>) -> Self {
        self.bearer_header = name.into();
        self
    }

    #[must_use]
    pub fn with_bearer_lifetime(mut self, lifetime: Duration) -> Self {
        self.bearer_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_bearer_verify_interval(mut self, interval: Duration) -> Self {
        self.bearer_verify_interval = interval;
        self
    }

    #[must_use]
    pub fn with_csrf_lifetime(mut self, lifetime: Duration) -> Self {
        self.csrf_lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_csrf_refresh(mut self, refresh: Duration) -> Self {
        self.csrf_refresh = refresh;
        self
    }

    #[must_use]
    pub fn with_csrf_token_size(mut self, size: usize) -> Self {
        self.csrf_token_size = size;
        self
    }

    /// Token delimiter for both session and CSRF tokens.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        let delimiter = delimiter.into();
        self.session_format.delimiter = delimiter.clone();
        self.csrf_format.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_session_limits(mut self, limits: TokenLimits) -> Self {
        self.session_format.limits = limits;
        self
    }

    #[must_use]
    pub fn with_csrf_limits(mut self, limits: TokenLimits) -> Self {
        self.csrf_format.limits = limits;
        self
    }

    /// Session mode assigned by [`issue_session`](super::AuthState::issue_session)
    /// when the caller passes an empty mode.
    #[must_use]
    pub fn with_default_mode(mut self, mode: impl Into<String>) -> Self {
        self.default_mode = mode.into();
        self
    }

    #[must_use]
    pub fn with_expose_rbac_details(mut self, expose: bool) -> Self {
        self.expose_rbac_details = expose;
        self
    }

    #[must_use]
    pub fn session_cookie(&self) -> &CookieSettings {
        &self.session_cookie
    }

    #[must_use]
    pub fn csrf_cookie(&self) -> &CookieSettings {
        &self.csrf_cookie
    }

    #[must_use]
    pub fn bearer_header(&self) -> &str {
        &self.bearer_header
    }
}

fn env_flag(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("1") | Ok("true"))
}

fn env_secs(name: &str) -> Result<Option<Duration>, AuthError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Some(Duration::from_secs(secs))),
        _ => Err(AuthError::Config(format!(
            "{name} must be a positive number of seconds, got {raw:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::new();
        assert_eq!(config.session_cookie.name, "session");
        assert!(config.session_cookie.http_only);
        assert!(!config.csrf_cookie.http_only);
        assert_eq!(config.session_cookie.same_site, SameSite::Strict);
        assert_eq!(config.session_lifetime, Duration::from_secs(604_800));
        assert_eq!(config.csrf_refresh, Duration::from_secs(1_800));
        assert_eq!(config.bearer_header, "x-api-key");
        assert!(!config.expose_rbac_details);
    }

    #[test]
    fn test_shared_cookie_settings() {
        let config = AuthConfig::new()
            .with_secure_cookies(false)
            .with_cookie_domain("example.com")
            .with_delimiter("~");
        assert!(!config.session_cookie.secure && !config.csrf_cookie.secure);
        assert_eq!(config.csrf_cookie.domain.as_deref(), Some("example.com"));
        assert_eq!(config.session_format.delimiter, "~");
        assert_eq!(config.csrf_format.delimiter, "~");
    }
}

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use time::Duration;

use super::config::CookieSettings;

/// Create a cookie carrying `value` for `max_age`.
pub(super) fn build(settings: &CookieSettings, value: String, max_age: Duration) -> Cookie<'static> {
    let mut builder = Cookie::build((settings.name.clone(), value))
        .http_only(settings.http_only)
        .secure(settings.secure)
        .same_site(settings.same_site)
        .path(settings.path.clone())
        .max_age(max_age);
    if let Some(domain) = &settings.domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

/// Create removal cookie. Path and domain must match the issued cookie.
pub(super) fn removal(settings: &CookieSettings) -> Cookie<'static> {
    build(settings, String::new(), Duration::ZERO)
}

pub(super) fn value<'a>(jar: &'a CookieJar, name: &str) -> Option<&'a str> {
    jar.get(name).map(|c| c.value()).filter(|v| !v.is_empty())
}

pub(super) fn put(jar: &mut CookieJar, cookie: Cookie<'static>) {
    *jar = std::mem::take(jar).add(cookie);
}

pub(super) fn max_age(duration: std::time::Duration) -> Duration {
    Duration::seconds(crate::session::secs(duration))
}

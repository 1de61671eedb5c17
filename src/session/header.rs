use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifetime metadata sealed into every session token.
///
/// Never mutated: a refresh produces a new header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHeader {
    pub bearer: bool,
    pub lifetime_sec: i64,
    pub refresh_period_sec: i64,
    pub issued_at: i64,
}

impl SessionHeader {
    /// Creates a header issued now.
    #[must_use]
    pub fn new(bearer: bool, lifetime: Duration, refresh_period: Duration) -> Self {
        Self::new_at(bearer, secs(lifetime), secs(refresh_period), now_unix())
    }

    #[must_use]
    pub fn new_at(bearer: bool, lifetime_sec: i64, refresh_period_sec: i64, issued_at: i64) -> Self {
        Self {
            bearer,
            lifetime_sec,
            refresh_period_sec,
            issued_at,
        }
    }

    /// Absolute expiry as a unix timestamp.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.issued_at.saturating_add(self.lifetime_sec)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lifetime_sec > 0 && self.refresh_period_sec > 0 && self.issued_at > 0
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_unix())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at() < now
    }

    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(now_unix())
    }

    #[must_use]
    pub fn needs_refresh_at(&self, now: i64) -> bool {
        self.issued_at.saturating_add(self.refresh_period_sec) < now
    }

    /// Returns a header issued at `now` that expires at the same absolute
    /// instant as `self`.
    ///
    /// Returns `None` once the absolute expiry has been reached.
    #[must_use]
    pub fn refreshed_at(&self, now: i64, refresh_period: Duration) -> Option<Self> {
        let remaining = self.expires_at() - now;
        if remaining <= 0 {
            return None;
        }
        Some(Self::new_at(false, remaining, secs(refresh_period), now))
    }

    /// Encodes as base64url JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if serialization fails.
    pub fn encode(&self) -> Result<String, Error> {
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?))
    }

    /// # Errors
    ///
    /// Returns [`Error::Encoding`] for invalid base64 or JSON.
    pub fn decode(encoded: &str) -> Result<Self, Error> {
        let json = URL_SAFE_NO_PAD.decode(encoded)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

pub(crate) fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

pub(crate) fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

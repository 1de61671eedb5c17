//! Session, CSRF and RBAC orchestration for Axum routes.
//!
//! Every route registered through [`Routes`] runs the same pipeline:
//! establish the session (bearer header or cookie), check CSRF for cookie
//! sessions, run the RBAC gate, bind the handler input, then call the
//! handler. Cookies set along the way are attached to the response even
//! when a later stage fails.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tessera::StaticKeyStore;
//! use tessera::middleware::{AuthConfig, AuthState, RouteConfig, Routes};
//!
//! // 1. Implement SessionStore (and rbac::Manager if routes need RBAC)
//! // 2. Configure from environment
//! let config = AuthConfig::from_env()?;
//! let keys = StaticKeyStore::generate("k1")?;
//!
//! // 3. Build the shared state
//! let auth = AuthState::new(config, keys, sessions)
//!     .with_cache(MemoryCache::new())
//!     .with_rbac(manager);
//!
//! // 4. Mount routes
//! let app = Routes::new(auth, app_state)
//!     .post("/login", RouteConfig::public(), login)
//!     .get("/me", RouteConfig::new(), me)
//!     .into_router();
//! ```

mod config;
mod cookies;
mod error;
mod establish;
mod executor;
mod issue;
mod route;
mod routes;
mod state;
mod traits;


pub use config::{
    AuthConfig, CookieSettings, DEFAULT_BEARER_HEADER, DEFAULT_CSRF_NAME,
    DEFAULT_SESSION_COOKIE_NAME, DEFAULT_SESSION_MODE,
};
pub use error::AuthError;
pub use establish::{BEARER_CACHE_PREFIX, TokenSource};
pub use executor::{Reply, RouteContext, execute};
pub use route::RouteConfig;
pub use routes::Routes;
pub use state::AuthState;
pub use traits::{SessionStore, default_verify_claims};

/// Re-export cookie types for handlers that set their own cookies.
pub use axum_extra::extract::cookie::{Cookie, SameSite};

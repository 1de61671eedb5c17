use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::{FromRequest, Request};
use axum::routing::{MethodFilter, on};
use serde::Serialize;

use super::error::AuthError;
use super::executor::{Reply, RouteContext, execute};
use super::route::RouteConfig;
use super::state::AuthState;

/// Router builder whose handlers all run through [`execute`].
///
/// # Example
///
/// ```rust,ignore
/// let router = Routes::new(auth, app)
///     .post("/login", RouteConfig::public(), login)
///     .get("/me", RouteConfig::new(), me)
///     .delete("/items/{id}", RouteConfig::new().with_permission(Permission::bit(3)), delete_item)
///     .into_router();
/// ```
pub struct Routes<T> {
    auth: AuthState,
    app: T,
    router: Router,
}

impl<T> Routes<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(auth: AuthState, app: T) -> Self {
        Self {
            auth,
            app,
            router: Router::new(),
        }
    }

    #[must_use]
    pub fn get<I, M, O, F, Fut>(self, path: &str, route: RouteConfig, handler: F) -> Self
    where
        I: FromRequest<(), M> + Send + 'static,
        I::Rejection: Display,
        M: 'static,
        O: Serialize + Send + 'static,
        F: FnOnce(I, RouteContext<T>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply<O>, AuthError>> + Send + 'static,
    {
        self.route(MethodFilter::GET, path, route, handler)
    }

    #[must_use]
    pub fn post<I, M, O, F, Fut>(self, path: &str, route: RouteConfig, handler: F) -> Self
    where
        I: FromRequest<(), M> + Send + 'static,
        I::Rejection: Display,
        M: 'static,
        O: Serialize + Send + 'static,
        F: FnOnce(I, RouteContext<T>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply<O>, AuthError>> + Send + 'static,
    {
        self.route(MethodFilter::POST, path, route, handler)
    }

    #[must_use]
    pub fn put<I, M, O, F, Fut>(self, path: &str, route: RouteConfig, handler: F) -> Self
    where
        I: FromRequest<(), M> + Send + 'static,
        I::Rejection: Display,
        M: 'static,
        O: Serialize + Send + 'static,
        F: FnOnce(I, RouteContext<T>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply<O>, AuthError>> + Send + 'static,
    {
        self.route(MethodFilter::PUT, path, route, handler)
    }

    #[must_use]
    pub fn patch<I, M, O, F, Fut>(self, path: &str, route: RouteConfig, handler: F) -> Self
    where
        I: FromRequest<(), M> + Send + 'static,
        I::Rejection: Display,
        M: 'static,
        O: Serialize + Send + 'static,
        F: FnOnce(I, RouteContext<T>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply<O>, AuthError>> + Send + 'static,
    {
        self.route(MethodFilter::PATCH, path, route, handler)
    }

    #[must_use]
    pub fn delete<I, M, O, F, Fut>(self, path: &str, route: RouteConfig, handler: F) -> Self
    where
        I: FromRequest<(), M> + Send + 'static,
        I::Rejection: Display,
        M: 'static,
        O: Serialize + Send + 'static,
        F: FnOnce(I, RouteContext<T>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply<O>, AuthError>> + Send + 'static,
    {
        self.route(MethodFilter::DELETE, path, route, handler)
    }

    /// Register `handler` for `method` on `path`.
    ///
    /// Registering another method on the same path adds to it.
    #[must_use]
    pub fn route<I, M, O, F, Fut>(
        mut self,
        method: MethodFilter,
        path: &str,
        route: RouteConfig,
        handler: F,
    ) -> Self
    where
        I: FromRequest<(), M> + Send + 'static,
        I::Rejection: Display,
        M: 'static,
        O: Serialize + Send + 'static,
        F: FnOnce(I, RouteContext<T>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply<O>, AuthError>> + Send + 'static,
    {
        let auth = self.auth.clone();
        let app = self.app.clone();
        let route = Arc::new(route);

        let endpoint = move |request: Request| {
            let auth = auth.clone();
            let app = app.clone();
            let route = Arc::clone(&route);
            let handler = handler.clone();
            async move { execute(&auth, app, &route, request, handler).await }
        };

        self.router = self.router.route(path, on(method, endpoint));
        self
    }

    #[must_use]
    pub fn into_router(self) -> Router {
        self.router
    }
}

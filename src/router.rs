//! Radix-tree route table.
//!
//! One tree per method, O(path-length) lookup. A route is a callback taking
//! the request [`Context`] and the [`Next`] continuation; the registration
//! façade binds pipeline-wrapped services here, and any caller may bind its
//! own callbacks directly.
//!
//! Binding the same method + path twice replaces the earlier callback:
//! the last registration wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;

use crate::context::Context;
use crate::error::{BoxError, ServiceError};
use crate::handler::{BoxFuture, ContextFn, run_chain};
use crate::method::Method;
use crate::path::route_patterns;

type RouteFn = Arc<dyn Fn(Context, Next) -> BoxFuture<'static, Result<(), ServiceError>> + Send + Sync>;

/// The rest of the substrate chain after a matched route.
///
/// Consumed by value, so a route can continue the chain at most once.
pub struct Next {
    chain: Arc<[ContextFn]>,
}

impl Next {
    pub(crate) fn new(chain: Arc<[ContextFn]>) -> Self {
        Self { chain }
    }

    /// A continuation with nothing left to run.
    pub fn empty() -> Self {
        Self { chain: Arc::from(Vec::new()) }
    }

    pub async fn run(self, ctx: Context) -> Result<(), BoxError> {
        run_chain(&self.chain, &ctx).await
    }
}

/// The route table.
#[derive(Default)]
pub struct Router {
    trees: HashMap<Method, MatchitRouter<usize>>,
    slots: Vec<RouteFn>,
    bound: HashMap<(Method, String), usize>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `callback` to `method` + `path`, replacing any earlier binding.
    ///
    /// `path` uses service syntax: `:name` for a parameter and a trailing `*`
    /// for everything below a prefix.
    pub fn bind<F, Fut>(
        &mut self,
        method: Method,
        path: &str,
        callback: F,
    ) -> Result<(), matchit::InsertError>
    where
        F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ServiceError>> + Send + 'static,
    {
        let callback: RouteFn = Arc::new(
            move |ctx: Context, next: Next| -> BoxFuture<'static, Result<(), ServiceError>> {
                Box::pin(callback(ctx, next))
            },
        );
        let patterns = route_patterns(path);

        if let Some(&slot) = self.bound.get(&(method, path.to_owned())) {
            if let Some(existing) = self.slots.get_mut(slot) {
                *existing = callback;
                return Ok(());
            }
        }

        let slot = self.slots.len();
        let tree = self.trees.entry(method).or_default();
        for (i, pattern) in patterns.iter().enumerate() {
            if let Err(e) = tree.insert(pattern.as_str(), slot) {
                for inserted in patterns.iter().take(i) {
                    tree.remove(inserted.as_str());
                }
                return Err(e);
            }
        }
        self.slots.push(callback);
        self.bound.insert((method, path.to_owned()), slot);
        Ok(())
    }

    /// Captured parameters are percent-decoded.
    pub(crate) fn lookup(
        &self,
        method: Method,
        path: &str,
    ) -> Option<(RouteFn, HashMap<String, String>)> {
        let tree = self.trees.get(&method)?;
        let matched = tree.at(path).ok()?;
        let callback = Arc::clone(self.slots.get(*matched.value)?);
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), percent_decode_str(v).decode_utf8_lossy().into_owned()))
            .collect();
        Some((callback, params))
    }

    /// Methods with a route matching `path`, for `405` answers.
    pub(crate) fn allowed(&self, path: &str) -> Vec<Method> {
        Method::ALL
            .into_iter()
            .filter(|m| self.trees.get(m).is_some_and(|t| t.at(path).is_ok()))
            .collect()
    }

    /// Number of distinct method + path bindings.
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind_tag(router: &mut Router, method: Method, path: &str, value: &'static str) {
        router
            .bind(method, path, move |ctx: Context, _next: Next| async move {
                ctx.set_text(value);
                Ok::<_, ServiceError>(())
            })
            .unwrap();
    }

    async fn call(router: &Router, method: Method, path: &str) -> Option<String> {
        let (callback, params) = router.lookup(method, path)?;
        let ctx = Context::builder(http::Method::GET, path).build();
        ctx.set_params(params);
        callback(ctx.clone(), Next::empty()).await.ok()?;
        match ctx.response().body() {
            Some(crate::response::Body::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut router = Router::new();
        bind_tag(&mut router, Method::Get, "/ping", "first");
        bind_tag(&mut router, Method::Get, "/ping", "second");
        assert_eq!(router.len(), 1);
        assert_eq!(call(&router, Method::Get, "/ping").await.as_deref(), Some("second"));
    }

    #[test]
    fn wildcard_matches_prefix_and_below() {
        let mut router = Router::new();
        bind_tag(&mut router, Method::Get, "/assets/*", "asset");
        assert!(router.lookup(Method::Get, "/assets/").is_some());
        let (_, params) = router.lookup(Method::Get, "/assets/css/site.css").unwrap();
        assert_eq!(params.get(crate::path::WILDCARD_PARAM).map(String::as_str), Some("css/site.css"));
        assert!(router.lookup(Method::Get, "/other").is_none());
    }

    #[test]
    fn parameters_are_percent_decoded() {
        let mut router = Router::new();
        bind_tag(&mut router, Method::Get, "/files/*", "file");
        bind_tag(&mut router, Method::Get, "/users/:name", "user");
        let (_, params) = router.lookup(Method::Get, "/files/my%20file.txt").unwrap();
        assert_eq!(params.get(crate::path::WILDCARD_PARAM).map(String::as_str), Some("my file.txt"));
        let (_, params) = router.lookup(Method::Get, "/files/%2e%2e/secret").unwrap();
        assert_eq!(params.get(crate::path::WILDCARD_PARAM).map(String::as_str), Some("../secret"));
        let (_, params) = router.lookup(Method::Get, "/users/J%C3%BCrgen").unwrap();
        assert_eq!(params.get("name").map(String::as_str), Some("Jürgen"));
    }

    #[test]
    fn colon_segments_are_parameters() {
        let mut router = Router::new();
        bind_tag(&mut router, Method::Delete, "/users/:id", "gone");
        let (_, params) = router.lookup(Method::Delete, "/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert_eq!(router.allowed("/users/42"), vec![Method::Delete]);
        assert!(router.lookup(Method::Get, "/users/42").is_none());
    }
}

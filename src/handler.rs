//! Callable types and type erasure.
//!
//! # How user callables are stored
//!
//! A descriptor holds callables of many concrete types: the service handler,
//! a list of middlewares, render selectors, the catcher. Rust collections can
//! only hold one concrete type, so each kind of callable is hidden behind a
//! trait object and stored uniformly:
//!
//! ```text
//! |args: Args| async move { … }                   ← user writes this
//!        ↓ ServiceFn::new(f)
//! Arc::new(FnWrapper(f))                          ← heap-allocated wrapper
//!        ↓  stored as Arc<dyn ErasedService>
//! handler.call(args)  at request time             ← one vtable dispatch
//!        ↓
//! Box::pin(async { f(args).await… })              ← BoxFuture
//! ```
//!
//! Every wrapper is `Clone` (one atomic increment) so a canonical descriptor
//! can be shared by every request its route serves.

use std::fmt;
use std::future::Future;
use std::ops::Index;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::context::Context;
use crate::error::{BoxError, ServiceError};

/// A heap-allocated, type-erased future.
///
/// `Send + 'a` lets tokio move the future across worker threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

struct FnWrapper<F>(F);

// ── Args ──────────────────────────────────────────────────────────────────────

static NULL: Value = Value::Null;

/// Positional arguments extracted for a service handler, in the order of the
/// descriptor's input parameters.
///
/// Indexing past the end yields `null` rather than panicking.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, index: usize) -> &Value {
        self.0.get(index).unwrap_or(&NULL)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

impl Index<usize> for Args {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        self.get(index)
    }
}

// ── ServiceFn ─────────────────────────────────────────────────────────────────

trait ErasedService: Send + Sync {
    fn call(&self, args: Args) -> BoxFuture<'static, Result<Value, BoxError>>;
}

impl<F, Fut, R, E> ErasedService for FnWrapper<F>
where
    F: Fn(Args) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize,
    E: Into<BoxError>,
{
    fn call(&self, args: Args) -> BoxFuture<'static, Result<Value, BoxError>> {
        let fut = (self.0)(args);
        Box::pin(async move {
            let out = fut.await.map_err(Into::into)?;
            Ok(serde_json::to_value(out)?)
        })
    }
}

/// A service handler called with extracted [`Args`].
///
/// Any serialisable result becomes the response value.
#[derive(Clone)]
pub struct ServiceFn(Arc<dyn ErasedService>);

impl ServiceFn {
    pub fn new<F, Fut, R, E>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize,
        E: Into<BoxError>,
    {
        Self(Arc::new(FnWrapper(f)))
    }

    pub(crate) fn call(&self, args: Args) -> BoxFuture<'static, Result<Value, BoxError>> {
        self.0.call(args)
    }
}

// ── ContextFn ─────────────────────────────────────────────────────────────────

trait ErasedContextFn: Send + Sync {
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<(), BoxError>>;
}

impl<F, Fut, E> ErasedContextFn for FnWrapper<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<(), BoxError>> {
        let fut = (self.0)(ctx);
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

/// A callable with full access to the request [`Context`].
///
/// Used for middlewares, post-processes and raw `handler` services.
#[derive(Clone)]
pub struct ContextFn(Arc<dyn ErasedContextFn>);

impl ContextFn {
    pub fn new<F, Fut, E>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self(Arc::new(FnWrapper(f)))
    }

    pub(crate) fn call(&self, ctx: Context) -> BoxFuture<'static, Result<(), BoxError>> {
        self.0.call(ctx)
    }
}

/// Runs `chain` strictly in order, stopping at the first failure.
pub(crate) async fn run_chain(chain: &[ContextFn], ctx: &Context) -> Result<(), BoxError> {
    for f in chain {
        f.call(ctx.clone()).await?;
    }
    Ok(())
}

// ── Selector ──────────────────────────────────────────────────────────────────

trait ErasedSelector: Send + Sync {
    fn call(&self, ctx: Context) -> BoxFuture<'static, bool>;
}

impl<F, Fut> ErasedSelector for FnWrapper<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, bool> {
        Box::pin((self.0)(ctx))
    }
}

/// Predicate picking a template in conditional HTML rendering.
#[derive(Clone)]
pub struct Selector(Arc<dyn ErasedSelector>);

impl Selector {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        Self(Arc::new(FnWrapper(f)))
    }

    pub(crate) fn call(&self, ctx: Context) -> BoxFuture<'static, bool> {
        self.0.call(ctx)
    }
}

// ── Catcher ───────────────────────────────────────────────────────────────────

trait ErasedCatcher: Send + Sync {
    fn call(&self, err: ServiceError, ctx: Context) -> BoxFuture<'static, ()>;
}

impl<F, Fut> ErasedCatcher for FnWrapper<F>
where
    F: Fn(ServiceError, Context) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call(&self, err: ServiceError, ctx: Context) -> BoxFuture<'static, ()> {
        Box::pin((self.0)(err, ctx))
    }
}

/// The single sink for unrecovered request-time errors.
///
/// A catcher cannot fail: whatever it does to the context is the response.
#[derive(Clone)]
pub struct Catcher(Arc<dyn ErasedCatcher>);

impl Catcher {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ServiceError, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(FnWrapper(f)))
    }

    /// Answers with the error's status (200 when it carries none) and the
    /// unified error JSON as body.
    pub fn respond() -> Self {
        Self::new(|err: ServiceError, ctx: Context| async move {
            ctx.set_status(err.status().unwrap_or(http::StatusCode::OK));
            ctx.set_json(err.to_value());
        })
    }

    pub(crate) fn call(&self, err: ServiceError, ctx: Context) -> BoxFuture<'static, ()> {
        self.0.call(err, ctx)
    }
}

// ── Handler ───────────────────────────────────────────────────────────────────

/// The user handler of a service descriptor.
///
/// Which variant a descriptor needs depends on its response type: `handler`
/// responses take the raw context, `json`/`text`/`string` responses take
/// extracted arguments.
#[derive(Clone)]
pub enum Handler {
    Args(ServiceFn),
    Context(ContextFn),
}

impl Handler {
    /// Handler receiving positional [`Args`].
    pub fn args<F, Fut, R, E>(f: F) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: Serialize,
        E: Into<BoxError>,
    {
        Self::Args(ServiceFn::new(f))
    }

    /// Handler receiving the live [`Context`] and shaping the response itself.
    pub fn context<F, Fut, E>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::Context(ContextFn::new(f))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Args(_) => "args",
            Self::Context(_) => "context",
        }
    }
}

macro_rules! opaque_debug {
    ($($ty:ident),*) => {$(
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($ty), "(..)"))
            }
        }
    )*};
}

opaque_debug!(ServiceFn, ContextFn, Selector, Catcher);

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{}(..)", self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn service_fn_serialises_result() {
        let f = ServiceFn::new(|args: Args| async move {
            Ok::<_, BoxError>(args[0].as_i64().unwrap_or(0) * 2)
        });
        let out = f.call(Args::new(vec![json!(21)])).await.unwrap();
        assert_eq!(out, json!(42));
    }

    #[tokio::test]
    async fn service_fn_propagates_errors() {
        let f = ServiceFn::new(|_: Args| async move { Err::<(), _>("boom") });
        let err = f.call(Args::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn args_out_of_range_is_null() {
        let args = Args::new(vec![json!(1)]);
        assert_eq!(args[0], json!(1));
        assert_eq!(args[3], Value::Null);
        assert_eq!(args.len(), 1);
    }
}

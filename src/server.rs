//! HTTP substrate: listener, request dispatch and graceful shutdown.
//!
//! Every request goes through the same chain:
//!
//! ```text
//! body parser ─▶ static headers ─▶ server middlewares ─▶ route ─▶ server post processes
//!      │                                   │                │
//!      └─▶ 400 / 413                       └──── error ─────┴─▶ safe guard ─▶ catcher
//! ```
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server stops accepting connections, lets every
//! in-flight connection finish, then returns from [`Server::serve`].

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::StatusCode;
use http::header::{ALLOW, CONTENT_TYPE};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::{BodyParserSettings, ServerSettings};
use crate::context::{Context, parse_query};
use crate::error::{BoxError, Error, ServiceError};
use crate::handler::{ContextFn, run_chain};
use crate::method::Method;
use crate::response::{Body, Response};
use crate::router::{Next, Router};

/// The HTTP server. Cheap to clone; clones share the route table.
#[derive(Clone)]
pub struct Server {
    shared: Arc<Shared>,
}

struct Shared {
    settings: ServerSettings,
    router: Arc<RwLock<Router>>,
    post_processes: Arc<[ContextFn]>,
}

impl Server {
    pub fn new(settings: ServerSettings) -> Self {
        Self::with_router(settings, Arc::new(RwLock::new(Router::new())))
    }

    /// Serves routes from a table shared with the caller, so routes may be
    /// bound while the server is running.
    pub fn with_router(settings: ServerSettings, router: Arc<RwLock<Router>>) -> Self {
        let post_processes = Arc::from(settings.post_processes.clone());
        Self { shared: Arc::new(Shared { settings, router, post_processes }) }
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.shared.settings
    }

    pub fn router(&self) -> &Arc<RwLock<Router>> {
        &self.shared.router
    }

    /// Binds `host:port` from the settings and serves until a shutdown signal.
    pub async fn serve(self) -> Result<(), Error> {
        let listener = TcpListener::bind(self.shared.settings.bind_addr()).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves, then
    /// waits for in-flight connections.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        info!(
            addr = %listener.local_addr()?,
            public = %self.shared.settings.public,
            "courier listening"
        );

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown first, so a signal stops accepts even with a backlog.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let server = self.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let server = server.clone();
                            async move { Ok::<_, std::convert::Infallible>(server.dispatch(req).await) }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("courier stopped");
        Ok(())
    }

    /// Runs one request through the full chain without a socket.
    pub async fn handle(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        self.dispatch(req.map(Full::new)).await
    }

    // ── Request dispatch ──────────────────────────────────────────────────────

    /// Never fails: every failure becomes a response.
    async fn dispatch<B>(&self, req: http::Request<B>) -> http::Response<Full<Bytes>>
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let started = Instant::now();
        let (parts, body) = req.into_parts();
        let head = parts.method == http::Method::HEAD;

        let response = match self.parse_body(&parts, body).await {
            Ok(body) => {
                let ctx = Context::from_parts(&parts, body);
                for (name, value) in &self.shared.settings.headers {
                    ctx.set_header(name, value);
                }
                if let Err(err) = self.route(&ctx).await {
                    self.guard(err, &ctx).await;
                }
                ctx.take_response()
            }
            Err(status) => plain(status),
        };

        let res = response.into_http(head);
        if self.shared.settings.syslog {
            info!(
                method = %parts.method,
                url = %parts.uri,
                status = res.status().as_u16(),
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "request"
            );
        }
        res
    }

    async fn route(&self, ctx: &Context) -> Result<(), BoxError> {
        run_chain(&self.shared.settings.middlewares, ctx).await?;

        let path = ctx.path();
        // The read lock is released before the route runs.
        let found = Method::from_http(&ctx.method()).and_then(|method| {
            let router = self.shared.router.read();
            router.lookup(method, &path).or_else(|| match method {
                Method::Head => router.lookup(Method::Get, &path),
                _ => None,
            })
        });
        let next = Next::new(Arc::clone(&self.shared.post_processes));

        match found {
            Some((callback, params)) => {
                ctx.set_params(params);
                callback(ctx.clone(), next).await?;
                Ok(())
            }
            None => {
                let allowed = self.shared.router.read().allowed(&path);
                if !allowed.is_empty() {
                    let allow: Vec<&str> = allowed.iter().map(|m| m.as_wire()).collect();
                    ctx.set_status(StatusCode::METHOD_NOT_ALLOWED);
                    ctx.set_header(ALLOW.as_str(), &allow.join(", "));
                }
                next.run(ctx.clone()).await
            }
        }
    }

    /// Last line of defence for errors escaping the chain.
    async fn guard(&self, err: BoxError, ctx: &Context) {
        let settings = &self.shared.settings;
        match (&settings.catcher, settings.safe_guard) {
            (Some(catcher), true) => {
                let err = match err.downcast::<ServiceError>() {
                    Ok(service_err) => *service_err,
                    Err(other) => ServiceError::server_wide(other),
                };
                debug!(url = %ctx.url(), "safe guard caught: {err}");
                catcher.call(err, ctx.clone()).await;
            }
            _ => {
                error!(url = %ctx.url(), "unhandled error: {err}");
                ctx.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                ctx.set_text("Internal Server Error");
            }
        }
    }

    /// Parses the request body by content type. Unparsed bodies are `{}`,
    /// or `null` with the parser disabled.
    async fn parse_body<B>(&self, parts: &http::request::Parts, body: B) -> Result<Value, StatusCode>
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let Some(limits) = &self.shared.settings.body_parser else {
            return Ok(Value::Null);
        };
        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let Some(kind) = BodyKind::of(content_type) else {
            return Ok(Value::Object(Map::new()));
        };

        let bytes = match Limited::new(body, kind.limit(limits)).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                debug!(content_type, "request body over limit");
                return Err(StatusCode::PAYLOAD_TOO_LARGE);
            }
            Err(e) => {
                warn!("error reading request body: {e}");
                return Err(StatusCode::BAD_REQUEST);
            }
        };
        if bytes.is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        match kind {
            BodyKind::Json => serde_json::from_slice(&bytes).map_err(|e| {
                debug!("malformed json body: {e}");
                StatusCode::BAD_REQUEST
            }),
            BodyKind::Form => Ok(Value::Object(parse_query(&String::from_utf8_lossy(&bytes)))),
            BodyKind::Text => Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum BodyKind {
    Json,
    Form,
    Text,
}

impl BodyKind {
    fn of(content_type: &str) -> Option<Self> {
        let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            Some(Self::Json)
        } else if essence == "application/x-www-form-urlencoded" {
            Some(Self::Form)
        } else if essence.starts_with("text/") {
            Some(Self::Text)
        } else {
            None
        }
    }

    fn limit(self, limits: &BodyParserSettings) -> usize {
        match self {
            Self::Json => limits.json_limit,
            Self::Form => limits.form_limit,
            Self::Text => limits.text_limit,
        }
    }
}

fn plain(status: StatusCode) -> Response {
    let mut res = Response { status: Some(status), ..Response::default() };
    res.set_body(Body::Text(status.canonical_reason().unwrap_or_default().to_owned()));
    res
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. Only Ctrl-C on non-Unix targets.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(method: http::Method, uri: &str) -> http::request::Builder {
        http::Request::builder().method(method).uri(uri)
    }

    async fn body_text(res: http::Response<Full<Bytes>>) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn echo_body(server: &Server, method: Method, path: &str) {
        server
            .router()
            .write()
            .bind(method, path, |ctx: Context, next: Next| async move {
                ctx.set_json(ctx.body());
                next.run(ctx).await.map_err(ServiceError::server_wide)
            })
            .unwrap();
    }

    #[test]
    fn body_kind_follows_content_type() {
        assert_eq!(BodyKind::of("application/json; charset=utf-8"), Some(BodyKind::Json));
        assert_eq!(BodyKind::of("application/vnd.api+json"), Some(BodyKind::Json));
        assert_eq!(BodyKind::of("application/x-www-form-urlencoded"), Some(BodyKind::Form));
        assert_eq!(BodyKind::of("text/plain"), Some(BodyKind::Text));
        assert_eq!(BodyKind::of("multipart/form-data; boundary=x"), None);
        assert_eq!(BodyKind::of(""), None);
    }

    #[tokio::test]
    async fn parses_json_and_form_bodies() {
        let server = Server::new(ServerSettings::default());
        echo_body(&server, Method::Post, "/echo");

        let res = server
            .handle(
                request(http::Method::POST, "/echo")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Bytes::from_static(br#"{"x":4}"#))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, r#"{"x":4}"#);

        let res = server
            .handle(
                request(http::Method::POST, "/echo")
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Bytes::from_static(b"a=1&b=two"))
                    .unwrap(),
            )
            .await;
        let value: Value = serde_json::from_str(&body_text(res).await).unwrap();
        assert_eq!(value, json!({"a": "1", "b": "two"}));
    }

    #[tokio::test]
    async fn rejects_malformed_and_oversized_bodies() {
        let mut settings = ServerSettings::default();
        settings.body_parser = Some(BodyParserSettings { json_limit: 8, ..Default::default() });
        let server = Server::new(settings);
        echo_body(&server, Method::Post, "/echo");

        let res = server
            .handle(
                request(http::Method::POST, "/echo")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Bytes::from_static(b"{nope"))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = server
            .handle(
                request(http::Method::POST, "/echo")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Bytes::from_static(br#"{"long":"enough"}"#))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn unknown_paths_are_404_and_wrong_methods_405() {
        let server = Server::new(ServerSettings::default());
        echo_body(&server, Method::Post, "/echo");
        echo_body(&server, Method::Put, "/echo");

        let res = server.handle(request(http::Method::GET, "/missing").body(Bytes::new()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = server.handle(request(http::Method::GET, "/echo").body(Bytes::new()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[ALLOW], "POST, PUT");
    }

    #[tokio::test]
    async fn static_headers_and_head_requests() {
        let mut settings = ServerSettings::default();
        settings.headers = vec![("x-powered-by".into(), "courier".into())];
        let server = Server::new(settings);
        server
            .router()
            .write()
            .bind(Method::Get, "/hello", |ctx: Context, _next: Next| async move {
                ctx.set_text("hello");
                Ok::<_, ServiceError>(())
            })
            .unwrap();

        let res = server.handle(request(http::Method::HEAD, "/hello").body(Bytes::new()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-powered-by"], "courier");
        assert_eq!(res.headers()[http::header::CONTENT_LENGTH], "5");
        assert_eq!(body_text(res).await, "");
    }

    #[tokio::test]
    async fn middleware_errors_reach_the_catcher_as_server_wide() {
        let settings = ServerSettings::default()
            .middleware(ContextFn::new(|_| async { Err::<(), _>("no entry") }));
        let server = Server::new(settings);

        let res = server.handle(request(http::Method::GET, "/").body(Bytes::new()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let value: Value = serde_json::from_str(&body_text(res).await).unwrap();
        assert_eq!(
            value,
            json!({"type": "service provider", "subType": "server wide error catcher", "message": "no entry"}),
        );
    }

    #[tokio::test]
    async fn without_safe_guard_errors_are_500() {
        let mut settings = ServerSettings::default()
            .middleware(ContextFn::new(|_| async { Err::<(), _>("no entry") }));
        settings.safe_guard = false;
        let server = Server::new(settings);

        let res = server.handle(request(http::Method::GET, "/").body(Bytes::new()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

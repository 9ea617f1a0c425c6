//! Per-request context.
//!
//! A [`Context`] is the mutable request/response state every stage of a
//! request sees: substrate middlewares, service middlewares, the response
//! strategy, post-processes and the catcher.
//!
//! It is a cheap handle (`Arc` + lock) so it can be passed by value into
//! `async` closures. The lock is only held inside each accessor, never across
//! an `.await`, so holding a clone never blocks another stage.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::response::{Body, ContentType, Response};

/// Shared handle to the state of one in-flight request.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Mutex<State>>,
}

struct State {
    method: http::Method,
    path: String,
    url: String,
    params: HashMap<String, String>,
    header: Map<String, Value>,
    query: Map<String, Value>,
    cookies: Map<String, Value>,
    body: Value,
    files: Value,
    session: Option<Value>,
    state: Map<String, Value>,
    response: Response,
}

impl Context {
    /// Starts building a context by hand, e.g. in tests.
    pub fn builder(method: http::Method, url: &str) -> ContextBuilder {
        let (path, query) = match url.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (url, None),
        };
        ContextBuilder {
            state: State {
                method,
                path: path.to_owned(),
                url: url.to_owned(),
                params: HashMap::new(),
                header: Map::new(),
                query: query.map(parse_query).unwrap_or_default(),
                cookies: Map::new(),
                body: Value::Object(Map::new()),
                files: Value::Object(Map::new()),
                session: None,
                state: Map::new(),
                response: Response::default(),
            },
        }
    }

    pub(crate) fn from_parts(parts: &http::request::Parts, body: Value) -> Self {
        let url = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path().to_owned(), |pq| pq.as_str().to_owned());
        let mut builder = Self::builder(parts.method.clone(), &url).body(body);
        for (name, value) in &parts.headers {
            if let Ok(v) = value.to_str() {
                builder = builder.header(name.as_str(), v);
            }
        }
        builder.build()
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }

    // ── Request ───────────────────────────────────────────────────────────────

    pub fn method(&self) -> http::Method {
        self.with(|s| s.method.clone())
    }

    /// Request path, without the query string.
    pub fn path(&self) -> String {
        self.with(|s| s.path.clone())
    }

    /// Path and query as received.
    pub fn url(&self) -> String {
        self.with(|s| s.url.clone())
    }

    /// Named path parameter captured by the route (`/users/:id`).
    pub fn param(&self, name: &str) -> Option<String> {
        self.with(|s| s.params.get(name).cloned())
    }

    pub(crate) fn set_params(&self, params: HashMap<String, String>) {
        self.with(|s| s.params = params);
    }

    /// All request headers, lower-cased names.
    pub fn headers(&self) -> Value {
        self.with(|s| Value::Object(s.header.clone()))
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<String> {
        self.with(|s| {
            s.header
                .get(&name.to_ascii_lowercase())
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
    }

    pub fn query(&self) -> Value {
        self.with(|s| Value::Object(s.query.clone()))
    }

    pub fn cookies(&self) -> Value {
        self.with(|s| Value::Object(s.cookies.clone()))
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.with(|s| s.cookies.get(name).and_then(Value::as_str).map(str::to_owned))
    }

    /// Parsed request body. `{}` when the request carried none.
    pub fn body(&self) -> Value {
        self.with(|s| s.body.clone())
    }

    pub fn set_request_body(&self, body: Value) {
        self.with(|s| s.body = body);
    }

    /// Uploaded files, as placed by an upstream middleware.
    pub fn files(&self) -> Value {
        self.with(|s| s.files.clone())
    }

    pub fn set_files(&self, files: Value) {
        self.with(|s| s.files = files);
    }

    pub fn session(&self) -> Option<Value> {
        self.with(|s| s.session.clone())
    }

    pub fn set_session(&self, session: Value) {
        self.with(|s| s.session = Some(session));
    }

    /// Custom per-request value stored by a middleware.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.with(|s| s.state.get(key).cloned())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.with(|s| {
            s.state.insert(key.into(), value);
        });
    }

    /// Named field on the context: a built-in request part or custom state.
    /// Unknown names are `null`.
    pub fn field(&self, name: &str) -> Value {
        self.with(|s| match name {
            "method" => Value::String(s.method.to_string()),
            "path" => Value::String(s.path.clone()),
            "url" => Value::String(s.url.clone()),
            "params" => params_value(&s.params),
            "header" | "headers" => Value::Object(s.header.clone()),
            "query" => Value::Object(s.query.clone()),
            "cookies" => Value::Object(s.cookies.clone()),
            "body" => s.body.clone(),
            "files" => s.files.clone(),
            "session" => s.session.clone().unwrap_or(Value::Null),
            "status" => Value::from(s.response.status().as_u16()),
            _ => s.state.get(name).cloned().unwrap_or(Value::Null),
        })
    }

    /// Serialisable snapshot of the whole context.
    pub fn to_value(&self) -> Value {
        self.with(|s| {
            let mut obj = Map::new();
            obj.insert("method".into(), Value::String(s.method.to_string()));
            obj.insert("path".into(), Value::String(s.path.clone()));
            obj.insert("url".into(), Value::String(s.url.clone()));
            obj.insert("params".into(), params_value(&s.params));
            obj.insert("header".into(), Value::Object(s.header.clone()));
            obj.insert("query".into(), Value::Object(s.query.clone()));
            obj.insert("cookies".into(), Value::Object(s.cookies.clone()));
            obj.insert("body".into(), s.body.clone());
            obj.insert("files".into(), s.files.clone());
            obj.insert("session".into(), s.session.clone().unwrap_or(Value::Null));
            obj.insert("state".into(), Value::Object(s.state.clone()));
            Value::Object(obj)
        })
    }

    // ── Response ──────────────────────────────────────────────────────────────

    pub fn status(&self) -> StatusCode {
        self.with(|s| s.response.status())
    }

    pub fn set_status(&self, status: StatusCode) {
        self.with(|s| s.response.status = Some(status));
    }

    pub fn set_header(&self, name: &str, value: &str) {
        self.with(|s| s.response.set_header(name, value));
    }

    pub fn set_body(&self, body: Body) {
        self.with(|s| s.response.set_body(body));
    }

    pub fn set_json(&self, value: Value) {
        self.set_body(Body::Json(value));
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.set_body(Body::Text(text.into()));
    }

    pub fn set_html(&self, html: impl Into<String>) {
        self.set_body(Body::Html(html.into()));
    }

    pub fn set_bytes(&self, content_type: ContentType, data: impl Into<Bytes>) {
        self.set_body(Body::Bytes { content_type, data: data.into() });
    }

    /// Snapshot of the response as it stands.
    pub fn response(&self) -> Response {
        self.with(|s| s.response.clone())
    }

    pub(crate) fn take_response(&self) -> Response {
        self.with(|s| std::mem::take(&mut s.response))
    }
}

// ── ContextBuilder ────────────────────────────────────────────────────────────

/// Fluent builder for [`Context`]. Obtain via [`Context::builder`].
pub struct ContextBuilder {
    state: State,
}

impl ContextBuilder {
    /// Adds a request header. Repeated names are joined with `, `; `cookie`
    /// headers also populate the cookie jar.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name == "cookie" {
            parse_cookies(value, &mut self.state.cookies);
        }
        let joined = match self.state.header.get(&name).and_then(Value::as_str) {
            Some(prev) => format!("{prev}, {value}"),
            None => value.to_owned(),
        };
        self.state.header.insert(name, Value::String(joined));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.state.body = body;
        self
    }

    pub fn files(mut self, files: Value) -> Self {
        self.state.files = files;
        self
    }

    pub fn session(mut self, session: Value) -> Self {
        self.state.session = Some(session);
        self
    }

    pub fn build(self) -> Context {
        Context { inner: Arc::new(Mutex::new(self.state)) }
    }
}

// ── Parsing helpers ───────────────────────────────────────────────────────────

/// Parses a query string. Repeated keys collect into an array.
pub(crate) fn parse_query(query: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let value = Value::String(value.into_owned());
        match out.get_mut(&*key) {
            Some(Value::Array(items)) => items.push(value),
            Some(prev) => {
                let first = prev.take();
                *prev = Value::Array(vec![first, value]);
            }
            None => {
                out.insert(key.into_owned(), value);
            }
        }
    }
    out
}

fn parse_cookies(header: &str, jar: &mut Map<String, Value>) {
    for pair in header.split(';') {
        let Some((name, value)) = pair.trim().split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        jar.insert(name.trim().to_owned(), Value::String(value.to_owned()));
    }
}

fn params_value(params: &HashMap<String, String>) -> Value {
    params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect::<Map<_, _>>()
        .into()
}

//! Service descriptors, raw and canonical.
//!
//! A caller describes a service with a [`RawServiceDescriptor`]: every token
//! is an optional, case-insensitive string. [`normalize`](crate::normalize)
//! turns it into a [`ServiceSettings`], where every token is a closed enum and
//! every default is filled in.
//!
//! Services can also be described by identity ([`ServiceIdentity`]: module,
//! name, typed arguments, return type). [`ServiceDefinition`] is the tagged
//! union of both shapes; [`ServiceIdentity::adapt`] is the one place the
//! identity shape is converted into the HTTP shape.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::handler::{ContextFn, Handler, Selector};
use crate::method::Method;

// ── Closed token sets ─────────────────────────────────────────────────────────

/// Declares a closed token enum with a case-insensitive lookup: the input is
/// lower-cased and matched against the canonical tokens.
macro_rules! token_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $token:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Canonical lower-case token.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $token),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($token => Ok(Self::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

token_enum! {
    /// Protocol a service is exposed over.
    Protocol {
        Http => "http",
        Https => "https",
        Http2 => "http2",
    }
}

token_enum! {
    /// Where in the request a handler argument comes from.
    Position {
        Body => "body",
        Ctx => "ctx",
        Session => "session",
        Files => "files",
        Header => "header",
        Query => "query",
        Cookies => "cookies",
    }
}

token_enum! {
    /// Declared argument type. Only `object` exists; reserved for coercion.
    ParamType {
        Object => "object",
    }
}

token_enum! {
    /// How the pipeline produces the response.
    ResponseKind {
        Static => "static",
        File => "file",
        Html => "html",
        Render => "render",
        Handler => "handler",
        Json => "json",
        Text => "text",
        String => "string",
    }
}

impl ResponseKind {
    /// `static` and `file` serve a directory tree under a wildcard route.
    pub fn is_file_tree(self) -> bool {
        matches!(self, Self::Static | Self::File)
    }

    /// The handler variant this kind calls, if it calls one.
    pub(crate) fn handler_kind(self) -> Option<&'static str> {
        match self {
            Self::Handler => Some("context"),
            Self::Json | Self::Text | Self::String => Some("args"),
            Self::Static | Self::File | Self::Html | Self::Render => None,
        }
    }
}

// ── Parameters ────────────────────────────────────────────────────────────────

/// One handler argument, as the caller wrote it.
///
/// `name` is kept loosely typed so a non-string name can be reported instead
/// of silently coerced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawParameterSpec {
    pub position: Option<String>,
    pub param_type: Option<String>,
    pub name: Option<Value>,
}

impl RawParameterSpec {
    /// The whole bucket at `position`.
    pub fn whole(position: &str) -> Self {
        Self { position: Some(position.to_owned()), ..Self::default() }
    }

    /// A single named field inside the bucket at `position`.
    pub fn named(position: &str, name: &str) -> Self {
        Self {
            position: Some(position.to_owned()),
            param_type: None,
            name: Some(Value::String(name.to_owned())),
        }
    }

    pub fn with_type(mut self, param_type: &str) -> Self {
        self.param_type = Some(param_type.to_owned());
        self
    }
}

/// One handler argument, canonical. An empty `name` means the whole bucket.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParameterSpec {
    pub position: Position,
    pub param_type: ParamType,
    pub name: String,
}

impl Default for ParameterSpec {
    /// The whole request body.
    fn default() -> Self {
        Self { position: Position::Body, param_type: ParamType::Object, name: String::new() }
    }
}

impl From<&ParameterSpec> for RawParameterSpec {
    fn from(spec: &ParameterSpec) -> Self {
        Self {
            position: Some(spec.position.as_str().to_owned()),
            param_type: Some(spec.param_type.as_str().to_owned()),
            name: Some(Value::String(spec.name.clone())),
        }
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// A template chosen when its selector accepts the request.
#[derive(Clone, Debug)]
pub struct RenderRule {
    pub selector: Selector,
    pub path: String,
}

impl RenderRule {
    pub fn new(selector: Selector, path: impl Into<String>) -> Self {
        Self { selector, path: path.into() }
    }
}

/// Filesystem source of a file-backed response.
#[derive(Clone, Debug)]
pub enum ResponsePath {
    /// A root directory (`static`/`file`) or a single file (`html`/`render`).
    Path(String),
    /// Ordered conditional templates (`html`/`render`).
    Rules(Vec<RenderRule>),
}

#[derive(Clone, Debug, Default)]
pub struct RawResponseSpec {
    pub kind: Option<String>,
    pub path: Option<ResponsePath>,
}

#[derive(Clone, Debug)]
pub struct ResponseSpec {
    pub kind: ResponseKind,
    pub path: Option<ResponsePath>,
}

// ── Descriptors ───────────────────────────────────────────────────────────────

/// A service as the caller describes it. Built fluently:
///
/// ```rust
/// use courier::{Args, BoxError, Handler, RawServiceDescriptor};
///
/// let ping = RawServiceDescriptor::new()
///     .method("GET")
///     .path("/ping")
///     .response_type("text")
///     .handler(Handler::args(|_: Args| async { Ok::<_, BoxError>("pong") }));
/// ```
#[derive(Clone, Debug, Default)]
pub struct RawServiceDescriptor {
    pub protocol: Option<String>,
    pub path: Option<String>,
    pub method: Option<String>,
    pub handler: Option<Handler>,
    /// `None` means one argument: the whole body.
    pub input_parameters: Option<Vec<RawParameterSpec>>,
    pub response: Option<RawResponseSpec>,
    pub middlewares: Vec<ContextFn>,
    pub post_processes: Vec<ContextFn>,
}

impl RawServiceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn protocol(mut self, protocol: &str) -> Self {
        self.protocol = Some(protocol.to_owned());
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path = Some(path.to_owned());
        self
    }

    pub fn method(mut self, method: &str) -> Self {
        self.method = Some(method.to_owned());
        self
    }

    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Appends one input parameter.
    pub fn param(mut self, spec: RawParameterSpec) -> Self {
        self.input_parameters.get_or_insert_with(Vec::new).push(spec);
        self
    }

    /// Replaces the input parameters. An empty list means no arguments.
    pub fn params(mut self, specs: impl IntoIterator<Item = RawParameterSpec>) -> Self {
        self.input_parameters = Some(specs.into_iter().collect());
        self
    }

    pub fn response_type(mut self, kind: &str) -> Self {
        self.response.get_or_insert_with(RawResponseSpec::default).kind = Some(kind.to_owned());
        self
    }

    pub fn response_path(mut self, path: ResponsePath) -> Self {
        self.response.get_or_insert_with(RawResponseSpec::default).path = Some(path);
        self
    }

    pub fn middleware(mut self, f: ContextFn) -> Self {
        self.middlewares.push(f);
        self
    }

    pub fn post_process(mut self, f: ContextFn) -> Self {
        self.post_processes.push(f);
        self
    }
}

/// A normalized service descriptor. Immutable once produced.
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    pub protocol: Protocol,
    /// Absolute route path, root included.
    pub path: String,
    pub method: Method,
    pub handler: Option<Handler>,
    pub input_parameters: Vec<ParameterSpec>,
    pub response: ResponseSpec,
    pub middlewares: Vec<ContextFn>,
    pub post_processes: Vec<ContextFn>,
    /// `PROTOCOL@method:path`, e.g. `HTTP@get:/ping`.
    pub summary: String,
}

/// Back to the raw shape, e.g. to normalize again.
impl From<&ServiceSettings> for RawServiceDescriptor {
    fn from(s: &ServiceSettings) -> Self {
        Self {
            protocol: Some(s.protocol.as_str().to_owned()),
            path: Some(s.path.clone()),
            method: Some(s.method.as_str().to_owned()),
            handler: s.handler.clone(),
            input_parameters: Some(s.input_parameters.iter().map(RawParameterSpec::from).collect()),
            response: Some(RawResponseSpec {
                kind: Some(s.response.kind.as_str().to_owned()),
                path: s.response.path.clone(),
            }),
            middlewares: s.middlewares.clone(),
            post_processes: s.post_processes.clone(),
        }
    }
}

// ── Service identity ──────────────────────────────────────────────────────────

/// A typed argument of a service described by identity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceArgument {
    pub name: String,
    pub arg_type: String,
}

impl ServiceArgument {
    pub fn new(name: &str, arg_type: &str) -> Self {
        Self { name: name.to_owned(), arg_type: arg_type.to_owned() }
    }
}

/// HTTP settings overriding what would be derived from an identity.
#[derive(Clone, Debug, Default)]
pub struct HttpOverrides {
    pub path: Option<String>,
    pub method: Option<String>,
    pub input_parameters: Option<Vec<RawParameterSpec>>,
    pub response: Option<RawResponseSpec>,
}

/// A service described by what it is rather than where it lives.
#[derive(Clone, Debug)]
pub struct ServiceIdentity {
    pub module: String,
    pub name: String,
    pub arguments: Vec<ServiceArgument>,
    pub return_type: Option<String>,
    pub overrides: HttpOverrides,
    pub handler: Option<Handler>,
}

impl ServiceIdentity {
    pub fn new(module: &str, name: &str) -> Self {
        Self {
            module: module.to_owned(),
            name: name.to_owned(),
            arguments: Vec::new(),
            return_type: None,
            overrides: HttpOverrides::default(),
            handler: None,
        }
    }

    pub fn argument(mut self, name: &str, arg_type: &str) -> Self {
        self.arguments.push(ServiceArgument::new(name, arg_type));
        self
    }

    pub fn returns(mut self, return_type: &str) -> Self {
        self.return_type = Some(return_type.to_owned());
        self
    }

    pub fn overrides(mut self, overrides: HttpOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Converts to the HTTP shape.
    ///
    /// - path: override, else `module/name`
    /// - protocol: the serving provider's
    /// - method: override, else `post`
    /// - parameters: override, else one named body field per argument
    /// - response: override, else `text` for `string`/`text` return types
    ///   and `json` for anything else
    pub fn adapt(self, protocol: Protocol) -> RawServiceDescriptor {
        let input_parameters = self.overrides.input_parameters.or_else(|| {
            (!self.arguments.is_empty()).then(|| {
                self.arguments
                    .iter()
                    .map(|arg| RawParameterSpec::named(Position::Body.as_str(), &arg.name))
                    .collect()
            })
        });
        let response = self.overrides.response.unwrap_or_else(|| {
            let kind = match self.return_type.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("string" | "text") => ResponseKind::Text,
                _ => ResponseKind::Json,
            };
            RawResponseSpec { kind: Some(kind.as_str().to_owned()), path: None }
        });

        RawServiceDescriptor {
            protocol: Some(protocol.as_str().to_owned()),
            path: Some(
                self.overrides.path.unwrap_or_else(|| format!("{}/{}", self.module, self.name)),
            ),
            method: Some(self.overrides.method.unwrap_or_else(|| Method::Post.as_str().to_owned())),
            handler: self.handler,
            input_parameters,
            response: Some(response),
            middlewares: Vec::new(),
            post_processes: Vec::new(),
        }
    }
}

/// Either descriptor shape a service can be registered with.
#[derive(Clone, Debug)]
pub enum ServiceDefinition {
    Http(RawServiceDescriptor),
    Identity(ServiceIdentity),
}

impl ServiceDefinition {
    /// The HTTP shape, adapting an identity if needed.
    pub fn into_raw(self, protocol: Protocol) -> RawServiceDescriptor {
        match self {
            Self::Http(raw) => raw,
            Self::Identity(identity) => identity.adapt(protocol),
        }
    }
}

impl From<RawServiceDescriptor> for ServiceDefinition {
    fn from(raw: RawServiceDescriptor) -> Self {
        Self::Http(raw)
    }
}

impl From<ServiceIdentity> for ServiceDefinition {
    fn from(identity: ServiceIdentity) -> Self {
        Self::Identity(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_case_insensitive() {
        assert_eq!("HTTP".parse(), Ok(Protocol::Http));
        assert_eq!("Query".parse(), Ok(Position::Query));
        assert_eq!("JSON".parse(), Ok(ResponseKind::Json));
        assert_eq!("OBJECT".parse(), Ok(ParamType::Object));
        assert_eq!("gopher".parse::<Protocol>(), Err(()));
    }

    #[test]
    fn identity_defaults_to_module_path_and_body_fields() {
        let raw = ServiceIdentity::new("users", "create")
            .argument("name", "string")
            .argument("age", "number")
            .returns("number")
            .adapt(Protocol::Http);

        assert_eq!(raw.path.as_deref(), Some("users/create"));
        assert_eq!(raw.method.as_deref(), Some("post"));
        assert_eq!(raw.protocol.as_deref(), Some("http"));
        assert_eq!(
            raw.input_parameters,
            Some(vec![RawParameterSpec::named("body", "name"), RawParameterSpec::named("body", "age")]),
        );
        assert_eq!(raw.response.and_then(|r| r.kind).as_deref(), Some("json"));
    }

    #[test]
    fn identity_overrides_win() {
        let raw = ServiceIdentity::new("users", "find")
            .argument("id", "string")
            .returns("string")
            .overrides(HttpOverrides {
                path: Some("/users/find".into()),
                method: Some("GET".into()),
                input_parameters: Some(vec![RawParameterSpec::named("query", "id")]),
                response: None,
            })
            .adapt(Protocol::Https);

        assert_eq!(raw.path.as_deref(), Some("/users/find"));
        assert_eq!(raw.method.as_deref(), Some("GET"));
        assert_eq!(raw.input_parameters, Some(vec![RawParameterSpec::named("query", "id")]));
        assert_eq!(raw.response.and_then(|r| r.kind).as_deref(), Some("text"));
    }

    #[test]
    fn identity_without_arguments_keeps_default_parameters() {
        let raw = ServiceIdentity::new("sys", "ping").adapt(Protocol::Http);
        assert_eq!(raw.input_parameters, None);
    }
}

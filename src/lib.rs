//! # courier
//!
//! Declarative service registration on a minimal HTTP substrate.
//!
//! A service is described, not wired: protocol, path, method, where each
//! handler argument comes from, and how the result becomes a response.
//! courier validates the description once, binds it, and runs every request
//! through the same pipeline:
//!
//! ```text
//! middlewares ─▶ handler ─▶ post processes ─▶ next
//!       └──── any failure ────┴──▶ catcher
//! ```
//!
//! What the substrate does for you:
//!
//! - Radix-tree routing via [`matchit`], `:name` parameters, trailing `*`
//! - JSON, form and text body parsing with per-type size limits
//! - A safe guard turning escaped errors into one JSON error shape
//! - Graceful shutdown on SIGTERM / Ctrl-C
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use courier::{Args, BoxError, Handler, RawParameterSpec, RawServiceDescriptor, ServerSettings, ServiceProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), courier::Error> {
//!     let provider = ServiceProvider::new(ServerSettings::default());
//!
//!     provider.register_service(
//!         RawServiceDescriptor::new()
//!             .path("/add")
//!             .method("post")
//!             .param(RawParameterSpec::named("body", "x"))
//!             .handler(Handler::args(|args: Args| async move {
//!                 Ok::<_, BoxError>(args[0].as_i64().unwrap_or(0) + 1)
//!             })),
//!     )?;
//!
//!     // POST /add {"x": 4}  ->  {"res": 5}
//!     provider.serve().await
//! }
//! ```

mod context;
mod descriptor;
mod error;
mod extract;
mod files;
mod handler;
mod method;
mod normalize;
mod path;
mod pipeline;
mod provider;
mod response;
mod router;
mod server;
mod strategy;

pub mod config;

pub use config::{ProviderSettings, PublicInfo, ServerSettings};
pub use context::{Context, ContextBuilder};
pub use descriptor::{
    HttpOverrides, ParamType, ParameterSpec, Position, Protocol, RawParameterSpec,
    RawResponseSpec, RawServiceDescriptor, RenderRule, ResponseKind, ResponsePath, ResponseSpec,
    ServiceArgument, ServiceDefinition, ServiceIdentity, ServiceSettings,
};
pub use error::{
    BoxError, ConfigError, Error, ErrorOrigin, ExtractionError, FileError, ServiceError,
    ValidationError,
};
pub use extract::{extract, extract_raw};
pub use files::{read_text, read_within};
pub use handler::{Args, BoxFuture, Catcher, ContextFn, Handler, Selector, ServiceFn};
pub use method::Method;
pub use normalize::{DEFAULT_STATIC_ROOT, normalize, summary};
pub use path::{ensure_wildcard, join_path, validate_path, validate_root};
pub use pipeline::Stage;
pub use provider::ServiceProvider;
pub use response::{Body, ContentType, Response};
pub use router::{Next, Router};
pub use server::Server;

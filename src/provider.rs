//! Registration façade.
//!
//! A [`ServiceProvider`] owns a [`Server`] and turns descriptors into bound
//! routes: normalize, wrap in a [`Pipeline`], bind. A descriptor that fails
//! any of those steps is rejected and leaves the route table untouched.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use tracing::{debug, warn};

use crate::config::{ProviderSettings, PublicInfo, ServerSettings};
use crate::context::Context;
use crate::descriptor::{RawServiceDescriptor, ServiceDefinition, ServiceSettings};
use crate::error::{Error, ValidationError};
use crate::normalize::normalize;
use crate::pipeline::Pipeline;
use crate::router::Next;
use crate::server::Server;

/// Registers services and serves them.
///
/// ```rust,no_run
/// use courier::{Args, BoxError, Handler, RawServiceDescriptor, ServerSettings, ServiceProvider};
///
/// #[tokio::main]
/// async fn main() -> Result<(), courier::Error> {
///     let provider = ServiceProvider::new(ServerSettings::default());
///     provider.register_service(
///         RawServiceDescriptor::new()
///             .path("/ping")
///             .method("get")
///             .response_type("text")
///             .handler(Handler::args(|_: Args| async { Ok::<_, BoxError>("pong") })),
///     )?;
///     provider.serve().await
/// }
/// ```
#[derive(Clone)]
pub struct ServiceProvider {
    server: Server,
}

impl ServiceProvider {
    pub fn new(settings: ServerSettings) -> Self {
        Self { server: Server::new(settings) }
    }

    /// Resolves partial settings first.
    pub fn from_settings(settings: ProviderSettings) -> Result<Self, Error> {
        Ok(Self::new(settings.resolve()?))
    }

    pub fn settings(&self) -> &ServerSettings {
        self.server.settings()
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Normalizes `raw` and binds it. Returns the canonical settings the
    /// service runs with.
    pub fn register_service(
        &self,
        raw: RawServiceDescriptor,
    ) -> Result<ServiceSettings, ValidationError> {
        let settings = self.server.settings();
        let normalized = normalize(&raw, &settings.root).inspect_err(|e| {
            warn!("service registration rejected: {e}");
        })?;
        let pipeline = Arc::new(
            Pipeline::new(Arc::new(normalized.clone()), settings.catcher.clone())
                .inspect_err(|e| warn!("service registration rejected: {e}"))?,
        );

        self.server
            .router()
            .write()
            .bind(normalized.method, &normalized.path, move |ctx: Context, next: Next| {
                let pipeline = Arc::clone(&pipeline);
                async move { pipeline.run(ctx, next).await }
            })
            .map_err(|e| {
                let err = ValidationError::new(format!(
                    "failed to register service [{}] on path [{}]: {e}",
                    normalized.summary, normalized.path,
                ));
                warn!("service registration rejected: {err}");
                err
            })?;

        debug!(service = %normalized.summary, "service registered");
        Ok(normalized)
    }

    /// Registers either descriptor shape. Identities take the provider's
    /// protocol.
    pub fn register(
        &self,
        definition: impl Into<ServiceDefinition>,
    ) -> Result<ServiceSettings, ValidationError> {
        let raw = definition.into().into_raw(self.settings().protocol);
        self.register_service(raw)
    }

    /// How the provider is reached from outside.
    pub fn info(&self) -> &PublicInfo {
        &self.settings().public
    }

    /// [`info`](Self::info) as `PROTOCOL://host:port[/root]`.
    pub fn info_str(&self) -> String {
        self.info().to_string()
    }

    /// Runs one request in-process.
    pub async fn handle(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        self.server.handle(req).await
    }

    pub async fn serve(&self) -> Result<(), Error> {
        self.server.clone().serve().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Args, ContextFn, Handler};
    use crate::error::BoxError;

    fn ping() -> RawServiceDescriptor {
        RawServiceDescriptor::new()
            .path("/ping")
            .method("get")
            .response_type("text")
            .handler(Handler::args(|_: Args| async { Ok::<_, BoxError>("pong") }))
    }

    #[test]
    fn registration_returns_canonical_settings() {
        let mut settings = ServerSettings::default();
        settings.root = "/api".into();
        let provider = ServiceProvider::new(settings);

        let canonical = provider.register_service(ping()).unwrap();
        assert_eq!(canonical.path, "/api/ping");
        assert_eq!(canonical.summary, "HTTP@get:/api/ping");
        assert_eq!(provider.server().router().read().len(), 1);
    }

    #[test]
    fn rejected_descriptors_leave_the_table_unchanged() {
        let provider = ServiceProvider::new(ServerSettings::default());
        provider.register_service(ping()).unwrap();

        let err = provider.register_service(ping().method("FETCH")).unwrap_err();
        assert!(err.message().contains("<FETCH>"));
        let err = provider
            .register_service(RawServiceDescriptor::new().path("/nothing"))
            .unwrap_err();
        assert!(err.message().contains("Missing handler"));
        assert_eq!(provider.server().router().read().len(), 1);

        let user = |path: &str| {
            RawServiceDescriptor::new()
                .path(path)
                .method("get")
                .response_type("handler")
                .handler(Handler::context(|_| async { Ok::<_, BoxError>(()) }))
                .middleware(ContextFn::new(|_| async { Ok::<_, BoxError>(()) }))
        };
        provider.register_service(user("/users/:id")).unwrap();
        let err = provider.register_service(user("/users/:name")).unwrap_err();
        assert!(err.message().starts_with("failed to register service [HTTP@get:/users/:name]"));

        assert_eq!(provider.server().router().read().len(), 2);
    }

    #[test]
    fn info_reports_public_address() {
        let provider = ServiceProvider::from_settings(ProviderSettings {
            port: Some(8080),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(provider.info_str(), "HTTP://127.0.0.1:8080");
    }
}

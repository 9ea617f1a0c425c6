//! Minimal courier example: a text ping, a JSON calculation, a raw context
//! handler, an identity-registered service and a static file tree.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/ping
//!   curl -X POST http://localhost:3000/api/add \
//!        -H 'content-type: application/json' -d '{"x":4}'
//!   curl 'http://localhost:3000/api/whoami?name=alice' -H 'cookie: session=abc'
//!   curl -X POST http://localhost:3000/api/math/double \
//!        -H 'content-type: application/json' -d '{"n":21}'
//!   curl http://localhost:3000/api/files/Cargo.toml

use courier::{
    Args, BoxError, Context, ContextFn, Handler, ProviderSettings, RawParameterSpec,
    RawServiceDescriptor, ResponsePath, ServiceIdentity, ServiceProvider,
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), courier::Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let settings = ProviderSettings::from_toml_str(
        r#"
        port = 3000
        root = "/api"
        headers = { "x-powered-by" = "courier" }
        "#,
    )?;
    let provider = ServiceProvider::from_settings(settings)?;

    // GET /api/ping -> pong
    provider.register_service(
        RawServiceDescriptor::new()
            .path("ping")
            .method("GET")
            .response_type("text")
            .handler(Handler::args(|_: Args| async { Ok::<_, BoxError>("pong") })),
    )?;

    // POST /api/add {"x": 4} -> {"res": 5}
    provider.register_service(
        RawServiceDescriptor::new()
            .path("/add")
            .param(RawParameterSpec::named("body", "x"))
            .middleware(ContextFn::new(|ctx: Context| async move {
                if ctx.body().get("x").is_some_and(serde_json::Value::is_number) {
                    Ok(())
                } else {
                    Err(BoxError::from("x must be a number"))
                }
            }))
            .handler(Handler::args(|args: Args| async move {
                Ok::<_, BoxError>(args[0].as_i64().unwrap_or(0) + 1)
            })),
    )?;

    // GET /api/whoami: full control over the response.
    provider.register_service(
        RawServiceDescriptor::new()
            .path("/whoami")
            .method("get")
            .response_type("handler")
            .handler(Handler::context(|ctx: Context| async move {
                ctx.set_json(json!({
                    "name": ctx.query().get("name"),
                    "session": ctx.cookie("session"),
                }));
                Ok::<_, BoxError>(())
            })),
    )?;

    // POST /api/math/double {"n": 21} -> {"res": 42}
    provider.register(
        ServiceIdentity::new("math", "double")
            .argument("n", "number")
            .returns("number")
            .handler(Handler::args(|args: Args| async move {
                Ok::<_, BoxError>(args[0].as_i64().unwrap_or(0) * 2)
            })),
    )?;

    // GET /api/files/* serves the current directory.
    provider.register_service(
        RawServiceDescriptor::new()
            .path("/files")
            .method("get")
            .response_type("static")
            .response_path(ResponsePath::Path("./".into())),
    )?;

    tracing::info!(public = %provider.info_str(), "services registered");
    provider.serve().await
}

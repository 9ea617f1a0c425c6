//! Response strategies.
//!
//! Exactly one strategy is chosen per service, at registration time, from
//! its response type:
//!
//! | type | strategy |
//! |---|---|
//! | `static`, `file` | serve files below a root directory |
//! | `html`, `render` | send an HTML file, optionally picked by selectors |
//! | `handler` | hand the raw context to the user handler |
//! | `json`, `text`, `string` | call the user handler with extracted arguments |

use std::path::{Path, PathBuf};

use http::StatusCode;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::Context;
use crate::descriptor::{ParameterSpec, RenderRule, ResponseKind, ResponsePath, ServiceSettings};
use crate::error::{BoxError, FileError, ValidationError};
use crate::extract::extract;
use crate::files;
use crate::handler::{ContextFn, Handler, ServiceFn};
use crate::normalize::DEFAULT_STATIC_ROOT;
use crate::path::WILDCARD_PARAM;
use crate::response::ContentType;

pub(crate) enum Strategy {
    Static { root: PathBuf },
    Render(Option<ResponsePath>),
    Raw(ContextFn),
    Service { handler: ServiceFn, params: Vec<ParameterSpec>, kind: ResponseKind },
}

impl Strategy {
    pub(crate) fn select(settings: &ServiceSettings) -> Result<Self, ValidationError> {
        let kind = settings.response.kind;
        let strategy = match (kind, &settings.handler) {
            (ResponseKind::Static | ResponseKind::File, _) => {
                let root = match &settings.response.path {
                    Some(ResponsePath::Path(p)) => p.as_str(),
                    _ => DEFAULT_STATIC_ROOT,
                };
                Self::Static { root: PathBuf::from(root) }
            }
            (ResponseKind::Html | ResponseKind::Render, _) => {
                Self::Render(settings.response.path.clone())
            }
            (ResponseKind::Handler, Some(Handler::Context(f))) => Self::Raw(f.clone()),
            (ResponseKind::Json | ResponseKind::Text | ResponseKind::String, Some(Handler::Args(f))) => {
                Self::Service {
                    handler: f.clone(),
                    params: settings.input_parameters.clone(),
                    kind,
                }
            }
            (_, handler) => {
                return Err(ValidationError::new(format!(
                    "No usable handler ({}) for response type <{kind}> of service [{}]",
                    handler.as_ref().map_or("none", Handler::kind),
                    settings.summary,
                )));
            }
        };
        Ok(strategy)
    }

    pub(crate) async fn run(&self, ctx: &Context) -> Result<(), BoxError> {
        match self {
            Self::Static { root } => {
                send_static(root, ctx).await;
                Ok(())
            }
            Self::Render(path) => render(path.as_ref(), ctx).await,
            Self::Raw(handler) => handler.call(ctx.clone()).await,
            Self::Service { handler, params, kind } => {
                let args = extract(ctx, params);
                debug!(args = ?args, "extracted input from invocation");
                let value = handler.call(args).await?;
                match (kind, value) {
                    (ResponseKind::Text | ResponseKind::String, Value::String(s)) => ctx.set_text(s),
                    (ResponseKind::Text | ResponseKind::String, other) => ctx.set_json(other),
                    (_, value) => ctx.set_json(wrap_json(value)),
                }
                Ok(())
            }
        }
    }
}

/// Objects and arrays go out as they are; anything else as `{"res": value}`.
pub(crate) fn wrap_json(value: Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => value,
        other => {
            let mut obj = Map::new();
            obj.insert("res".to_owned(), other);
            Value::Object(obj)
        }
    }
}

/// Failures never fail the pipeline: not-found is expected and left to the
/// substrate's 404, anything else is logged.
async fn send_static(root: &Path, ctx: &Context) {
    let relative = ctx.param(WILDCARD_PARAM).unwrap_or_default();
    debug!(file = %relative, "going to send static file");
    match files::read_within(root, &relative).await {
        Ok((path, data)) => {
            ctx.set_bytes(ContentType::from_path(&path), data);
            debug!(file = %path.display(), "sent static file");
        }
        Err(FileError::NotFound { message, .. }) => debug!("{message}"),
        Err(e) => warn!(file = %relative, "error when sending static file: {e}"),
    }
}

async fn render(path: Option<&ResponsePath>, ctx: &Context) -> Result<(), BoxError> {
    match path {
        Some(ResponsePath::Path(file)) => send_html(Path::new(file), ctx).await,
        Some(ResponsePath::Rules(rules)) => {
            for RenderRule { selector, path } in rules {
                if selector.call(ctx.clone()).await {
                    return send_html(Path::new(path), ctx).await;
                }
            }
            debug!(url = %ctx.url(), "no render rule matched, leaving response untouched");
            Ok(())
        }
        None => Ok(()),
    }
}

async fn send_html(file: &Path, ctx: &Context) -> Result<(), BoxError> {
    match files::read_text(file).await {
        Ok(html) => {
            ctx.set_html(html);
            Ok(())
        }
        Err(FileError::NotFound { status, message }) => {
            debug!("{message}");
            ctx.set_status(status);
            ctx.set_text(message);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::RawServiceDescriptor;
    use crate::handler::{Args, Selector};
    use crate::normalize::normalize;
    use crate::response::Body;
    use serde_json::json;

    fn ctx() -> Context {
        Context::builder(http::Method::GET, "/").build()
    }

    #[test]
    fn wraps_scalars_only() {
        assert_eq!(wrap_json(json!(5)), json!({"res": 5}));
        assert_eq!(wrap_json(Value::Null), json!({"res": null}));
        assert_eq!(wrap_json(json!("s")), json!({"res": "s"}));
        assert_eq!(wrap_json(json!({"a": 1})), json!({"a": 1}));
        assert_eq!(wrap_json(json!([1])), json!([1]));
    }

    #[tokio::test]
    async fn text_results_are_sent_verbatim() {
        let raw = RawServiceDescriptor::new()
            .response_type("string")
            .handler(Handler::args(|_: Args| async { Ok::<_, BoxError>("pong") }));
        let strategy = Strategy::select(&normalize(&raw, "/").unwrap()).unwrap();
        let ctx = ctx();
        strategy.run(&ctx).await.unwrap();
        assert_eq!(ctx.response().body(), Some(&Body::Text("pong".into())));
    }

    #[tokio::test]
    async fn render_rules_pick_first_match() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.html");
        let b = dir.path().join("b.html");
        std::fs::write(&a, "<p>a</p>").unwrap();
        std::fs::write(&b, "<p>b</p>").unwrap();

        let rules = vec![
            RenderRule::new(Selector::new(|ctx: Context| async move { ctx.get("admin").is_some() }), a.display().to_string()),
            RenderRule::new(Selector::new(|_| async { true }), b.display().to_string()),
        ];
        let ctx = ctx();
        render(Some(&ResponsePath::Rules(rules.clone())), &ctx).await.unwrap();
        assert_eq!(ctx.response().body(), Some(&Body::Html("<p>b</p>".into())));

        let admin = Context::builder(http::Method::GET, "/").build();
        admin.set("admin", json!(true));
        render(Some(&ResponsePath::Rules(rules)), &admin).await.unwrap();
        assert_eq!(admin.response().body(), Some(&Body::Html("<p>a</p>".into())));
    }

    #[tokio::test]
    async fn render_without_match_is_a_no_op() {
        let rules = vec![RenderRule::new(Selector::new(|_| async { false }), "unused.html")];
        let ctx = ctx();
        render(Some(&ResponsePath::Rules(rules)), &ctx).await.unwrap();
        assert_eq!(ctx.response().body(), None);
    }

    #[tokio::test]
    async fn missing_template_is_a_404_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx();
        send_html(&dir.path().join("gone.html"), &ctx).await.unwrap();
        assert_eq!(ctx.status(), StatusCode::NOT_FOUND);
        assert!(matches!(ctx.response().body(), Some(Body::Text(m)) if m.starts_with("File not found")));
    }
}

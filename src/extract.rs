//! Parameter extraction.
//!
//! Builds the positional argument list of a service handler from the request
//! context. One argument per parameter spec, in declared order:
//!
//! | position | empty name | named |
//! |---|---|---|
//! | `ctx` | context snapshot | context field |
//! | `session` | session (`null` if none) | session field (`null` if none / not an object) |
//! | `body` | parsed body | body field |
//! | `files` | files bucket | file entry |
//! | `header` | all headers | one header, case-insensitive |
//! | `query` | query bucket | query field |
//! | `cookies` | all cookies | one cookie |
//!
//! Missing named fields are `null`.

use serde_json::Value;

use crate::context::Context;
use crate::descriptor::{ParameterSpec, Position, RawParameterSpec};
use crate::error::ExtractionError;
use crate::handler::Args;

/// Extracts arguments for canonical specs. Always succeeds.
pub fn extract(ctx: &Context, specs: &[ParameterSpec]) -> Args {
    Args::new(specs.iter().map(|spec| extract_one(ctx, spec.position, &spec.name)).collect())
}

/// Extracts arguments for specs that have not been normalized.
///
/// Missing tokens are not defaulted here: a spec without a position, or with
/// a name that is not a string, is malformed.
pub fn extract_raw(ctx: &Context, specs: &[RawParameterSpec]) -> Result<Args, ExtractionError> {
    let mut args = Vec::with_capacity(specs.len());
    for spec in specs {
        let token = spec.position.as_deref().ok_or(ExtractionError::MalformedParameterSpec)?;
        let name = match &spec.name {
            None => "",
            Some(Value::String(name)) => name.as_str(),
            Some(_) => return Err(ExtractionError::MalformedParameterSpec),
        };
        let position: Position = token
            .parse()
            .map_err(|()| ExtractionError::UnsupportedPosition(token.to_owned()))?;
        args.push(extract_one(ctx, position, name));
    }
    Ok(Args::new(args))
}

fn extract_one(ctx: &Context, position: Position, name: &str) -> Value {
    let whole = name.is_empty();
    match position {
        Position::Ctx if whole => ctx.to_value(),
        Position::Ctx => ctx.field(name),
        Position::Session => match ctx.session() {
            Some(session) if whole => session,
            Some(Value::Object(mut fields)) => fields.remove(name).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        Position::Body => field_or_whole(ctx.body(), name),
        Position::Files => field_or_whole(ctx.files(), name),
        Position::Header if whole => ctx.headers(),
        Position::Header => ctx.header(name).map_or(Value::Null, Value::String),
        Position::Query => field_or_whole(ctx.query(), name),
        Position::Cookies if whole => ctx.cookies(),
        Position::Cookies => ctx.cookie(name).map_or(Value::Null, Value::String),
    }
}

fn field_or_whole(bucket: Value, name: &str) -> Value {
    if name.is_empty() {
        return bucket;
    }
    match bucket {
        Value::Object(mut fields) => fields.remove(name).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParamType;
    use serde_json::json;

    fn spec(position: Position, name: &str) -> ParameterSpec {
        ParameterSpec { position, param_type: ParamType::Object, name: name.to_owned() }
    }

    fn ctx() -> Context {
        Context::builder(http::Method::POST, "/x?q=x")
            .header("X-Trace", "abc")
            .header("cookie", "sid=s1")
            .body(json!({"x": 4, "y": [1, 2]}))
            .files(json!({"avatar": {"size": 10}}))
            .build()
    }

    #[test]
    fn query_whole_and_named() {
        let ctx = ctx();
        assert_eq!(extract(&ctx, &[spec(Position::Query, "")]).into_inner(), vec![json!({"q": "x"})]);
        assert_eq!(extract(&ctx, &[spec(Position::Query, "q")]).into_inner(), vec![json!("x")]);
    }

    #[test]
    fn keeps_declared_order() {
        let ctx = ctx();
        let args = extract(
            &ctx,
            &[
                spec(Position::Body, "y"),
                spec(Position::Header, "x-trace"),
                spec(Position::Cookies, "sid"),
                spec(Position::Files, "avatar"),
                spec(Position::Body, "missing"),
            ],
        );
        assert_eq!(
            args.into_inner(),
            vec![json!([1, 2]), json!("abc"), json!("s1"), json!({"size": 10}), Value::Null],
        );
    }

    #[test]
    fn session_absent_or_not_an_object_is_null() {
        let ctx = ctx();
        assert_eq!(extract(&ctx, &[spec(Position::Session, "")])[0], Value::Null);
        assert_eq!(extract(&ctx, &[spec(Position::Session, "user")])[0], Value::Null);

        ctx.set_session(json!("opaque"));
        assert_eq!(extract(&ctx, &[spec(Position::Session, "user")])[0], Value::Null);

        ctx.set_session(json!({"user": "alice"}));
        assert_eq!(extract(&ctx, &[spec(Position::Session, "user")])[0], json!("alice"));
    }

    #[test]
    fn ctx_position_reads_fields_and_snapshot() {
        let ctx = ctx();
        ctx.set("tenant", json!("acme"));
        let args = extract(&ctx, &[spec(Position::Ctx, "tenant"), spec(Position::Ctx, "")]);
        assert_eq!(args[0], json!("acme"));
        assert_eq!(args[1]["path"], json!("/x"));
        assert_eq!(args[1]["body"]["x"], json!(4));
    }

    #[test]
    fn whole_cookie_and_header_buckets() {
        let ctx = ctx();
        let args = extract(&ctx, &[spec(Position::Cookies, ""), spec(Position::Header, "")]);
        assert_eq!(args[0], json!({"sid": "s1"}));
        assert_eq!(args[1]["x-trace"], json!("abc"));
    }

    #[test]
    fn raw_specs_reject_bad_shapes() {
        let ctx = ctx();
        assert_eq!(
            extract_raw(&ctx, &[RawParameterSpec::whole("stdin")]),
            Err(ExtractionError::UnsupportedPosition("stdin".into())),
        );
        assert_eq!(
            extract_raw(&ctx, &[RawParameterSpec::default()]),
            Err(ExtractionError::MalformedParameterSpec),
        );
        let bad_name = RawParameterSpec { position: Some("body".into()), param_type: None, name: Some(json!(1)) };
        assert_eq!(extract_raw(&ctx, &[bad_name]), Err(ExtractionError::MalformedParameterSpec));

        let ok = extract_raw(&ctx, &[RawParameterSpec::named("BODY", "x")]).unwrap();
        assert_eq!(ok[0], json!(4));
    }
}

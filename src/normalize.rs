//! Settings normalization.
//!
//! Pure transformation from a [`RawServiceDescriptor`] to a canonical
//! [`ServiceSettings`]. The raw descriptor is never modified; each step builds
//! new values from the previous ones.
//!
//! Order of steps:
//! 1. fill absent protocol / method / response type (`http`, `post`, `json`)
//! 2. case-fold and look up every token, rejecting unknown ones
//! 3. join the root and the service path; wildcard file-tree routes
//! 4. default each parameter's position, type and name
//! 5. compute the summary
//!
//! A rejection names the bad value and the summary computed from the raw
//! tokens, so the message still identifies the service.

use std::str::FromStr;

use serde_json::Value;

use crate::descriptor::{
    ParamType, ParameterSpec, Position, Protocol, RawParameterSpec, RawServiceDescriptor,
    ResponseKind, ResponsePath, ResponseSpec, ServiceSettings,
};
use crate::error::ValidationError;
use crate::method::Method;
use crate::path::{ensure_wildcard, join_path};

/// Filesystem root a `static`/`file` service serves when none is given.
pub const DEFAULT_STATIC_ROOT: &str = "./";

/// `PROTOCOL@method:path`.
pub fn summary(protocol: &str, method: &str, path: &str) -> String {
    format!("{}@{method}:{path}", protocol.to_ascii_uppercase())
}

/// Normalizes `raw` against the server `root`.
///
/// Idempotent only under root `/`: the canonical path already carries the
/// root, so normalizing it again against another root prefixes it twice.
pub fn normalize(raw: &RawServiceDescriptor, root: &str) -> Result<ServiceSettings, ValidationError> {
    let protocol_token = token_or(raw.protocol.as_deref(), Protocol::Http.as_str());
    let method_token = token_or(raw.method.as_deref(), Method::Post.as_str());
    let kind_token = token_or(
        raw.response.as_ref().and_then(|r| r.kind.as_deref()),
        ResponseKind::Json.as_str(),
    );
    let joined = join_path(root, raw.path.as_deref().unwrap_or("/"));
    let pending = summary(protocol_token, method_token, &joined);

    let protocol: Protocol = lookup(protocol_token, "protocol", &pending)?;
    let method: Method = lookup(method_token, "method", &pending)?;
    let kind: ResponseKind = lookup(kind_token, "response type", &pending)?;

    let path = if kind.is_file_tree() { ensure_wildcard(&joined) } else { joined };
    let response_path = match raw.response.as_ref().and_then(|r| r.path.clone()) {
        None if kind.is_file_tree() => Some(ResponsePath::Path(DEFAULT_STATIC_ROOT.to_owned())),
        other => other,
    };

    let input_parameters = match &raw.input_parameters {
        None => vec![ParameterSpec::default()],
        Some(specs) => specs
            .iter()
            .map(|spec| normalize_parameter(spec, &pending))
            .collect::<Result<_, _>>()?,
    };

    let service_summary = summary(protocol.as_str(), method.as_str(), &path);
    check_handler(raw, kind, &service_summary)?;

    Ok(ServiceSettings {
        protocol,
        path,
        method,
        handler: raw.handler.clone(),
        input_parameters,
        response: ResponseSpec { kind, path: response_path },
        middlewares: raw.middlewares.clone(),
        post_processes: raw.post_processes.clone(),
        summary: service_summary,
    })
}

/// Empty tokens count as absent.
fn token_or<'a>(token: Option<&'a str>, default: &'a str) -> &'a str {
    token.filter(|t| !t.is_empty()).unwrap_or(default)
}

fn lookup<T: FromStr>(token: &str, what: &str, summary: &str) -> Result<T, ValidationError> {
    token.parse().map_err(|_| {
        ValidationError::new(format!("Invalid {what} <{token}> for registering service [{summary}]"))
    })
}

fn normalize_parameter(
    spec: &RawParameterSpec,
    summary: &str,
) -> Result<ParameterSpec, ValidationError> {
    let position = token_or(spec.position.as_deref(), Position::Body.as_str());
    let param_type = token_or(spec.param_type.as_deref(), ParamType::Object.as_str());
    let name = match &spec.name {
        None => String::new(),
        Some(Value::String(name)) => name.clone(),
        Some(other) => {
            return Err(ValidationError::new(format!(
                "Malformed parameter definition: name <{other}> is not a string, for registering service [{summary}]"
            )));
        }
    };
    Ok(ParameterSpec {
        position: lookup(position, "parameter position", summary)?,
        param_type: lookup(param_type, "parameter type", summary)?,
        name,
    })
}

fn check_handler(
    raw: &RawServiceDescriptor,
    kind: ResponseKind,
    summary: &str,
) -> Result<(), ValidationError> {
    let Some(expected) = kind.handler_kind() else {
        return Ok(());
    };
    match &raw.handler {
        None => Err(ValidationError::new(format!(
            "Missing handler for registering service [{summary}]"
        ))),
        Some(h) if h.kind() != expected => Err(ValidationError::new(format!(
            "Response type <{kind}> needs a {expected} handler, got a {} handler, for registering service [{summary}]",
            h.kind()
        ))),
        Some(_) => Ok(()),
    }
}

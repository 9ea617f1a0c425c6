//! Error types.
//!
//! Each concern gets its own type so callers can match on what actually went
//! wrong:
//!
//! | Type | When | Reaches a request? |
//! |---|---|---|
//! | [`ValidationError`] | registration | never, the route is not bound |
//! | [`ExtractionError`] | building handler arguments from raw specs | as a handler-stage failure |
//! | [`ServiceError`] | any stage of the request pipeline | through the catcher |
//! | [`FileError`] | file-backed strategies | logged, or answered as 404 |
//! | [`ConfigError`] | loading provider settings | never |

use std::fmt;

use http::StatusCode;
use serde_json::{Value, json};

use crate::pipeline::Stage;

/// A boxed, thread-safe error. Handlers and middleware may fail with any
/// error type that converts into this.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type of [`Server::serve`](crate::Server::serve) and other
/// infrastructure operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ── Registration ──────────────────────────────────────────────────────────────

/// A descriptor was rejected at registration time.
///
/// The message always names the offending value and the service summary so
/// it is useful on its own in a log line.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Handler arguments could not be built from a parameter definition.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Unsupported parameter position: {0}")]
    UnsupportedPosition(String),

    #[error("Parameter definition format error")]
    MalformedParameterSpec,
}

// ── Files ─────────────────────────────────────────────────────────────────────

/// Failure reading a file for a file-backed response strategy.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// Expected and recoverable. Carries the status a caller should answer with.
    #[error("{message}")]
    NotFound { status: StatusCode, message: String },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl FileError {
    pub(crate) fn not_found(path: &std::path::Path) -> Self {
        Self::NotFound {
            status: StatusCode::NOT_FOUND,
            message: format!("File not found: {}", path.display()),
        }
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid size `{0}`, expected e.g. `512kb` or `10mb`")]
    Size(String),

    #[error("unknown protocol `{0}`")]
    Protocol(String),
}

// ── Request time ──────────────────────────────────────────────────────────────

/// Where a [`ServiceError`] was raised.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    /// Inside one stage of a service pipeline.
    Stage(Stage),
    /// Outside any pipeline, caught by the server-wide safe guard.
    ServerWide,
}

impl ErrorOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stage(stage) => stage.as_str(),
            Self::ServerWide => "server wide error catcher",
        }
    }
}

/// A request-time failure, tagged with where it happened.
///
/// This is the value handed to the [`Catcher`](crate::Catcher).
#[derive(Debug)]
pub struct ServiceError {
    origin: ErrorOrigin,
    service: Option<String>,
    status: Option<StatusCode>,
    source: BoxError,
}

impl ServiceError {
    /// The error category. Always `"service provider"`.
    pub const TYPE: &'static str = "service provider";

    pub(crate) fn in_stage(stage: Stage, service: &str, source: BoxError) -> Self {
        let status = status_of(&*source);
        Self { origin: ErrorOrigin::Stage(stage), service: Some(service.to_owned()), status, source }
    }

    pub(crate) fn server_wide(source: BoxError) -> Self {
        let status = status_of(&*source);
        Self { origin: ErrorOrigin::ServerWide, service: None, status, source }
    }

    pub fn origin(&self) -> ErrorOrigin {
        self.origin
    }

    /// The stage name, e.g. `"service custom middlewares"`.
    pub fn sub_type(&self) -> &'static str {
        self.origin.as_str()
    }

    /// Summary of the service whose pipeline failed, if any.
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// HTTP status carried by the underlying error, if it has one.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Unified JSON shape: `{"type", "subType", "message"}`.
    pub fn to_value(&self) -> Value {
        json!({
            "type": Self::TYPE,
            "subType": self.sub_type(),
            "message": self.source.to_string(),
        })
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error in <{}>", Self::TYPE, self.sub_type())?;
        if let Some(service) = &self.service {
            write!(f, " for service [{service}]")?;
        }
        write!(f, ": {}", self.source)
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

fn status_of(err: &(dyn std::error::Error + 'static)) -> Option<StatusCode> {
    match err.downcast_ref::<FileError>() {
        Some(FileError::NotFound { status, .. }) => Some(*status),
        _ => None,
    }
}

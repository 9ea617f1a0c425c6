//! Outgoing response state.
//!
//! Strategies, handlers and catchers never build a wire response directly.
//! They write a [`Body`], a status and headers into the request
//! [`Context`](crate::Context); the substrate turns that into bytes once the
//! whole chain has run.

use std::path::Path;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde_json::Value;
use tracing::warn;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values the substrate knows how to label.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Css,          // text/css
    Csv,          // text/csv
    Gif,          // image/gif
    Html,         // text/html; charset=utf-8
    Ico,          // image/x-icon
    Jpeg,         // image/jpeg
    Js,           // text/javascript
    Json,         // application/json
    OctetStream,  // application/octet-stream  (unknown / binary)
    Pdf,          // application/pdf
    Png,          // image/png
    Svg,          // image/svg+xml
    Text,         // text/plain; charset=utf-8
    Wasm,         // application/wasm
    Webp,         // image/webp
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css         => "text/css; charset=utf-8",
            Self::Csv         => "text/csv",
            Self::Gif         => "image/gif",
            Self::Html        => "text/html; charset=utf-8",
            Self::Ico         => "image/x-icon",
            Self::Jpeg        => "image/jpeg",
            Self::Js          => "text/javascript; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Png         => "image/png",
            Self::Svg         => "image/svg+xml",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Wasm        => "application/wasm",
            Self::Webp        => "image/webp",
            Self::Xml         => "application/xml",
        }
    }

    /// Guesses from the file extension. Unknown extensions are binary.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "css"          => Self::Css,
            "csv"          => Self::Csv,
            "gif"          => Self::Gif,
            "htm" | "html" => Self::Html,
            "ico"          => Self::Ico,
            "jpeg" | "jpg" => Self::Jpeg,
            "js" | "mjs"   => Self::Js,
            "json"         => Self::Json,
            "pdf"          => Self::Pdf,
            "png"          => Self::Png,
            "svg"          => Self::Svg,
            "md" | "txt"   => Self::Text,
            "wasm"         => Self::Wasm,
            "webp"         => Self::Webp,
            "xml"          => Self::Xml,
            _              => Self::OctetStream,
        }
    }
}

// ── Body ──────────────────────────────────────────────────────────────────────

/// Whatever a handler assigned as the outbound payload.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    Json(Value),
    Text(String),
    Html(String),
    Bytes { content_type: ContentType, data: Bytes },
}

impl Body {
    fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => ContentType::Json.as_str(),
            Self::Text(_) => ContentType::Text.as_str(),
            Self::Html(_) => ContentType::Html.as_str(),
            Self::Bytes { content_type, .. } => content_type.as_str(),
        }
    }

    fn into_bytes(self) -> Bytes {
        match self {
            // Serialising a `Value` cannot fail.
            Self::Json(v) => Bytes::from(serde_json::to_vec(&v).unwrap_or_default()),
            Self::Text(s) | Self::Html(s) => Bytes::from(s),
            Self::Bytes { data, .. } => data,
        }
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// Response state accumulated on a context.
///
/// Status defaults to `200 OK` once a body is set and to `404 Not Found`
/// while none is.
#[derive(Clone, Debug, Default)]
pub struct Response {
    pub(crate) status: Option<StatusCode>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Option<Body>,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        match (self.status, &self.body) {
            (Some(code), _) => code,
            (None, Some(_)) => StatusCode::OK,
            (None, None) => StatusCode::NOT_FOUND,
        }
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Case-insensitive response header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any previous value under the same name.
    pub(crate) fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_ascii_lowercase(), value.to_owned()));
    }

    pub(crate) fn set_body(&mut self, body: Body) {
        self.body = Some(body);
    }

    /// Converts to the wire type. `head` drops the payload but keeps its length.
    pub(crate) fn into_http(self, head: bool) -> http::Response<Full<Bytes>> {
        let status = self.status();
        let content_type = self.body.as_ref().map(Body::content_type);
        let payload = self.body.map(Body::into_bytes).unwrap_or_default();

        let mut res = http::Response::new(Full::new(Bytes::new()));
        *res.status_mut() = status;
        let headers = res.headers_mut();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(ct));
        }
        for (name, value) in &self.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                (Ok(n), Ok(v)) => {
                    headers.insert(n, v);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(payload.len()));
        if !head {
            *res.body_mut() = Full::new(payload);
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::json;

    #[test]
    fn status_follows_body() {
        let mut res = Response::default();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        res.set_body(Body::Text("hi".into()));
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn json_body_is_serialised_with_content_type() {
        let mut res = Response::default();
        res.set_body(Body::Json(json!({"res": 5})));
        let http = res.into_http(false);
        assert_eq!(http.headers()[CONTENT_TYPE], "application/json");
        let bytes = http.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#"{"res":5}"#);
    }

    #[test]
    fn explicit_content_type_header_wins() {
        let mut res = Response::default();
        res.set_header("Content-Type", "text/markdown");
        res.set_body(Body::Text("# hi".into()));
        let http = res.into_http(false);
        assert_eq!(http.headers()[CONTENT_TYPE], "text/markdown");
    }

    #[test]
    fn guesses_content_type_from_extension() {
        assert_eq!(ContentType::from_path(Path::new("a/b.PNG")), ContentType::Png);
        assert_eq!(ContentType::from_path(Path::new("index.html")), ContentType::Html);
        assert_eq!(ContentType::from_path(Path::new("blob")), ContentType::OctetStream);
    }
}

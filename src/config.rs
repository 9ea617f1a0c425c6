//! Provider configuration.
//!
//! [`ProviderSettings`] is what a caller writes: every field optional, loadable
//! from TOML. [`ProviderSettings::resolve`] merges it over
//! [`ServerSettings::default`] into the settings the provider runs with.
//!
//! Precedence is explicit value over default, field by field; the nested
//! `body_parser` and `public` tables merge per field as well. Two fields
//! fall back to other resolved values instead of their own default:
//! `public.port` and `public.protocol` take the server's `port` and
//! `protocol`.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! root = "/api"
//! headers = { "x-powered-by" = "courier" }
//!
//! [body_parser]
//! json_limit = "1mb"
//!
//! [public]
//! host = "api.example.com"
//! port = 443
//! protocol = "https"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::descriptor::Protocol;
use crate::error::ConfigError;
use crate::handler::{Catcher, ContextFn};
use crate::path::validate_root;

// ── Resolved settings ─────────────────────────────────────────────────────────

/// Request body size limits, in bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BodyParserSettings {
    pub json_limit: usize,
    pub form_limit: usize,
    pub text_limit: usize,
}

impl Default for BodyParserSettings {
    fn default() -> Self {
        Self { json_limit: 10 * MB, form_limit: 10 * MB, text_limit: 10 * MB }
    }
}

/// How the provider is reached from outside, e.g. behind a proxy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublicInfo {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub root: String,
}

impl fmt::Display for PublicInfo {
    /// `HTTP://127.0.0.1:80`, with the root appended when it is not `/`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol.as_str().to_ascii_uppercase(), self.host, self.port)?;
        if self.root != "/" {
            f.write_str(&self.root)?;
        }
        Ok(())
    }
}

/// The settings a provider runs with.
#[derive(Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    /// Prefix of every service path. Always sanitised.
    pub root: String,
    /// `None` leaves request bodies unparsed (`null`).
    pub body_parser: Option<BodyParserSettings>,
    /// Catch errors escaping a route and hand them to the catcher.
    pub safe_guard: bool,
    /// Log every request with its status and duration.
    pub syslog: bool,
    /// Headers set on every response.
    pub headers: Vec<(String, String)>,
    pub public: PublicInfo,
    pub catcher: Option<Catcher>,
    /// Run for every request before routing.
    pub middlewares: Vec<ContextFn>,
    /// Run for every request after the matched route, as its continuation.
    pub post_processes: Vec<ContextFn>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 80,
            protocol: Protocol::Http,
            root: "/".to_owned(),
            body_parser: Some(BodyParserSettings::default()),
            safe_guard: true,
            syslog: true,
            headers: Vec::new(),
            public: PublicInfo {
                protocol: Protocol::Http,
                host: "127.0.0.1".to_owned(),
                port: 80,
                root: "/".to_owned(),
            },
            catcher: Some(Catcher::respond()),
            middlewares: Vec::new(),
            post_processes: Vec::new(),
        }
    }
}

impl ServerSettings {
    pub fn catcher(mut self, catcher: Option<Catcher>) -> Self {
        self.catcher = catcher;
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

    /// `host:port` to listen on.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("protocol", &self.protocol)
            .field("root", &self.root)
            .field("body_parser", &self.body_parser)
            .field("safe_guard", &self.safe_guard)
            .field("syslog", &self.syslog)
            .field("headers", &self.headers)
            .field("public", &self.public)
            .field("catcher", &self.catcher.is_some())
            .field("middlewares", &self.middlewares.len())
            .field("post_processes", &self.post_processes.len())
            .finish()
    }
}

// ── Partial settings ──────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BodyParserOptions {
    pub json_limit: Option<String>,
    pub form_limit: Option<String>,
    pub text_limit: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublicOptions {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub root: Option<String>,
}

/// Caller-provided settings. Absent fields take defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub root: Option<String>,
    /// `false` disables body parsing.
    pub body_parser_enabled: Option<bool>,
    pub body_parser: Option<BodyParserOptions>,
    pub safe_guard: Option<bool>,
    pub syslog: Option<bool>,
    pub headers: Option<BTreeMap<String, String>>,
    pub public: Option<PublicOptions>,
}

impl ProviderSettings {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Merges over [`ServerSettings::default`].
    pub fn resolve(self) -> Result<ServerSettings, ConfigError> {
        let defaults = ServerSettings::default();

        let protocol = match self.protocol {
            Some(p) => parse_protocol(&p)?,
            None => defaults.protocol,
        };
        let port = self.port.unwrap_or(defaults.port);

        let body_parser = match self.body_parser_enabled {
            Some(false) => None,
            _ => {
                let opts = self.body_parser.unwrap_or_default();
                let base = BodyParserSettings::default();
                Some(BodyParserSettings {
                    json_limit: size_or(opts.json_limit.as_deref(), base.json_limit)?,
                    form_limit: size_or(opts.form_limit.as_deref(), base.form_limit)?,
                    text_limit: size_or(opts.text_limit.as_deref(), base.text_limit)?,
                })
            }
        };

        let public_opts = self.public.unwrap_or_default();
        let public = PublicInfo {
            protocol: match public_opts.protocol {
                Some(p) => parse_protocol(&p)?,
                None => protocol,
            },
            host: public_opts.host.unwrap_or(defaults.public.host),
            port: public_opts.port.unwrap_or(port),
            root: validate_root(public_opts.root.as_deref()),
        };

        Ok(ServerSettings {
            host: self.host.unwrap_or(defaults.host),
            port,
            protocol,
            root: validate_root(self.root.as_deref()),
            body_parser,
            safe_guard: self.safe_guard.unwrap_or(defaults.safe_guard),
            syslog: self.syslog.unwrap_or(defaults.syslog),
            headers: self.headers.map(|h| h.into_iter().collect()).unwrap_or(defaults.headers),
            public,
            catcher: defaults.catcher,
            middlewares: defaults.middlewares,
            post_processes: defaults.post_processes,
        })
    }
}

fn parse_protocol(token: &str) -> Result<Protocol, ConfigError> {
    token.parse().map_err(|()| ConfigError::Protocol(token.to_owned()))
}

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

fn size_or(value: Option<&str>, default: usize) -> Result<usize, ConfigError> {
    value.map_or(Ok(default), parse_size)
}

/// Parses `"512"`, `"64kb"`, `"10mb"`, `"1gb"` (case-insensitive) into bytes.
pub fn parse_size(s: &str) -> Result<usize, ConfigError> {
    let lower = s.trim().to_ascii_lowercase();
    let (digits, unit) = match lower.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => lower.split_at(i),
        None => (lower.as_str(), ""),
    };
    let multiplier = match unit.trim() {
        "" | "b" => 1,
        "kb" => KB,
        "mb" => MB,
        "gb" => GB,
        _ => return Err(ConfigError::Size(s.to_owned())),
    };
    digits
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| ConfigError::Size(s.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_settings_resolve_to_defaults() {
        let s = ProviderSettings::default().resolve().unwrap();
        assert_eq!(s.bind_addr(), "0.0.0.0:80");
        assert_eq!(s.root, "/");
        assert_eq!(s.body_parser, Some(BodyParserSettings::default()));
        assert!(s.safe_guard && s.syslog);
        assert!(s.catcher.is_some());
        assert_eq!(s.public.to_string(), "HTTP://127.0.0.1:80");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let s = ProviderSettings::from_toml_str(
            r#"
            port = 8080
            protocol = "HTTPS"
            root = "api//v1/"
            syslog = false
            headers = { "x-powered-by" = "courier" }

            [body_parser]
            json_limit = "1mb"

            [public]
            host = "api.example.com"
            root = "/gw"
            "#,
        )
        .unwrap()
        .resolve()
        .unwrap();

        assert_eq!(s.port, 8080);
        assert_eq!(s.protocol, Protocol::Https);
        assert_eq!(s.root, "/api/v1");
        assert!(!s.syslog);
        assert_eq!(s.headers, vec![("x-powered-by".to_owned(), "courier".to_owned())]);
        let parser = s.body_parser.unwrap();
        assert_eq!(parser.json_limit, MB);
        assert_eq!(parser.form_limit, 10 * MB);
        assert_eq!(s.public.port, 8080);
        assert_eq!(s.public.protocol, Protocol::Https);
        assert_eq!(s.public.to_string(), "HTTPS://api.example.com:8080/gw");
    }

    #[test]
    fn body_parser_can_be_disabled() {
        let s = ProviderSettings { body_parser_enabled: Some(false), ..Default::default() }
            .resolve()
            .unwrap();
        assert_eq!(s.body_parser, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ProviderSettings::from_toml_str("colour = 1").is_err());
        let bad_size = ProviderSettings {
            body_parser: Some(BodyParserOptions { text_limit: Some("lots".into()), ..Default::default() }),
            ..Default::default()
        };
        assert!(matches!(bad_size.resolve(), Err(ConfigError::Size(s)) if s == "lots"));
        let bad_protocol = ProviderSettings { protocol: Some("ftp".into()), ..Default::default() };
        assert!(matches!(bad_protocol.resolve(), Err(ConfigError::Protocol(p)) if p == "ftp"));
    }

    #[test]
    fn sizes_parse_with_units() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("64KB").unwrap(), 64 * KB);
        assert_eq!(parse_size("10mb").unwrap(), 10 * MB);
        assert_eq!(parse_size("2 gb").unwrap(), 2 * GB);
        assert!(parse_size("mb").is_err());
        assert!(parse_size("3tb").is_err());
    }
}

//! HTTP method as a typed enum.
//!
//! Only the methods a service may be registered under. Requests arriving with
//! any other method never match a route and are answered by the substrate.

use std::fmt;
use std::str::FromStr;

/// A method a service can be bound to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Delete,
    Get,
    Head,
    Options,
    Post,
    Put,
}

impl Method {
    pub const ALL: [Self; 6] =
        [Self::Delete, Self::Get, Self::Head, Self::Options, Self::Post, Self::Put];

    /// Canonical lower-case token used in descriptors and summaries (`"get"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete  => "delete",
            Self::Get     => "get",
            Self::Head    => "head",
            Self::Options => "options",
            Self::Post    => "post",
            Self::Put     => "put",
        }
    }

    /// Uppercase wire representation (`"GET"`).
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Post    => "POST",
            Self::Put     => "PUT",
        }
    }

    pub(crate) fn from_http(method: &http::Method) -> Option<Self> {
        match *method {
            http::Method::DELETE  => Some(Self::Delete),
            http::Method::GET     => Some(Self::Get),
            http::Method::HEAD    => Some(Self::Head),
            http::Method::OPTIONS => Some(Self::Options),
            http::Method::POST    => Some(Self::Post),
            http::Method::PUT     => Some(Self::Put),
            _                     => None,
        }
    }
}

/// Case-insensitive: `"GET"`, `"get"` and `"Get"` all parse.
impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delete"  => Ok(Self::Delete),
            "get"     => Ok(Self::Get),
            "head"    => Ok(Self::Head),
            "options" => Ok(Self::Options),
            "post"    => Ok(Self::Post),
            "put"     => Ok(Self::Put),
            _         => Err(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any_case() {
        assert_eq!("GET".parse(), Ok(Method::Get));
        assert_eq!("Options".parse(), Ok(Method::Options));
        assert_eq!("delete".parse(), Ok(Method::Delete));
        assert_eq!("fetch".parse::<Method>(), Err(()));
    }

    #[test]
    fn maps_wire_methods() {
        assert_eq!(Method::from_http(&http::Method::PUT), Some(Method::Put));
        assert_eq!(Method::from_http(&http::Method::PATCH), None);
    }
}

//! Route path helpers.
//!
//! Service paths are plain strings in descriptors (`/users/:id`, `/assets/*`).
//! These helpers canonicalise them and translate them to the radix-tree
//! syntax the route table understands.

/// Name of the catch-all parameter a trailing `*` is bound to.
pub(crate) const WILDCARD_PARAM: &str = "__wildcard";

/// Ensures a leading `/`. An absent or empty path becomes `/`.
pub fn validate_path(path: Option<&str>) -> String {
    match path {
        None | Some("") => "/".to_owned(),
        Some(p) if p.starts_with('/') => p.to_owned(),
        Some(p) => format!("/{p}"),
    }
}

/// Joins a root prefix and a service path, collapsing repeated separators.
///
/// `join_path("/a/", "/b")`, `join_path("/a", "b")` and
/// `join_path("/a//", "//b")` all yield `/a/b`.
pub fn join_path(root: &str, path: &str) -> String {
    let joined = format!("{root}{}", validate_path(Some(path)));
    collapse_slashes(&joined)
}

/// Sanitises a server root: leading `/`, no repeated `/`, no `*`, `|` or `:`,
/// and no trailing `/` unless the root is `/` itself.
pub fn validate_root(root: Option<&str>) -> String {
    let cleaned: String = collapse_slashes(&validate_path(root))
        .chars()
        .filter(|c| !matches!(c, '*' | '|' | ':'))
        .collect();
    match cleaned.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed.to_owned(),
        _ => cleaned,
    }
}

/// Ends `path` in a single wildcard segment, unless it already ends in `*`.
pub fn ensure_wildcard(path: &str) -> String {
    if path.ends_with('*') {
        path.to_owned()
    } else if path.ends_with('/') {
        format!("{path}*")
    } else {
        format!("{path}/*")
    }
}

fn collapse_slashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Translates a service path to the route-table patterns it is bound under.
///
/// `:name` segments become `{name}` parameters. A trailing `*` becomes a
/// catch-all, bound twice so the bare prefix (`/assets/`) matches as well as
/// anything below it (`/assets/{*__wildcard}`). Literal braces are escaped.
pub(crate) fn route_patterns(path: &str) -> Vec<String> {
    let escaped = path.replace('{', "{{").replace('}', "}}");
    let mut segments: Vec<String> = escaped
        .split('/')
        .map(|seg| match seg.strip_prefix(':') {
            Some(name) if !name.is_empty() => format!("{{{name}}}"),
            _ => seg.to_owned(),
        })
        .collect();

    let Some(last) = segments.last_mut() else {
        return vec!["/".to_owned()];
    };
    let Some(prefix) = last.strip_suffix('*') else {
        return vec![segments.join("/")];
    };

    let prefix = prefix.to_owned();
    last.clear();
    let base = segments.join("/");
    let bare = format!("{base}{prefix}");
    vec![bare.clone(), format!("{bare}{{*{WILDCARD_PARAM}}}")]
}

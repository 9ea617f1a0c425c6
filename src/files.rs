//! Filesystem access for file-backed responses.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;

use crate::error::FileError;

/// Reads a UTF-8 file. A missing file is [`FileError::NotFound`].
pub async fn read_text(path: &Path) -> Result<String, FileError> {
    tokio::fs::read_to_string(path).await.map_err(|e| classify(e, path))
}

/// Reads `relative` from inside `root`.
///
/// Anything that would leave `root` (`..`, absolute segments) or name a hidden
/// file counts as not found, as does a directory. `relative` must already be
/// percent-decoded so encoded segments get the same checks.
pub async fn read_within(root: &Path, relative: &str) -> Result<(PathBuf, Bytes), FileError> {
    let path = resolve_within(root, relative)
        .ok_or_else(|| FileError::not_found(&root.join(relative.trim_start_matches('/'))))?;
    let meta = tokio::fs::metadata(&path).await.map_err(|e| classify(e, &path))?;
    if !meta.is_file() {
        return Err(FileError::not_found(&path));
    }
    let data = tokio::fs::read(&path).await.map_err(|e| classify(e, &path))?;
    Ok((path, Bytes::from(data)))
}

pub(crate) fn resolve_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    let mut pushed = false;
    for component in Path::new(relative.trim_start_matches('/')).components() {
        match component {
            Component::Normal(name) => {
                if name.to_str().is_none_or(|n| n.starts_with('.')) {
                    return None;
                }
                out.push(name);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    pushed.then_some(out)
}

fn classify(err: std::io::Error, path: &Path) -> FileError {
    match err.kind() {
        ErrorKind::NotFound => FileError::not_found(path),
        _ => FileError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_inside_root_only() {
        let root = Path::new("/srv/www");
        assert_eq!(resolve_within(root, "/img/a.png"), Some(PathBuf::from("/srv/www/img/a.png")));
        assert_eq!(resolve_within(root, "./a.txt"), Some(PathBuf::from("/srv/www/a.txt")));
        assert_eq!(resolve_within(root, "/../etc/passwd"), None);
        assert_eq!(resolve_within(root, "/.env"), None);
        assert_eq!(resolve_within(root, "/"), None);
        assert_eq!(resolve_within(root, ""), None);
    }

    #[tokio::test]
    async fn missing_file_is_not_found_with_404() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_text(&dir.path().join("nope.html")).await.unwrap_err();
        match err {
            FileError::NotFound { status, message } => {
                assert_eq!(status, http::StatusCode::NOT_FOUND);
                assert!(message.starts_with("File not found: "));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn reads_files_within_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/site.css"), "body{}").unwrap();

        let (path, data) = read_within(dir.path(), "/css/site.css").await.unwrap();
        assert!(path.ends_with("css/site.css"));
        assert_eq!(&data[..], b"body{}");

        assert!(matches!(read_within(dir.path(), "/css").await, Err(FileError::NotFound { .. })));
    }
}

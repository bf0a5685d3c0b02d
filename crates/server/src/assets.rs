//! Read-only static file mounts for generated reports and crop images.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

/// A directory served under a URL prefix.
#[derive(Debug, Clone)]
pub struct AssetMount {
    root: PathBuf,
}

/// A file read from a mount
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl AssetMount {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a request path onto the mount.
    ///
    /// Only plain name components are accepted; `..`, absolute paths and
    /// drive prefixes yield `None`.
    pub fn resolve(&self, requested: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        let mut depth = 0;
        for component in Path::new(requested).components() {
            match component {
                Component::Normal(name) => {
                    path.push(name);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        (depth > 0).then_some(path)
    }

    /// Read a file from the mount. Missing files and anything that resolves
    /// outside the root (for example through a symlink) give `None`.
    pub async fn load(&self, requested: &str) -> Option<Asset> {
        let candidate = self.resolve(requested)?;

        let root = tokio::fs::canonicalize(&self.root).await.ok()?;
        let resolved = tokio::fs::canonicalize(&candidate).await.ok()?;
        if !resolved.starts_with(&root) {
            debug!("refusing {:?}: resolves outside {:?}", requested, root);
            return None;
        }

        let metadata = tokio::fs::metadata(&resolved).await.ok()?;
        if !metadata.is_file() {
            return None;
        }

        let bytes = tokio::fs::read(&resolved).await.ok()?;
        Some(Asset {
            content_type: content_type_for(&resolved),
            bytes,
        })
    }
}

/// Guess a content type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        Some("html") => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    }
}

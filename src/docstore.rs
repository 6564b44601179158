//! Filesystem document body store.
//!
//! Resolves index paths against `kb_root`. Absolute paths and paths that
//! climb out of the root are treated as missing documents, never read.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use kb_answer_core::error::FetchError;
use kb_answer_core::services::DocumentStore;

#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `path` onto the root if it stays inside it.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path);
        let mut depth = 0usize;
        for component in relative.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::CurDir => {}
                Component::ParentDir => depth = depth.checked_sub(1)?,
                Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        (depth > 0).then(|| self.root.join(relative))
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn fetch(&self, path: &str) -> Result<String, FetchError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                return Err(FetchError::Unavailable(format!(
                    "knowledge base root is not a directory: {}",
                    self.root.display()
                )))
            }
        }

        let Some(full) = self.resolve(path) else {
            tracing::warn!(path, "rejected document path outside the knowledge base root");
            return Err(FetchError::NotFound(path.to_string()));
        };

        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FetchError::NotFound(path.to_string())),
            Err(e) => Err(FetchError::Unreadable {
                path: path.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

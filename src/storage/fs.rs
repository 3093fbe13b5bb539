//! Filesystem [`ObjectStore`] rooted at a single directory.
//!
//! Objects land at `{root}/{bucket}/{prefix}/{filename}` and are addressed
//! by `file://` URIs over the canonicalized root, so a URI minted by one
//! process resolves in another regardless of working directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::{ObjectKey, ObjectStore, ObjectStoreError};

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Creates the root directory if needed and canonicalizes it.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, ObjectStoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let root = fs::canonicalize(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &ObjectKey) -> PathBuf {
        let mut path = self.root.join(&key.bucket);
        if !key.prefix.is_empty() {
            path.push(&key.prefix);
        }
        path.push(&key.filename);
        path
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &ObjectKey, bytes: &[u8]) -> Result<String, ObjectStoreError> {
        key.validate()?;
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(format!("file://{}", path.display()))
    }

    async fn get(&self, uri: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = uri
            .strip_prefix("file://")
            .ok_or_else(|| ObjectStoreError::UnsupportedUri {
                uri: uri.to_string(),
            })?;
        let path = Path::new(path);
        // Only serve objects this store wrote: the path must sit under the
        // canonical root and must not smuggle in relative components, since
        // `starts_with` is purely lexical.
        let relative = path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir));
        if relative || !path.starts_with(&self.root) {
            return Err(ObjectStoreError::UnsupportedUri {
                uri: uri.to_string(),
            });
        }
        match fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound {
                    uri: uri.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}

//! Object storage for uploaded documents.
//!
//! Uploads are written under a bucket/prefix namespace and addressed by the
//! URI that [`ObjectStore::put`] returns; chat requests later hand that URI
//! back as their `data_source`. The filesystem backend in
//! [`fs`](crate::storage::fs) is the default; anything speaking the same
//! trait (an S3 gateway, a blob cache) can replace it.

pub mod fs;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

pub use fs::FsObjectStore;

/// Where an object lives inside a store: `{bucket}/{prefix}/{filename}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    pub bucket: String,
    pub prefix: String,
    pub filename: String,
}

impl ObjectKey {
    pub fn new(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            filename: filename.into(),
        }
    }

    /// Checks every component is a single, safe path segment. Filenames come
    /// straight from client uploads, so traversal sequences and separators
    /// are rejected rather than normalized.
    pub fn validate(&self) -> Result<(), ObjectStoreError> {
        segment_ok(&self.bucket, "bucket", false)?;
        segment_ok(&self.prefix, "prefix", true)?;
        segment_ok(&self.filename, "filename", false)?;
        Ok(())
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{}/{}", self.bucket, self.filename)
        } else {
            write!(f, "{}/{}/{}", self.bucket, self.prefix, self.filename)
        }
    }
}

fn segment_ok(segment: &str, what: &str, may_be_empty: bool) -> Result<(), ObjectStoreError> {
    if segment.is_empty() {
        if may_be_empty {
            return Ok(());
        }
        return Err(ObjectStoreError::InvalidKey {
            reason: format!("{what} must not be empty"),
        });
    }
    if segment == "." || segment == ".." {
        return Err(ObjectStoreError::InvalidKey {
            reason: format!("{what} must not be a relative path component"),
        });
    }
    if segment.contains(['/', '\\', '\0']) {
        return Err(ObjectStoreError::InvalidKey {
            reason: format!("{what} must not contain path separators"),
        });
    }
    Ok(())
}

#[derive(Debug, Error, Diagnostic)]
pub enum ObjectStoreError {
    #[error("invalid object key: {reason}")]
    #[diagnostic(code(docparley::storage::invalid_key))]
    InvalidKey { reason: String },

    #[error("no object stored at {uri}")]
    #[diagnostic(
        code(docparley::storage::not_found),
        help("Upload the document first; chat requests must reference the returned file_path.")
    )]
    NotFound { uri: String },

    #[error("unsupported storage uri {uri:?}")]
    #[diagnostic(code(docparley::storage::unsupported_uri))]
    UnsupportedUri { uri: String },

    #[error("object storage I/O failed: {0}")]
    #[diagnostic(code(docparley::storage::io))]
    Io(#[from] std::io::Error),
}

/// Stores and retrieves immutable document blobs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `bytes` at `key`, overwriting any previous object there, and
    /// returns the canonical URI clients use to reference it.
    async fn put(&self, key: &ObjectKey, bytes: &[u8]) -> Result<String, ObjectStoreError>;

    /// Fetches the object a previous `put` returned `uri` for.
    async fn get(&self, uri: &str) -> Result<Vec<u8>, ObjectStoreError>;
}

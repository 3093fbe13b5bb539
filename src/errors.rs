//! Request-level error taxonomy.
//!
//! Every failure inside a chat or upload request collapses into one of four
//! classes before it reaches the HTTP boundary:
//!
//! - [`ServiceError::Validation`] — malformed payload, rejected before any
//!   external call.
//! - [`ServiceError::UnsupportedFormat`] — the referenced document cannot be
//!   read; terminal and user-visible.
//! - [`ServiceError::ExternalService`] — an upstream dependency (model
//!   provider, object storage, conversation store) failed. Nothing is
//!   retried here; callers re-submit.
//! - [`ServiceError::EmbeddingDimensionMismatch`] — an internal invariant
//!   broke; logged in full, reported generically.
//!
//! Module-local errors convert into this taxonomy via the `From` impls
//! below, so the answering engine can use `?` throughout.

use miette::Diagnostic;
use thiserror::Error;

use crate::backends::BackendError;
use crate::extract::ExtractError;
use crate::index::IndexError;
use crate::retriever::RetrieverError;
use crate::storage::ObjectStoreError;
use crate::stores::StoreError;

#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("unsupported document: {detail}")]
    #[diagnostic(
        code(docparley::unsupported_format),
        help("Only .pdf and .docx documents can be ingested.")
    )]
    UnsupportedFormat { detail: String },

    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    #[diagnostic(
        code(docparley::dimension_mismatch),
        help("All vectors in one index must come from the same embedding model.")
    )]
    EmbeddingDimensionMismatch { expected: usize, found: usize },

    #[error("{service} failure: {message}")]
    #[diagnostic(code(docparley::external_service))]
    ExternalService {
        service: &'static str,
        message: String,
    },

    #[error("invalid request: {reason}")]
    #[diagnostic(code(docparley::validation))]
    Validation { reason: String },
}

impl ServiceError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn external(service: &'static str, message: impl ToString) -> Self {
        Self::ExternalService {
            service,
            message: message.to_string(),
        }
    }
}

impl From<ExtractError> for ServiceError {
    fn from(err: ExtractError) -> Self {
        Self::UnsupportedFormat {
            detail: err.to_string(),
        }
    }
}

impl From<BackendError> for ServiceError {
    fn from(err: BackendError) -> Self {
        Self::external("model provider", err)
    }
}

impl From<IndexError> for ServiceError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, found } => {
                Self::EmbeddingDimensionMismatch { expected, found }
            }
            IndexError::Backend(err) => err.into(),
            IndexError::Empty => Self::UnsupportedFormat {
                detail: "document produced no indexable chunks".to_string(),
            },
        }
    }
}

impl From<RetrieverError> for ServiceError {
    fn from(err: RetrieverError) -> Self {
        match err {
            RetrieverError::Backend(err) => err.into(),
            RetrieverError::Index(err) => err.into(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        Self::external("conversation store", err)
    }
}

impl From<ObjectStoreError> for ServiceError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::InvalidKey { reason } => Self::Validation { reason },
            ObjectStoreError::UnsupportedUri { uri } => Self::Validation {
                reason: format!("data_source {uri:?} is not a storage uri this service issued"),
            },
            err => Self::external("object storage", err),
        }
    }
}

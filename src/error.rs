//! Unified error surface.
//!
//! One tagged sum for the whole crate so callers can branch on kinds
//! instead of string-matching. Adapter-level failures keep their cause in
//! `Backend::source`; every message carries the operation and URI it
//! belongs to.

use crate::backend::Filesystem;
use crate::uri::Uri;
use std::io::ErrorKind;
use thiserror::Error;

pub type VfsResult<T> = Result<T, VfsError>;

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("unsupported URI scheme: {uri}")]
    UnsupportedScheme { uri: String },

    #[error("{fs} support was not compiled into this build")]
    FeatureNotBuilt { fs: Filesystem },

    #[error("VFS is not initialized")]
    NotInitialized,

    #[error("{op}: not found: {uri}")]
    NotFound { op: &'static str, uri: String },

    #[error("{op}: already exists: {uri}")]
    AlreadyExists { op: &'static str, uri: String },

    #[error("cannot move {old} to {new}: cross-scheme moves are not supported")]
    CrossSchemeUnsupported { old: String, new: String },

    #[error("cannot open {uri}: append is not supported on object stores")]
    AppendUnsupported { uri: String },

    #[error("invalid VFS configuration: {0}")]
    Config(String),

    #[error("{op} failed for {uri}: {source}")]
    Backend {
        op: &'static str,
        uri: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("parallel read error: {first}")]
    ParallelRead { first: String },
}

impl VfsError {
    pub(crate) fn unsupported(uri: &Uri) -> Self {
        VfsError::UnsupportedScheme {
            uri: uri.to_string(),
        }
    }

    pub(crate) fn not_found(op: &'static str, uri: &Uri) -> Self {
        VfsError::NotFound {
            op,
            uri: uri.to_string(),
        }
    }

    pub(crate) fn backend(
        op: &'static str,
        uri: &Uri,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        VfsError::Backend {
            op,
            uri: uri.to_string(),
            source: source.into(),
        }
    }

    /// Map an `io::Error` into the taxonomy, keeping the well-known kinds
    /// distinguishable and folding the rest into `Backend`.
    pub(crate) fn from_io(op: &'static str, uri: &Uri, err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Self::not_found(op, uri),
            ErrorKind::AlreadyExists => VfsError::AlreadyExists {
                op,
                uri: uri.to_string(),
            },
            _ => Self::backend(op, uri, err),
        }
    }
}

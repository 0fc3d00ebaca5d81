//! SpanFS: one URI-addressed interface over heterogeneous storage.
//!
//! A [`Vfs`] routes file and directory operations to the backend named by
//! the URI scheme (`file://`, `hdfs://`, `s3://`) and serves large reads by
//! fanning out range sub-reads across a bounded task pool. Callers address
//! everything by [`Uri`] and never see which backend does the work.
//!
//! HDFS and S3 support are compile-time optional (`hdfs` / `s3` cargo
//! features); [`Vfs::supports_fs`] reports what the running build carries.

#[cfg(not(any(unix, windows)))]
compile_error!("spanfs requires a unix or windows host");

pub(crate) mod backend;
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod uri;
pub(crate) mod vfs;

pub use crate::backend::{FileLock, Filesystem};
pub use crate::config::{HdfsParams, S3Params, S3Scheme, VfsParams};
pub use crate::error::{VfsError, VfsResult};
pub use crate::uri::{Scheme, Uri};
pub use crate::vfs::{Vfs, VfsMode};

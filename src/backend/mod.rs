//! Backend adapters: one per URI scheme, all behind one operation trait.
//!
//! The dispatcher in [`crate::vfs`] resolves a scheme to exactly one of
//! these; adapters never route between each other. Operations a backend
//! cannot express are reported by the dispatcher before the adapter is
//! reached (bucket ops outside S3, locks outside local schemes).

#[cfg(feature = "hdfs")]
pub(crate) mod hdfs;
#[cfg(unix)]
pub(crate) mod posix;
#[cfg(feature = "s3")]
pub(crate) mod s3;
#[cfg(windows)]
pub(crate) mod win;

use crate::error::VfsResult;
use crate::uri::Uri;
use async_trait::async_trait;
use std::fmt;

/// Identifies a storage backend for capability queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filesystem {
    Posix,
    Win,
    Hdfs,
    S3,
}

impl fmt::Display for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Filesystem::Posix => "POSIX",
            Filesystem::Win => "Windows",
            Filesystem::Hdfs => "HDFS",
            Filesystem::S3 => "S3",
        })
    }
}

/// Advisory lock token. Real on local schemes; an inert sentinel on remote
/// ones, where locking is a no-op by contract.
#[derive(Debug)]
pub enum FileLock {
    Local(LocalLock),
    Remote,
}

/// Holds the open handle whose OS-level lock this token represents. The
/// lock is released on `filelock_unlock` (or when the handle drops).
#[derive(Debug)]
pub struct LocalLock {
    pub(crate) file: std::fs::File,
}

/// The operation set every backend implements.
///
/// Adapters classify their own failures (`NotFound` where existence is
/// required) and wrap everything else as `Backend` with operation and URI
/// context. `read_into` must fill the whole buffer or fail.
#[async_trait]
pub(crate) trait StorageBackend: Send + Sync {
    async fn create_dir(&self, uri: &Uri) -> VfsResult<()>;

    async fn touch(&self, uri: &Uri) -> VfsResult<()>;

    async fn remove_dir(&self, uri: &Uri) -> VfsResult<()>;

    async fn remove_file(&self, uri: &Uri) -> VfsResult<()>;

    /// Immediate children of `parent`, unordered; the dispatcher sorts.
    async fn ls(&self, parent: &Uri) -> VfsResult<Vec<Uri>>;

    async fn file_size(&self, uri: &Uri) -> VfsResult<u64>;

    async fn is_dir(&self, uri: &Uri) -> VfsResult<bool>;

    async fn is_file(&self, uri: &Uri) -> VfsResult<bool>;

    async fn read_into(&self, uri: &Uri, offset: u64, buf: &mut [u8]) -> VfsResult<()>;

    /// Append-style write into the backend's write path.
    async fn write(&self, uri: &Uri, data: &[u8]) -> VfsResult<()>;

    async fn sync(&self, uri: &Uri) -> VfsResult<()>;

    /// Intra-scheme move of a single file/object.
    async fn move_file(&self, old: &Uri, new: &Uri) -> VfsResult<()>;

    /// Intra-scheme move of a directory tree (prefix rename on object
    /// stores).
    async fn move_dir(&self, old: &Uri, new: &Uri) -> VfsResult<()>;
}

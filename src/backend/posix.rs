//! Local POSIX adapter.
//!
//! Blocking syscalls run on the blocking pool via `spawn_blocking`;
//! positional reads loop on short `pread`s until the requested span is
//! filled. Locks are host advisory `flock`s.

use crate::backend::{FileLock, LocalLock, StorageBackend};
use crate::error::{VfsError, VfsResult};
use crate::uri::{FILE_SCHEME, Uri};
use anyhow::anyhow;
use async_trait::async_trait;
use std::ffi::CString;
use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub(crate) struct PosixBackend;

impl PosixBackend {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn filelock_lock(&self, uri: &Uri, shared: bool) -> VfsResult<FileLock> {
        let path = PathBuf::from(uri.path());
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)?;
            let op = if shared { libc::LOCK_SH } else { libc::LOCK_EX };
            if unsafe { libc::flock(file.as_raw_fd(), op) } != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(file)
        })
        .await
        .map_err(|e| VfsError::backend("filelock_lock", uri, anyhow!("blocking lock failed: {e}")))?
        .map_err(|e| VfsError::from_io("filelock_lock", uri, e))?;
        Ok(FileLock::Local(LocalLock { file }))
    }

    pub(crate) fn filelock_unlock(&self, uri: &Uri, lock: FileLock) -> VfsResult<()> {
        match lock {
            FileLock::Local(local) => {
                if unsafe { libc::flock(local.file.as_raw_fd(), libc::LOCK_UN) } != 0 {
                    return Err(VfsError::from_io(
                        "filelock_unlock",
                        uri,
                        std::io::Error::last_os_error(),
                    ));
                }
                Ok(())
            }
            FileLock::Remote => Ok(()),
        }
    }
}

#[async_trait]
impl StorageBackend for PosixBackend {
    async fn create_dir(&self, uri: &Uri) -> VfsResult<()> {
        fs::create_dir_all(uri.path())
            .await
            .map_err(|e| VfsError::from_io("create_dir", uri, e))
    }

    async fn touch(&self, uri: &Uri) -> VfsResult<()> {
        let path = PathBuf::from(uri.path());
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            // Bump mtime for pre-existing files; content stays untouched.
            let cpath = CString::new(path.as_os_str().as_bytes())
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidInput, e))?;
            if unsafe { libc::utimes(cpath.as_ptr(), std::ptr::null()) } != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        })
        .await
        .map_err(|e| VfsError::backend("touch", uri, anyhow!("blocking touch failed: {e}")))?
        .map_err(|e| VfsError::from_io("touch", uri, e))
    }

    async fn remove_dir(&self, uri: &Uri) -> VfsResult<()> {
        fs::remove_dir_all(uri.path())
            .await
            .map_err(|e| VfsError::from_io("remove_dir", uri, e))
    }

    async fn remove_file(&self, uri: &Uri) -> VfsResult<()> {
        fs::remove_file(uri.path())
            .await
            .map_err(|e| VfsError::from_io("remove_file", uri, e))
    }

    async fn ls(&self, parent: &Uri) -> VfsResult<Vec<Uri>> {
        let mut entries = fs::read_dir(parent.path())
            .await
            .map_err(|e| VfsError::from_io("ls", parent, e))?;
        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VfsError::from_io("ls", parent, e))?
        {
            children.push(Uri::new(format!(
                "{FILE_SCHEME}{}",
                entry.path().display()
            )));
        }
        Ok(children)
    }

    async fn file_size(&self, uri: &Uri) -> VfsResult<u64> {
        let meta = fs::metadata(uri.path())
            .await
            .map_err(|e| VfsError::from_io("file_size", uri, e))?;
        if meta.is_dir() {
            return Err(VfsError::backend(
                "file_size",
                uri,
                anyhow!("is a directory"),
            ));
        }
        Ok(meta.len())
    }

    async fn is_dir(&self, uri: &Uri) -> VfsResult<bool> {
        match fs::metadata(uri.path()).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(VfsError::from_io("is_dir", uri, e)),
        }
    }

    async fn is_file(&self, uri: &Uri) -> VfsResult<bool> {
        match fs::metadata(uri.path()).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(VfsError::from_io("is_file", uri, e)),
        }
    }

    #[tracing::instrument(
        name = "PosixBackend.read",
        level = "trace",
        skip(self, buf),
        fields(uri = %uri, offset, len = buf.len())
    )]
    async fn read_into(&self, uri: &Uri, offset: u64, buf: &mut [u8]) -> VfsResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let path = PathBuf::from(uri.path());
        let len = buf.len();
        let data = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
            let file = std::fs::File::open(&path)?;
            let mut local = vec![0u8; len];
            let mut read = 0usize;
            while read < len {
                let n = file.read_at(&mut local[read..], offset + read as u64)?;
                if n == 0 {
                    return Err(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "read past end of file",
                    ));
                }
                read += n;
            }
            Ok(local)
        })
        .await
        .map_err(|e| VfsError::backend("read", uri, anyhow!("blocking read failed: {e}")))?
        .map_err(|e| VfsError::from_io("read", uri, e))?;
        buf.copy_from_slice(&data);
        Ok(())
    }

    #[tracing::instrument(
        name = "PosixBackend.write",
        level = "trace",
        skip(self, data),
        fields(uri = %uri, len = data.len())
    )]
    async fn write(&self, uri: &Uri, data: &[u8]) -> VfsResult<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(uri.path())
            .await
            .map_err(|e| VfsError::from_io("write", uri, e))?;
        file.write_all(data)
            .await
            .map_err(|e| VfsError::from_io("write", uri, e))?;
        file.flush()
            .await
            .map_err(|e| VfsError::from_io("write", uri, e))
    }

    async fn sync(&self, uri: &Uri) -> VfsResult<()> {
        let meta = fs::metadata(uri.path())
            .await
            .map_err(|e| VfsError::from_io("sync", uri, e))?;
        if meta.is_dir() {
            return Ok(());
        }
        let file = fs::File::open(uri.path())
            .await
            .map_err(|e| VfsError::from_io("sync", uri, e))?;
        file.sync_all()
            .await
            .map_err(|e| VfsError::from_io("sync", uri, e))
    }

    async fn move_file(&self, old: &Uri, new: &Uri) -> VfsResult<()> {
        fs::rename(old.path(), new.path())
            .await
            .map_err(|e| VfsError::from_io("move_file", old, e))
    }

    async fn move_dir(&self, old: &Uri, new: &Uri) -> VfsResult<()> {
        fs::rename(old.path(), new.path())
            .await
            .map_err(|e| VfsError::from_io("move_dir", old, e))
    }
}

//! VFS façade: scheme dispatch, the public operation surface, lifecycle.
//!
//! A [`Vfs`] is created uninitialized, recording only which backends the
//! build carries. `init` sizes the shared task pool and connects the
//! compiled-in remote backends; every operation afterwards resolves its
//! URI's scheme to exactly one adapter. Large reads are decomposed by the
//! planner and fanned out across the pool; the caller blocks until every
//! sub-task has finished.

pub(crate) mod plan;
pub(crate) mod pool;

#[cfg(feature = "hdfs")]
use crate::backend::hdfs::HdfsBackend;
#[cfg(unix)]
use crate::backend::posix::PosixBackend;
#[cfg(feature = "s3")]
use crate::backend::s3::S3Backend;
#[cfg(windows)]
use crate::backend::win::WinBackend;
use crate::backend::{FileLock, Filesystem, StorageBackend};
use crate::config::VfsParams;
use crate::error::{VfsError, VfsResult};
use crate::uri::{Scheme, Uri};
use self::plan::plan_read;
use self::pool::TaskPool;
use std::collections::HashSet;

/// Open mode for [`Vfs::open_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsMode {
    Read,
    Write,
    Append,
}

struct State {
    params: VfsParams,
    pool: TaskPool,
    #[cfg(unix)]
    posix: PosixBackend,
    #[cfg(windows)]
    win: WinBackend,
    #[cfg(feature = "hdfs")]
    hdfs: HdfsBackend,
    #[cfg(feature = "s3")]
    s3: S3Backend,
}

impl State {
    /// Resolve a URI's scheme to its adapter. Owns the unsupported-scheme
    /// and not-built error paths; nothing is touched on failure.
    fn backend(&self, uri: &Uri) -> VfsResult<&dyn StorageBackend> {
        match uri.scheme() {
            Scheme::File => {
                #[cfg(unix)]
                {
                    Ok(&self.posix)
                }
                #[cfg(windows)]
                {
                    Ok(&self.win)
                }
            }
            Scheme::Hdfs => {
                #[cfg(feature = "hdfs")]
                {
                    Ok(&self.hdfs)
                }
                #[cfg(not(feature = "hdfs"))]
                {
                    Err(VfsError::FeatureNotBuilt {
                        fs: Filesystem::Hdfs,
                    })
                }
            }
            Scheme::S3 => {
                #[cfg(feature = "s3")]
                {
                    Ok(&self.s3)
                }
                #[cfg(not(feature = "s3"))]
                {
                    Err(VfsError::FeatureNotBuilt { fs: Filesystem::S3 })
                }
            }
            Scheme::Other => Err(VfsError::unsupported(uri)),
        }
    }
}

/// The virtual file system: one URI-addressed interface over every
/// compiled-in storage backend.
pub struct Vfs {
    supported_fs: HashSet<Filesystem>,
    state: Option<State>,
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs {
    /// Records which backends this build carries; [`Vfs::init`] makes the
    /// instance usable.
    pub fn new() -> Self {
        let mut supported_fs = HashSet::new();
        #[cfg(unix)]
        supported_fs.insert(Filesystem::Posix);
        #[cfg(windows)]
        supported_fs.insert(Filesystem::Win);
        #[cfg(feature = "hdfs")]
        supported_fs.insert(Filesystem::Hdfs);
        #[cfg(feature = "s3")]
        supported_fs.insert(Filesystem::S3);
        Self {
            supported_fs,
            state: None,
        }
    }

    pub fn supports_fs(&self, fs: Filesystem) -> bool {
        self.supported_fs.contains(&fs)
    }

    /// Validate `params`, size the task pool and connect the compiled-in
    /// remote backends. On failure the VFS stays uninitialized.
    pub async fn init(&mut self, params: VfsParams) -> VfsResult<()> {
        if params.max_parallel_ops == 0 {
            return Err(VfsError::Config(
                "max_parallel_ops must be at least 1".into(),
            ));
        }
        if params.min_parallel_size == 0 {
            return Err(VfsError::Config(
                "min_parallel_size must be at least 1".into(),
            ));
        }
        let pool = TaskPool::new(params.max_parallel_ops);
        #[cfg(feature = "hdfs")]
        let hdfs = HdfsBackend::connect(&params.hdfs)?;
        #[cfg(feature = "s3")]
        let s3 = S3Backend::connect(&params.s3).await?;
        tracing::debug!(
            max_parallel_ops = params.max_parallel_ops,
            min_parallel_size = params.min_parallel_size,
            "vfs initialized"
        );
        self.state = Some(State {
            params,
            pool,
            #[cfg(unix)]
            posix: PosixBackend::new(),
            #[cfg(windows)]
            win: WinBackend::new(),
            #[cfg(feature = "hdfs")]
            hdfs,
            #[cfg(feature = "s3")]
            s3,
        });
        Ok(())
    }

    /// Release the pool and all adapter state. Remote clients are dropped
    /// without an explicit disconnect; their resources go with the state.
    pub fn shutdown(&mut self) {
        if self.state.take().is_some() {
            tracing::debug!("vfs shut down");
        }
    }

    /// Snapshot of the parameters the VFS was initialized with.
    pub fn config(&self) -> VfsResult<&VfsParams> {
        Ok(&self.state()?.params)
    }

    /// Pure normalization; no I/O. Bare local paths become `file://` URIs,
    /// scheme-qualified inputs pass through unchanged.
    pub fn abs_path(path: &str) -> String {
        crate::uri::abs_path(path)
    }

    fn state(&self) -> VfsResult<&State> {
        self.state.as_ref().ok_or(VfsError::NotInitialized)
    }

    /// Create the directory at `uri` if it does not exist. A no-op on
    /// object stores, which have no directories.
    pub async fn create_dir(&self, uri: &Uri) -> VfsResult<()> {
        let state = self.state()?;
        if uri.is_s3() {
            #[cfg(feature = "s3")]
            {
                let _ = state;
                return Ok(());
            }
            #[cfg(not(feature = "s3"))]
            {
                let _ = state;
                return Err(VfsError::FeatureNotBuilt { fs: Filesystem::S3 });
            }
        }
        let backend = state.backend(uri)?;
        if backend.is_dir(uri).await? {
            return Ok(());
        }
        backend.create_dir(uri).await
    }

    /// Create an empty file/object if absent; existing content is left
    /// untouched.
    pub async fn touch(&self, uri: &Uri) -> VfsResult<()> {
        self.state()?.backend(uri)?.touch(uri).await
    }

    pub async fn create_bucket(&self, uri: &Uri) -> VfsResult<()> {
        let state = self.state()?;
        if !uri.is_s3() {
            return Err(VfsError::unsupported(uri));
        }
        #[cfg(feature = "s3")]
        {
            state.s3.create_bucket(uri).await
        }
        #[cfg(not(feature = "s3"))]
        {
            let _ = state;
            Err(VfsError::FeatureNotBuilt { fs: Filesystem::S3 })
        }
    }

    pub async fn remove_bucket(&self, uri: &Uri) -> VfsResult<()> {
        let state = self.state()?;
        if !uri.is_s3() {
            return Err(VfsError::unsupported(uri));
        }
        #[cfg(feature = "s3")]
        {
            state.s3.remove_bucket(uri).await
        }
        #[cfg(not(feature = "s3"))]
        {
            let _ = state;
            Err(VfsError::FeatureNotBuilt { fs: Filesystem::S3 })
        }
    }

    pub async fn empty_bucket(&self, uri: &Uri) -> VfsResult<()> {
        let state = self.state()?;
        if !uri.is_s3() {
            return Err(VfsError::unsupported(uri));
        }
        #[cfg(feature = "s3")]
        {
            state.s3.empty_bucket(uri).await
        }
        #[cfg(not(feature = "s3"))]
        {
            let _ = state;
            Err(VfsError::FeatureNotBuilt { fs: Filesystem::S3 })
        }
    }

    pub async fn is_empty_bucket(&self, uri: &Uri) -> VfsResult<bool> {
        let state = self.state()?;
        if !uri.is_s3() {
            return Err(VfsError::unsupported(uri));
        }
        #[cfg(feature = "s3")]
        {
            state.s3.is_empty_bucket(uri).await
        }
        #[cfg(not(feature = "s3"))]
        {
            let _ = state;
            Err(VfsError::FeatureNotBuilt { fs: Filesystem::S3 })
        }
    }

    pub async fn is_bucket(&self, uri: &Uri) -> VfsResult<bool> {
        let state = self.state()?;
        if !uri.is_s3() {
            return Err(VfsError::unsupported(uri));
        }
        #[cfg(feature = "s3")]
        {
            state.s3.is_bucket(uri).await
        }
        #[cfg(not(feature = "s3"))]
        {
            let _ = state;
            Err(VfsError::FeatureNotBuilt { fs: Filesystem::S3 })
        }
    }

    /// Remove the directory tree at `uri`. A second removal of the same
    /// tree reports `NotFound`.
    pub async fn remove_dir(&self, uri: &Uri) -> VfsResult<()> {
        self.state()?.backend(uri)?.remove_dir(uri).await
    }

    pub async fn remove_file(&self, uri: &Uri) -> VfsResult<()> {
        self.state()?.backend(uri)?.remove_file(uri).await
    }

    pub async fn is_dir(&self, uri: &Uri) -> VfsResult<bool> {
        self.state()?.backend(uri)?.is_dir(uri).await
    }

    pub async fn is_file(&self, uri: &Uri) -> VfsResult<bool> {
        self.state()?.backend(uri)?.is_file(uri).await
    }

    pub async fn file_size(&self, uri: &Uri) -> VfsResult<u64> {
        self.state()?.backend(uri)?.file_size(uri).await
    }

    /// Immediate children of `parent`, byte-wise ascending, no duplicates.
    pub async fn ls(&self, parent: &Uri) -> VfsResult<Vec<Uri>> {
        let mut children = self.state()?.backend(parent)?.ls(parent).await?;
        children.sort();
        children.dedup();
        Ok(children)
    }

    /// Intra-scheme move of a single file. An existing target is removed
    /// first.
    pub async fn move_file(&self, old: &Uri, new: &Uri) -> VfsResult<()> {
        let state = self.state()?;
        if old.scheme() != new.scheme() {
            return Err(VfsError::CrossSchemeUnsupported {
                old: old.to_string(),
                new: new.to_string(),
            });
        }
        let backend = state.backend(old)?;
        if backend.is_file(new).await? {
            backend.remove_file(new).await?;
        }
        backend.move_file(old, new).await
    }

    /// Intra-scheme move of a directory tree.
    pub async fn move_dir(&self, old: &Uri, new: &Uri) -> VfsResult<()> {
        let state = self.state()?;
        if old.scheme() != new.scheme() {
            return Err(VfsError::CrossSchemeUnsupported {
                old: old.to_string(),
                new: new.to_string(),
            });
        }
        state.backend(old)?.move_dir(old, new).await
    }

    /// Fill `buf` from `uri` starting at `offset`. Reads past
    /// `min_parallel_size` are split across the task pool; the resulting
    /// buffer is as if the read were sequential.
    #[tracing::instrument(
        name = "Vfs.read",
        level = "trace",
        skip(self, buf),
        fields(uri = %uri, offset, nbytes = buf.len())
    )]
    pub async fn read(&self, uri: &Uri, offset: u64, buf: &mut [u8]) -> VfsResult<()> {
        let state = self.state()?;
        let backend = state.backend(uri)?;
        read_ranged(
            backend,
            &state.pool,
            state.params.min_parallel_size,
            uri,
            offset,
            buf,
        )
        .await
    }

    /// Append `data` to the backend's write path for `uri`. Object stores
    /// buffer until [`Vfs::close_file`].
    pub async fn write(&self, uri: &Uri, data: &[u8]) -> VfsResult<()> {
        self.state()?.backend(uri)?.write(uri, data).await
    }

    /// Flush pending data for `uri`. On object stores the final flush
    /// happens on close; this returns Ok.
    pub async fn sync(&self, uri: &Uri) -> VfsResult<()> {
        self.state()?.backend(uri)?.sync(uri).await
    }

    /// Validate `mode` against the current state of `uri`: `Read` requires
    /// the file to exist, `Write` truncates by removing an existing file,
    /// `Append` is rejected on object stores.
    pub async fn open_file(&self, uri: &Uri, mode: VfsMode) -> VfsResult<()> {
        let state = self.state()?;
        let backend = state.backend(uri)?;
        match mode {
            VfsMode::Read => {
                if !backend.is_file(uri).await? {
                    return Err(VfsError::not_found("open_file", uri));
                }
            }
            VfsMode::Write => {
                if backend.is_file(uri).await? {
                    backend.remove_file(uri).await?;
                }
            }
            VfsMode::Append => {
                if uri.is_s3() {
                    return Err(VfsError::AppendUnsupported {
                        uri: uri.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Durably finish writes to `uri`: fsync locally, flush the buffered
    /// object on S3. Writing again before a new `open_file` is undefined.
    pub async fn close_file(&self, uri: &Uri) -> VfsResult<()> {
        let state = self.state()?;
        if uri.is_s3() {
            #[cfg(feature = "s3")]
            {
                return state.s3.flush_object(uri).await;
            }
            #[cfg(not(feature = "s3"))]
            {
                let _ = state;
                return Err(VfsError::FeatureNotBuilt { fs: Filesystem::S3 });
            }
        }
        state.backend(uri)?.sync(uri).await
    }

    /// Take an advisory lock on a local file; `shared` requests a read
    /// lock. On remote schemes this is a no-op returning an inert token.
    pub async fn filelock_lock(&self, uri: &Uri, shared: bool) -> VfsResult<FileLock> {
        let state = self.state()?;
        if uri.is_file() {
            #[cfg(unix)]
            return state.posix.filelock_lock(uri, shared).await;
            #[cfg(windows)]
            return state.win.filelock_lock(uri, shared).await;
        }
        state.backend(uri).map(|_| FileLock::Remote)
    }

    pub async fn filelock_unlock(&self, uri: &Uri, lock: FileLock) -> VfsResult<()> {
        let state = self.state()?;
        if uri.is_file() {
            #[cfg(unix)]
            return state.posix.filelock_unlock(uri, lock);
            #[cfg(windows)]
            return state.win.filelock_unlock(uri, lock);
        }
        state.backend(uri).map(|_| drop(lock))
    }
}

/// Execute one read against `backend`, fanning sub-ranges out across the
/// pool. Every sub-task runs to completion even after a peer fails; the
/// first failure's message is preserved in the aggregated error.
async fn read_ranged(
    backend: &dyn StorageBackend,
    pool: &TaskPool,
    min_parallel_size: u64,
    uri: &Uri,
    offset: u64,
    buf: &mut [u8],
) -> VfsResult<()> {
    let ranges = plan_read(buf.len() as u64, min_parallel_size, pool.size());
    match ranges.len() {
        0 => Ok(()),
        1 => backend.read_into(uri, offset, buf).await,
        _ => {
            let mut tasks = Vec::with_capacity(ranges.len());
            let mut rest = buf;
            for range in &ranges {
                let (sub, tail) =
                    std::mem::take(&mut rest).split_at_mut(range.nbytes as usize);
                rest = tail;
                tasks.push(pool.run(backend.read_into(uri, offset + range.begin, sub)));
            }
            let results = futures::future::join_all(tasks).await;
            let mut first_err: Option<VfsError> = None;
            for result in results {
                if let Err(err) = result {
                    first_err.get_or_insert(err);
                }
            }
            match first_err {
                None => Ok(()),
                Some(err) => Err(VfsError::ParallelRead {
                    first: err.to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct MockBackend {
        data: Vec<u8>,
        fail_at_offset: Option<u64>,
    }

    #[async_trait]
    impl StorageBackend for MockBackend {
        async fn read_into(&self, uri: &Uri, offset: u64, buf: &mut [u8]) -> VfsResult<()> {
            if self.fail_at_offset == Some(offset) {
                return Err(VfsError::backend("read", uri, anyhow!("injected fault")));
            }
            let start = offset as usize;
            buf.copy_from_slice(&self.data[start..start + buf.len()]);
            Ok(())
        }

        // The remaining op set is not exercised by the planner tests.
        async fn create_dir(&self, _uri: &Uri) -> VfsResult<()> {
            unreachable!()
        }
        async fn touch(&self, _uri: &Uri) -> VfsResult<()> {
            unreachable!()
        }
        async fn remove_dir(&self, _uri: &Uri) -> VfsResult<()> {
            unreachable!()
        }
        async fn remove_file(&self, _uri: &Uri) -> VfsResult<()> {
            unreachable!()
        }
        async fn ls(&self, _parent: &Uri) -> VfsResult<Vec<Uri>> {
            unreachable!()
        }
        async fn file_size(&self, _uri: &Uri) -> VfsResult<u64> {
            unreachable!()
        }
        async fn is_dir(&self, _uri: &Uri) -> VfsResult<bool> {
            unreachable!()
        }
        async fn is_file(&self, _uri: &Uri) -> VfsResult<bool> {
            unreachable!()
        }
        async fn write(&self, _uri: &Uri, _data: &[u8]) -> VfsResult<()> {
            unreachable!()
        }
        async fn sync(&self, _uri: &Uri) -> VfsResult<()> {
            unreachable!()
        }
        async fn move_file(&self, _old: &Uri, _new: &Uri) -> VfsResult<()> {
            unreachable!()
        }
        async fn move_dir(&self, _old: &Uri, _new: &Uri) -> VfsResult<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn parallel_read_matches_sequential() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let backend = MockBackend {
            data: data.clone(),
            fail_at_offset: None,
        };
        let pool = TaskPool::new(4);
        let uri = Uri::new("file:///mock");

        let mut parallel = vec![0u8; 8000];
        read_ranged(&backend, &pool, 1000, &uri, 500, &mut parallel)
            .await
            .unwrap();

        let mut sequential = vec![0u8; 8000];
        backend.read_into(&uri, 500, &mut sequential).await.unwrap();

        assert_eq!(parallel, sequential);
        assert_eq!(parallel, data[500..8500]);
    }

    #[tokio::test]
    async fn failed_subrange_yields_aggregate_error() {
        let backend = MockBackend {
            data: vec![7u8; 4000],
            fail_at_offset: Some(1000),
        };
        let pool = TaskPool::new(4);
        let uri = Uri::new("file:///mock");

        let mut buf = vec![0u8; 4000];
        let err = read_ranged(&backend, &pool, 1000, &uri, 0, &mut buf)
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::ParallelRead { .. }));
        assert!(err.to_string().contains("injected fault"));
    }

    #[tokio::test]
    async fn zero_byte_read_schedules_nothing() {
        let backend = MockBackend {
            data: Vec::new(),
            fail_at_offset: Some(0),
        };
        let pool = TaskPool::new(4);
        let uri = Uri::new("file:///mock");

        let mut buf = [0u8; 0];
        read_ranged(&backend, &pool, 1000, &uri, 0, &mut buf)
            .await
            .unwrap();
    }
}

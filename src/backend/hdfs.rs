//! HDFS adapter over the native client.
//!
//! Directory create/remove and rename are namenode metadata ops; reads are
//! range-seekable; writes are sequential create-or-append. One connected
//! client serves every `hdfs://` URI of the configured cluster.

use crate::backend::StorageBackend;
use crate::config::HdfsParams;
use crate::error::{VfsError, VfsResult};
use crate::uri::{HDFS_SCHEME, Uri};
use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use hdfs_native::{Client, HdfsError, WriteOptions};

pub(crate) struct HdfsBackend {
    client: Client,
}

fn wrap(op: &'static str, uri: &Uri, err: HdfsError) -> VfsError {
    VfsError::backend(op, uri, anyhow!(err))
}

impl HdfsBackend {
    pub(crate) fn connect(params: &HdfsParams) -> VfsResult<Self> {
        let client = Client::new(&params.name_node_uri).map_err(|e| {
            VfsError::Config(format!(
                "cannot connect to HDFS at {}: {e}",
                params.name_node_uri
            ))
        })?;
        Ok(Self { client })
    }

    async fn exists(&self, uri: &Uri) -> VfsResult<bool> {
        match self.client.get_file_info(uri.path()).await {
            Ok(_) => Ok(true),
            Err(HdfsError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(wrap("stat", uri, e)),
        }
    }
}

#[async_trait]
impl StorageBackend for HdfsBackend {
    async fn create_dir(&self, uri: &Uri) -> VfsResult<()> {
        self.client
            .mkdirs(uri.path(), 0o755, true)
            .await
            .map_err(|e| wrap("create_dir", uri, e))
    }

    async fn touch(&self, uri: &Uri) -> VfsResult<()> {
        if self.exists(uri).await? {
            return Ok(());
        }
        let mut writer = self
            .client
            .create(uri.path(), WriteOptions::default())
            .await
            .map_err(|e| wrap("touch", uri, e))?;
        writer.close().await.map_err(|e| wrap("touch", uri, e))
    }

    async fn remove_dir(&self, uri: &Uri) -> VfsResult<()> {
        match self.client.delete(uri.path(), true).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(VfsError::not_found("remove_dir", uri)),
            Err(HdfsError::FileNotFound(_)) => Err(VfsError::not_found("remove_dir", uri)),
            Err(e) => Err(wrap("remove_dir", uri, e)),
        }
    }

    async fn remove_file(&self, uri: &Uri) -> VfsResult<()> {
        match self.client.delete(uri.path(), false).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(VfsError::not_found("remove_file", uri)),
            Err(HdfsError::FileNotFound(_)) => Err(VfsError::not_found("remove_file", uri)),
            Err(e) => Err(wrap("remove_file", uri, e)),
        }
    }

    async fn ls(&self, parent: &Uri) -> VfsResult<Vec<Uri>> {
        let statuses = self
            .client
            .list_status(parent.path(), false)
            .await
            .map_err(|e| match e {
                HdfsError::FileNotFound(_) => VfsError::not_found("ls", parent),
                e => wrap("ls", parent, e),
            })?;
        Ok(statuses
            .into_iter()
            .map(|status| {
                Uri::new(format!(
                    "{HDFS_SCHEME}{}{}",
                    parent.authority(),
                    status.path
                ))
            })
            .collect())
    }

    async fn file_size(&self, uri: &Uri) -> VfsResult<u64> {
        let status = self
            .client
            .get_file_info(uri.path())
            .await
            .map_err(|e| match e {
                HdfsError::FileNotFound(_) => VfsError::not_found("file_size", uri),
                e => wrap("file_size", uri, e),
            })?;
        if status.isdir {
            return Err(VfsError::backend(
                "file_size",
                uri,
                anyhow!("is a directory"),
            ));
        }
        Ok(status.length as u64)
    }

    async fn is_dir(&self, uri: &Uri) -> VfsResult<bool> {
        match self.client.get_file_info(uri.path()).await {
            Ok(status) => Ok(status.isdir),
            Err(HdfsError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(wrap("is_dir", uri, e)),
        }
    }

    async fn is_file(&self, uri: &Uri) -> VfsResult<bool> {
        match self.client.get_file_info(uri.path()).await {
            Ok(status) => Ok(!status.isdir),
            Err(HdfsError::FileNotFound(_)) => Ok(false),
            Err(e) => Err(wrap("is_file", uri, e)),
        }
    }

    #[tracing::instrument(
        name = "HdfsBackend.read",
        level = "trace",
        skip(self, buf),
        fields(uri = %uri, offset, len = buf.len())
    )]
    async fn read_into(&self, uri: &Uri, offset: u64, buf: &mut [u8]) -> VfsResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let mut reader = self.client.read(uri.path()).await.map_err(|e| match e {
            HdfsError::FileNotFound(_) => VfsError::not_found("read", uri),
            e => wrap("read", uri, e),
        })?;
        let data = reader
            .read_range(offset as usize, buf.len())
            .await
            .map_err(|e| wrap("read", uri, e))?;
        if data.len() != buf.len() {
            return Err(VfsError::backend(
                "read",
                uri,
                anyhow!("short range read: got {} of {} bytes", data.len(), buf.len()),
            ));
        }
        buf.copy_from_slice(&data);
        Ok(())
    }

    async fn write(&self, uri: &Uri, data: &[u8]) -> VfsResult<()> {
        let mut writer = if self.exists(uri).await? {
            self.client
                .append(uri.path())
                .await
                .map_err(|e| wrap("write", uri, e))?
        } else {
            self.client
                .create(uri.path(), WriteOptions::default())
                .await
                .map_err(|e| wrap("write", uri, e))?
        };
        writer
            .write(Bytes::copy_from_slice(data))
            .await
            .map_err(|e| wrap("write", uri, e))?;
        writer.close().await.map_err(|e| wrap("write", uri, e))
    }

    async fn sync(&self, _uri: &Uri) -> VfsResult<()> {
        // Writers are closed per write; the namenode already has the data.
        Ok(())
    }

    async fn move_file(&self, old: &Uri, new: &Uri) -> VfsResult<()> {
        self.client
            .rename(old.path(), new.path(), false)
            .await
            .map_err(|e| wrap("move_file", old, e))
    }

    async fn move_dir(&self, old: &Uri, new: &Uri) -> VfsResult<()> {
        self.client
            .rename(old.path(), new.path(), false)
            .await
            .map_err(|e| wrap("move_dir", old, e))
    }
}

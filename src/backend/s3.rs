//! S3 adapter: range GETs, prefix-emulated directories, buffered multipart
//! writes committed on `flush_object`.
//!
//! Objects have no directories, no rename and no append. Directories are
//! emulated as key prefixes, moves as copy+delete, and writes accumulate
//! in a per-URI buffer that is uploaded (multipart past the part size) when
//! the file is closed.

use crate::backend::StorageBackend;
use crate::config::S3Params;
use crate::error::{VfsError, VfsResult};
use crate::uri::{S3_SCHEME, Uri};
use anyhow::anyhow;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_config::timeout::TimeoutConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::sleep;

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 100;
// S3 rejects non-final multipart parts below 5MB.
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
const DELETE_BATCH: usize = 1000;

#[derive(Default)]
struct WriteBuffer {
    buf: Vec<u8>,
    upload: Option<PendingUpload>,
}

struct PendingUpload {
    upload_id: String,
    parts: Vec<CompletedPart>,
    next_part_number: i32,
}

pub(crate) struct S3Backend {
    client: Client,
    part_size: u64,
    write_buffers: DashMap<String, WriteBuffer>,
}

fn is_not_found(msg: &str) -> bool {
    msg.contains("NoSuchKey")
        || msg.contains("NoSuchBucket")
        || msg.contains("NotFound")
        || msg.contains("status: 404")
}

impl S3Backend {
    pub(crate) async fn connect(params: &S3Params) -> VfsResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if !params.region.is_empty() {
            loader = loader.region(Region::new(params.region.clone()));
        }
        loader = loader.timeout_config(
            TimeoutConfig::builder()
                .connect_timeout(Duration::from_millis(params.connect_timeout_ms))
                .operation_timeout(Duration::from_millis(params.request_timeout_ms))
                .build(),
        );
        let base = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&base);
        if let Some(endpoint) = &params.endpoint_override {
            let url = if endpoint.contains("://") {
                endpoint.clone()
            } else {
                format!("{}://{endpoint}", params.scheme.as_str())
            };
            builder = builder.endpoint_url(url);
        }
        if !params.use_virtual_addressing {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            part_size: params.file_buffer_size.max(MIN_PART_SIZE),
            write_buffers: DashMap::new(),
        })
    }

    fn wrap<E>(op: &'static str, uri: &Uri, err: E) -> VfsError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        VfsError::backend(op, uri, anyhow!("{}", DisplayErrorContext(err)))
    }

    /// The `bucket/` prefix that emulates a directory at `uri`.
    fn dir_prefix(uri: &Uri) -> String {
        let key = uri.key();
        if key.is_empty() || key.ends_with('/') {
            key.to_string()
        } else {
            format!("{key}/")
        }
    }

    async fn put_object_simple(&self, uri: &Uri, data: &[u8]) -> VfsResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .client
                .put_object()
                .bucket(uri.bucket())
                .key(uri.key())
                .body(ByteStream::from(data.to_vec()))
                .send()
                .await;
            match result {
                Ok(_) => return Ok(()),
                Err(_e) if attempt < MAX_RETRIES => {
                    sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << (attempt - 1)))).await;
                }
                Err(e) => return Err(Self::wrap("write", uri, e)),
            }
        }
    }

    async fn begin_upload(&self, uri: &Uri) -> VfsResult<PendingUpload> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(uri.bucket())
            .key(uri.key())
            .send()
            .await
            .map_err(|e| Self::wrap("write", uri, e))?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| {
                VfsError::backend("write", uri, anyhow!("missing upload_id in multipart response"))
            })?
            .to_string();
        Ok(PendingUpload {
            upload_id,
            parts: Vec::new(),
            next_part_number: 1,
        })
    }

    async fn upload_part(
        &self,
        uri: &Uri,
        upload: &mut PendingUpload,
        chunk: Vec<u8>,
    ) -> VfsResult<()> {
        let part_number = upload.next_part_number;
        let mut attempt = 0;
        let out = loop {
            attempt += 1;
            let result = self
                .client
                .upload_part()
                .bucket(uri.bucket())
                .key(uri.key())
                .upload_id(&upload.upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk.clone()))
                .send()
                .await;
            match result {
                Ok(out) => break out,
                Err(_e) if attempt < MAX_RETRIES => {
                    sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << (attempt - 1)))).await;
                }
                Err(e) => return Err(Self::wrap("write", uri, e)),
            }
        };
        upload.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .set_e_tag(out.e_tag().map(str::to_string))
                .build(),
        );
        upload.next_part_number += 1;
        Ok(())
    }

    async fn abort_upload(&self, uri: &Uri, upload_id: &str) {
        let _ = self
            .client
            .abort_multipart_upload()
            .bucket(uri.bucket())
            .key(uri.key())
            .upload_id(upload_id)
            .send()
            .await;
    }

    /// Commit the buffered writes for `uri`. Small objects go up as a
    /// single PUT; anything that spilled into multipart parts is completed
    /// (or aborted on failure). No buffered writes is a no-op.
    #[tracing::instrument(name = "S3Backend.flush_object", level = "trace", skip(self), fields(uri = %uri))]
    pub(crate) async fn flush_object(&self, uri: &Uri) -> VfsResult<()> {
        let Some((_, mut wb)) = self.write_buffers.remove(uri.as_str()) else {
            return Ok(());
        };
        match wb.upload.take() {
            None => self.put_object_simple(uri, &wb.buf).await,
            Some(mut upload) => {
                if !wb.buf.is_empty() {
                    let chunk = std::mem::take(&mut wb.buf);
                    if let Err(e) = self.upload_part(uri, &mut upload, chunk).await {
                        self.abort_upload(uri, &upload.upload_id).await;
                        return Err(e);
                    }
                }
                let completed = CompletedMultipartUpload::builder()
                    .set_parts(Some(upload.parts))
                    .build();
                let result = self
                    .client
                    .complete_multipart_upload()
                    .bucket(uri.bucket())
                    .key(uri.key())
                    .upload_id(&upload.upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await;
                if let Err(e) = result {
                    self.abort_upload(uri, &upload.upload_id).await;
                    return Err(Self::wrap("close_file", uri, e));
                }
                Ok(())
            }
        }
    }

    pub(crate) async fn create_bucket(&self, uri: &Uri) -> VfsResult<()> {
        self.client
            .create_bucket()
            .bucket(uri.bucket())
            .send()
            .await
            .map(|_| ())
            .map_err(|e| Self::wrap("create_bucket", uri, e))
    }

    pub(crate) async fn remove_bucket(&self, uri: &Uri) -> VfsResult<()> {
        self.client
            .delete_bucket()
            .bucket(uri.bucket())
            .send()
            .await
            .map(|_| ())
            .map_err(|e| Self::wrap("remove_bucket", uri, e))
    }

    pub(crate) async fn empty_bucket(&self, uri: &Uri) -> VfsResult<()> {
        let keys = self.list_keys(uri, "", "empty_bucket").await?;
        self.delete_keys(uri, keys, "empty_bucket").await
    }

    pub(crate) async fn is_empty_bucket(&self, uri: &Uri) -> VfsResult<bool> {
        let out = self
            .client
            .list_objects_v2()
            .bucket(uri.bucket())
            .max_keys(1)
            .send()
            .await
            .map_err(|e| Self::wrap("is_empty_bucket", uri, e))?;
        Ok(out.key_count().unwrap_or(0) == 0)
    }

    pub(crate) async fn is_bucket(&self, uri: &Uri) -> VfsResult<bool> {
        match self.client.head_bucket().bucket(uri.bucket()).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let msg = format!("{}", DisplayErrorContext(e));
                if is_not_found(&msg) {
                    Ok(false)
                } else {
                    Err(VfsError::backend("is_bucket", uri, anyhow!(msg)))
                }
            }
        }
    }

    /// Every key under `prefix` (no delimiter, paginated).
    async fn list_keys(
        &self,
        uri: &Uri,
        prefix: &str,
        op: &'static str,
    ) -> VfsResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(uri.bucket());
            if !prefix.is_empty() {
                req = req.prefix(prefix);
            }
            if let Some(t) = &token {
                req = req.continuation_token(t);
            }
            let out = req.send().await.map_err(|e| Self::wrap(op, uri, e))?;
            for obj in out.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }
            match out.next_continuation_token() {
                Some(t) => token = Some(t.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }

    async fn delete_keys(
        &self,
        uri: &Uri,
        keys: Vec<String>,
        op: &'static str,
    ) -> VfsResult<()> {
        for batch in keys.chunks(DELETE_BATCH) {
            let mut ids = Vec::with_capacity(batch.len());
            for key in batch {
                ids.push(
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| VfsError::backend(op, uri, anyhow!(e)))?,
                );
            }
            let delete = Delete::builder()
                .set_objects(Some(ids))
                .build()
                .map_err(|e| VfsError::backend(op, uri, anyhow!(e)))?;
            self.client
                .delete_objects()
                .bucket(uri.bucket())
                .delete(delete)
                .send()
                .await
                .map_err(|e| Self::wrap(op, uri, e))?;
        }
        Ok(())
    }

    async fn copy_key(
        &self,
        old: &Uri,
        from_key: &str,
        new: &Uri,
        to_key: &str,
        op: &'static str,
    ) -> VfsResult<()> {
        self.client
            .copy_object()
            .copy_source(format!("{}/{from_key}", old.bucket()))
            .bucket(new.bucket())
            .key(to_key)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| Self::wrap(op, old, e))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn create_dir(&self, _uri: &Uri) -> VfsResult<()> {
        // Directories do not exist here; nothing to create.
        Ok(())
    }

    async fn touch(&self, uri: &Uri) -> VfsResult<()> {
        if self.is_file(uri).await? {
            return Ok(());
        }
        self.put_object_simple(uri, &[]).await
    }

    async fn remove_dir(&self, uri: &Uri) -> VfsResult<()> {
        let prefix = Self::dir_prefix(uri);
        let keys = self.list_keys(uri, &prefix, "remove_dir").await?;
        self.delete_keys(uri, keys, "remove_dir").await
    }

    async fn remove_file(&self, uri: &Uri) -> VfsResult<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .client
                .delete_object()
                .bucket(uri.bucket())
                .key(uri.key())
                .send()
                .await;
            match result {
                Ok(_) => return Ok(()),
                Err(_e) if attempt < MAX_RETRIES => {
                    sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << (attempt - 1)))).await;
                }
                Err(e) => return Err(Self::wrap("remove_file", uri, e)),
            }
        }
    }

    async fn ls(&self, parent: &Uri) -> VfsResult<Vec<Uri>> {
        let prefix = Self::dir_prefix(parent);
        let mut children = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(parent.bucket())
                .delimiter("/");
            if !prefix.is_empty() {
                req = req.prefix(&prefix);
            }
            if let Some(t) = &token {
                req = req.continuation_token(t);
            }
            let out = req.send().await.map_err(|e| Self::wrap("ls", parent, e))?;
            for obj in out.contents() {
                if let Some(key) = obj.key() {
                    if key == prefix {
                        // The zero-length marker some tools drop for the
                        // prefix itself is not a child.
                        continue;
                    }
                    children.push(Uri::new(format!("{S3_SCHEME}{}/{key}", parent.bucket())));
                }
            }
            for cp in out.common_prefixes() {
                if let Some(p) = cp.prefix() {
                    let trimmed = p.trim_end_matches('/');
                    children.push(Uri::new(format!("{S3_SCHEME}{}/{trimmed}", parent.bucket())));
                }
            }
            match out.next_continuation_token() {
                Some(t) => token = Some(t.to_string()),
                None => break,
            }
        }
        Ok(children)
    }

    async fn file_size(&self, uri: &Uri) -> VfsResult<u64> {
        match self
            .client
            .head_object()
            .bucket(uri.bucket())
            .key(uri.key())
            .send()
            .await
        {
            Ok(out) => Ok(out.content_length().unwrap_or(0) as u64),
            Err(e) => {
                let msg = format!("{}", DisplayErrorContext(e));
                if is_not_found(&msg) {
                    Err(VfsError::not_found("file_size", uri))
                } else {
                    Err(VfsError::backend("file_size", uri, anyhow!(msg)))
                }
            }
        }
    }

    async fn is_dir(&self, uri: &Uri) -> VfsResult<bool> {
        if uri.key().is_empty() {
            return self.is_bucket(uri).await;
        }
        let prefix = Self::dir_prefix(uri);
        let out = self
            .client
            .list_objects_v2()
            .bucket(uri.bucket())
            .prefix(&prefix)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| Self::wrap("is_dir", uri, e))?;
        Ok(out.key_count().unwrap_or(0) > 0)
    }

    async fn is_file(&self, uri: &Uri) -> VfsResult<bool> {
        match self
            .client
            .head_object()
            .bucket(uri.bucket())
            .key(uri.key())
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let msg = format!("{}", DisplayErrorContext(e));
                if is_not_found(&msg) {
                    Ok(false)
                } else {
                    Err(VfsError::backend("is_file", uri, anyhow!(msg)))
                }
            }
        }
    }

    #[tracing::instrument(
        name = "S3Backend.read",
        level = "trace",
        skip(self, buf),
        fields(uri = %uri, offset, len = buf.len())
    )]
    async fn read_into(&self, uri: &Uri, offset: u64, buf: &mut [u8]) -> VfsResult<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let end = offset + buf.len() as u64 - 1;
        let result = self
            .client
            .get_object()
            .bucket(uri.bucket())
            .key(uri.key())
            .range(format!("bytes={offset}-{end}"))
            .send()
            .await;
        let out = match result {
            Ok(out) => out,
            Err(e) => {
                let msg = format!("{}", DisplayErrorContext(e));
                if is_not_found(&msg) {
                    return Err(VfsError::not_found("read", uri));
                }
                return Err(VfsError::backend("read", uri, anyhow!(msg)));
            }
        };
        let data = out
            .body
            .collect()
            .await
            .map_err(|e| VfsError::backend("read", uri, anyhow!(e)))?
            .into_bytes();
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
        let mut wb = self
            .write_buffers
            .remove(uri.as_str())
            .map(|(_, wb)| wb)
            .unwrap_or_default();
        wb.buf.extend_from_slice(data);
        while wb.buf.len() as u64 >= self.part_size {
            let chunk: Vec<u8> = wb.buf.drain(..self.part_size as usize).collect();
            if wb.upload.is_none() {
                wb.upload = Some(self.begin_upload(uri).await?);
            }
            if let Some(upload) = wb.upload.as_mut()
                && let Err(e) = self.upload_part(uri, upload, chunk).await
            {
                self.abort_upload(uri, &upload.upload_id).await;
                return Err(e);
            }
        }
        self.write_buffers.insert(uri.to_string(), wb);
        Ok(())
    }

    async fn sync(&self, _uri: &Uri) -> VfsResult<()> {
        // The final flush happens on close; nothing to push early.
        Ok(())
    }

    async fn move_file(&self, old: &Uri, new: &Uri) -> VfsResult<()> {
        self.copy_key(old, old.key(), new, new.key(), "move_file")
            .await?;
        self.remove_file(old).await
    }

    async fn move_dir(&self, old: &Uri, new: &Uri) -> VfsResult<()> {
        let old_prefix = Self::dir_prefix(old);
        let new_prefix = Self::dir_prefix(new);
        let keys = self.list_keys(old, &old_prefix, "move_dir").await?;
        for key in &keys {
            let new_key = format!("{new_prefix}{}", &key[old_prefix.len()..]);
            self.copy_key(old, key, new, &new_key, "move_dir").await?;
        }
        self.delete_keys(old, keys, "move_dir").await
    }
}

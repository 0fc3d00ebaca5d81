//! VFS parameters.
//!
//! Plain-data structs with defaults and chained setters; parsing them out
//! of config files is the embedding application's concern.

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_PARALLEL_OPS: u64 = 8;
pub const DEFAULT_MIN_PARALLEL_SIZE: u64 = 10 * 1024 * 1024; // 10MB
pub const DEFAULT_FILE_BUFFER_SIZE: u64 = 5 * 1024 * 1024; // 5MB, one multipart part
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VfsParams {
    /// Worker count of the shared task pool; every fan-out is capped by it.
    pub max_parallel_ops: u64,
    /// Smallest read each parallel sub-task is responsible for. Reads below
    /// this run synchronously on the caller's task.
    pub min_parallel_size: u64,
    pub hdfs: HdfsParams,
    pub s3: S3Params,
}

impl Default for VfsParams {
    fn default() -> Self {
        Self {
            max_parallel_ops: DEFAULT_MAX_PARALLEL_OPS,
            min_parallel_size: DEFAULT_MIN_PARALLEL_SIZE,
            hdfs: HdfsParams::default(),
            s3: S3Params::default(),
        }
    }
}

impl VfsParams {
    pub fn max_parallel_ops(self, max_parallel_ops: u64) -> Self {
        Self {
            max_parallel_ops,
            ..self
        }
    }

    pub fn min_parallel_size(self, min_parallel_size: u64) -> Self {
        Self {
            min_parallel_size,
            ..self
        }
    }

    pub fn hdfs(self, hdfs: HdfsParams) -> Self {
        Self { hdfs, ..self }
    }

    pub fn s3(self, s3: S3Params) -> Self {
        Self { s3, ..self }
    }
}

/// Connection parameters handed through to the HDFS client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HdfsParams {
    pub name_node_uri: String,
    pub username: Option<String>,
    pub kerb_ticket_cache_path: Option<String>,
}

impl Default for HdfsParams {
    fn default() -> Self {
        Self {
            name_node_uri: "hdfs://localhost:9000".to_string(),
            username: None,
            kerb_ticket_cache_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum S3Scheme {
    Http,
    Https,
}

impl S3Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            S3Scheme::Http => "http",
            S3Scheme::Https => "https",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Params {
    pub region: String,
    pub scheme: S3Scheme,
    /// `host:port` of an S3-compatible service; the region's default
    /// endpoint when unset.
    pub endpoint_override: Option<String>,
    /// Virtual-hosted addressing; disable for path-style services.
    pub use_virtual_addressing: bool,
    /// Write-buffer threshold per object; also the multipart part size.
    pub file_buffer_size: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for S3Params {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            scheme: S3Scheme::Https,
            endpoint_override: None,
            use_virtual_addressing: true,
            file_buffer_size: DEFAULT_FILE_BUFFER_SIZE,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl S3Params {
    pub fn region(self, region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..self
        }
    }

    pub fn scheme(self, scheme: S3Scheme) -> Self {
        Self { scheme, ..self }
    }

    pub fn endpoint_override(self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint_override: Some(endpoint.into()),
            ..self
        }
    }

    pub fn use_virtual_addressing(self, use_virtual_addressing: bool) -> Self {
        Self {
            use_virtual_addressing,
            ..self
        }
    }

    pub fn file_buffer_size(self, file_buffer_size: u64) -> Self {
        Self {
            file_buffer_size,
            ..self
        }
    }
}

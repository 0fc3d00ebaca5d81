//! URI values addressing VFS entities.
//!
//! The scheme is decided once at construction and never re-derived;
//! everything after it (absolute vs relative, trailing separators) is a
//! property of the path component. Bare host paths are promoted to
//! `file://` URIs so that every `Uri` is scheme-qualified.

use std::cmp::Ordering;
use std::fmt;

pub(crate) const FILE_SCHEME: &str = "file://";
pub(crate) const HDFS_SCHEME: &str = "hdfs://";
pub(crate) const S3_SCHEME: &str = "s3://";

/// Storage scheme a URI routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    File,
    Hdfs,
    S3,
    /// Syntactically a URI, but no backend claims it.
    Other,
}

/// An address understood by the VFS.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    raw: String,
    scheme: Scheme,
}

impl Uri {
    /// Classify `input` and normalize bare local paths to `file://` form.
    pub fn new(input: impl Into<String>) -> Self {
        let input = input.into();
        let (raw, scheme) = if input.starts_with(FILE_SCHEME) {
            (input, Scheme::File)
        } else if input.starts_with(HDFS_SCHEME) {
            (input, Scheme::Hdfs)
        } else if input.starts_with(S3_SCHEME) {
            (input, Scheme::S3)
        } else if input.contains("://") {
            (input, Scheme::Other)
        } else {
            (abs_path(&input), Scheme::File)
        };
        Self { raw, scheme }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn is_file(&self) -> bool {
        self.scheme == Scheme::File
    }

    pub fn is_hdfs(&self) -> bool {
        self.scheme == Scheme::Hdfs
    }

    pub fn is_s3(&self) -> bool {
        self.scheme == Scheme::S3
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Everything after `scheme://`.
    fn scheme_stripped(&self) -> &str {
        match self.raw.find("://") {
            Some(idx) => &self.raw[idx + 3..],
            None => &self.raw,
        }
    }

    /// The authority component (`host:port` for HDFS, the bucket for S3,
    /// empty for `file:///...`).
    pub fn authority(&self) -> &str {
        let rest = self.scheme_stripped();
        match rest.find('/') {
            Some(idx) => &rest[..idx],
            None => rest,
        }
    }

    /// The scheme-stripped path.
    ///
    /// `file://` URIs yield a host-native path, `hdfs://` URIs yield the
    /// authority-stripped namenode path, `s3://` URIs yield `bucket/key`.
    pub fn path(&self) -> &str {
        match self.scheme {
            Scheme::File => {
                let path = &self.raw[FILE_SCHEME.len()..];
                #[cfg(windows)]
                {
                    // file:///C:/... carries the drive behind a leading slash.
                    let bytes = path.as_bytes();
                    if bytes.len() >= 3
                        && bytes[0] == b'/'
                        && bytes[1].is_ascii_alphabetic()
                        && bytes[2] == b':'
                    {
                        return &path[1..];
                    }
                }
                path
            }
            Scheme::Hdfs => {
                let rest = self.scheme_stripped();
                match rest.find('/') {
                    Some(idx) => &rest[idx..],
                    None => "/",
                }
            }
            Scheme::S3 | Scheme::Other => self.scheme_stripped(),
        }
    }

    /// S3 bucket name; empty for non-S3 URIs.
    pub fn bucket(&self) -> &str {
        match self.scheme {
            Scheme::S3 => self.authority(),
            _ => "",
        }
    }

    /// S3 object key (no leading separator); empty for `s3://bucket`.
    pub fn key(&self) -> &str {
        match self.scheme {
            Scheme::S3 => {
                let rest = self.scheme_stripped();
                match rest.find('/') {
                    Some(idx) => &rest[idx + 1..],
                    None => "",
                }
            }
            _ => "",
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ls output is sorted byte-wise over the full URI string.
impl Ord for Uri {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for Uri {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Normalize `path` into URI form. Scheme-qualified inputs pass through
/// untouched; bare host paths are made absolute (against the process cwd),
/// lexically resolved and prefixed with `file://`.
pub(crate) fn abs_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix(FILE_SCHEME) {
        return format!("{FILE_SCHEME}{}", normalize_local(rest));
    }
    if path.contains("://") {
        return path.to_string();
    }
    #[cfg(windows)]
    if is_win_path(path) {
        return format!("{FILE_SCHEME}/{}", normalize_win(path));
    }
    format!("{FILE_SCHEME}{}", normalize_local(path))
}

/// Lexical resolution of `.`/`..` and duplicate separators; no filesystem
/// access beyond a cwd lookup for relative inputs.
fn normalize_local(path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => format!("{}/{}", cwd.display(), path),
            Err(_) => format!("/{path}"),
        }
    };
    let mut parts: Vec<&str> = Vec::new();
    for seg in joined.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            seg => parts.push(seg),
        }
    }
    let mut out = String::from("/");
    out.push_str(&parts.join("/"));
    out
}

#[cfg(windows)]
fn is_win_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
        || path.starts_with("\\\\")
}

#[cfg(windows)]
fn normalize_win(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let mut parts: Vec<&str> = Vec::new();
    for seg in forward.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            seg => parts.push(seg),
        }
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_is_decided_at_construction() {
        assert!(Uri::new("file:///tmp/x").is_file());
        assert!(Uri::new("hdfs://namenode:9000/a/b").is_hdfs());
        assert!(Uri::new("s3://bucket/key").is_s3());
        assert_eq!(Uri::new("gcs://bucket/key").scheme(), Scheme::Other);
    }

    #[test]
    fn bare_paths_become_file_uris() {
        let uri = Uri::new("/tmp/data/chunk");
        assert!(uri.is_file());
        assert_eq!(uri.as_str(), "file:///tmp/data/chunk");
        assert_eq!(uri.path(), "/tmp/data/chunk");
    }

    #[test]
    fn abs_path_resolves_lexically() {
        assert_eq!(abs_path("file:///a/b/../c"), "file:///a/c");
        assert_eq!(abs_path("/x/./y//z"), "file:///x/y/z");
        assert_eq!(abs_path("s3://bucket/a/../b"), "s3://bucket/a/../b");
        assert_eq!(abs_path("hdfs://nn/a"), "hdfs://nn/a");
    }

    #[test]
    fn abs_path_joins_relative_against_cwd() {
        let got = abs_path("some/rel");
        assert!(got.starts_with(FILE_SCHEME));
        assert!(got.ends_with("/some/rel"));
    }

    #[test]
    fn hdfs_authority_and_path() {
        let uri = Uri::new("hdfs://namenode:9000/warehouse/t1");
        assert_eq!(uri.authority(), "namenode:9000");
        assert_eq!(uri.path(), "/warehouse/t1");
        assert_eq!(Uri::new("hdfs://namenode:9000").path(), "/");
    }

    #[test]
    fn s3_bucket_and_key() {
        let uri = Uri::new("s3://bucket/a/b/c");
        assert_eq!(uri.bucket(), "bucket");
        assert_eq!(uri.key(), "a/b/c");
        assert_eq!(Uri::new("s3://bucket").key(), "");
    }

    #[test]
    fn ordering_is_bytewise_on_the_raw_string() {
        let mut uris = vec![
            Uri::new("file:///b"),
            Uri::new("file:///a/z"),
            Uri::new("file:///a"),
        ];
        uris.sort();
        let raw: Vec<&str> = uris.iter().map(Uri::as_str).collect();
        assert_eq!(raw, vec!["file:///a", "file:///a/z", "file:///b"]);
    }
}

//! End-to-end tests over the local backend.

use spanfs::{FileLock, Filesystem, Uri, Vfs, VfsError, VfsMode, VfsParams};
use tempfile::TempDir;

async fn vfs_with(max_parallel_ops: u64, min_parallel_size: u64) -> Vfs {
    let mut vfs = Vfs::new();
    vfs.init(
        VfsParams::default()
            .max_parallel_ops(max_parallel_ops)
            .min_parallel_size(min_parallel_size),
    )
    .await
    .unwrap();
    vfs
}

fn uri_for(dir: &TempDir, name: &str) -> Uri {
    Uri::new(format!("file://{}/{}", dir.path().display(), name))
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn round_trip() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let uri = uri_for(&dir, "x");

    vfs.touch(&uri).await.unwrap();
    vfs.open_file(&uri, VfsMode::Write).await.unwrap();
    vfs.write(&uri, b"hello").await.unwrap();
    vfs.close_file(&uri).await.unwrap();

    assert!(vfs.is_file(&uri).await.unwrap());
    assert_eq!(vfs.file_size(&uri).await.unwrap(), 5);

    let mut buf = vec![0u8; 5];
    vfs.read(&uri, 0, &mut buf).await.unwrap();
    assert_eq!(&buf, b"hello");
}

#[tokio::test]
async fn parallel_read_equals_sequential_content() {
    let dir = TempDir::new().unwrap();
    // min_parallel_size of 1024 forces a 4-way fan-out for this file.
    let vfs = vfs_with(4, 1024).await;
    let uri = uri_for(&dir, "big");
    let data = pattern(10_000);

    vfs.write(&uri, &data).await.unwrap();
    vfs.close_file(&uri).await.unwrap();

    let mut all = vec![0u8; data.len()];
    vfs.read(&uri, 0, &mut all).await.unwrap();
    assert_eq!(all, data);

    let mut mid = vec![0u8; 4096];
    vfs.read(&uri, 1234, &mut mid).await.unwrap();
    assert_eq!(mid, data[1234..1234 + 4096]);
}

#[tokio::test]
async fn zero_byte_read_succeeds_without_io() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let missing = uri_for(&dir, "missing");

    let mut buf = [0u8; 0];
    vfs.read(&missing, 0, &mut buf).await.unwrap();
}

#[tokio::test]
async fn read_past_end_fails() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let uri = uri_for(&dir, "short");

    vfs.write(&uri, b"abc").await.unwrap();
    vfs.close_file(&uri).await.unwrap();

    let mut buf = vec![0u8; 10];
    assert!(vfs.read(&uri, 0, &mut buf).await.is_err());
}

#[tokio::test]
async fn ls_is_sorted_and_lists_immediate_children_only() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;

    for name in ["b", "a", "c"] {
        vfs.touch(&uri_for(&dir, name)).await.unwrap();
    }
    let sub = uri_for(&dir, "sub");
    vfs.create_dir(&sub).await.unwrap();
    vfs.touch(&uri_for(&dir, "sub/inner")).await.unwrap();

    let parent = Uri::new(format!("file://{}", dir.path().display()));
    let children = vfs.ls(&parent).await.unwrap();

    let mut expected: Vec<String> = ["a", "b", "c", "sub"]
        .iter()
        .map(|n| format!("file://{}/{n}", dir.path().display()))
        .collect();
    expected.sort();
    let raw: Vec<&str> = children.iter().map(Uri::as_str).collect();
    assert_eq!(raw, expected);
}

#[tokio::test]
async fn touch_leaves_existing_content_alone() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let uri = uri_for(&dir, "kept");

    vfs.write(&uri, b"hello").await.unwrap();
    vfs.close_file(&uri).await.unwrap();
    vfs.touch(&uri).await.unwrap();
    vfs.touch(&uri).await.unwrap();
    assert_eq!(vfs.file_size(&uri).await.unwrap(), 5);

    let fresh = uri_for(&dir, "fresh");
    vfs.touch(&fresh).await.unwrap();
    assert_eq!(vfs.file_size(&fresh).await.unwrap(), 0);
}

#[tokio::test]
async fn move_file_replaces_an_existing_target() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let a = uri_for(&dir, "a");
    let b = uri_for(&dir, "b");

    vfs.write(&a, b"aaa").await.unwrap();
    vfs.close_file(&a).await.unwrap();
    vfs.write(&b, b"bb").await.unwrap();
    vfs.close_file(&b).await.unwrap();

    vfs.move_file(&a, &b).await.unwrap();
    assert!(!vfs.is_file(&a).await.unwrap());
    assert!(vfs.is_file(&b).await.unwrap());
    assert_eq!(vfs.file_size(&b).await.unwrap(), 3);
}

#[tokio::test]
async fn move_dir_renames_the_tree() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let old = uri_for(&dir, "old");
    let new = uri_for(&dir, "new");

    vfs.create_dir(&old).await.unwrap();
    vfs.touch(&uri_for(&dir, "old/inner")).await.unwrap();

    vfs.move_dir(&old, &new).await.unwrap();
    assert!(!vfs.is_dir(&old).await.unwrap());
    assert!(vfs.is_dir(&new).await.unwrap());
    assert!(vfs.is_file(&uri_for(&dir, "new/inner")).await.unwrap());
}

#[tokio::test]
async fn cross_scheme_move_is_rejected_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let local = uri_for(&dir, "x");
    vfs.touch(&local).await.unwrap();

    let remote = Uri::new("s3://bucket/x");
    let err = vfs.move_file(&local, &remote).await.unwrap_err();
    assert!(matches!(err, VfsError::CrossSchemeUnsupported { .. }));
    let err = vfs.move_dir(&local, &remote).await.unwrap_err();
    assert!(matches!(err, VfsError::CrossSchemeUnsupported { .. }));

    assert!(vfs.is_file(&local).await.unwrap());
}

#[tokio::test]
async fn open_mode_matrix() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;

    let missing = uri_for(&dir, "missing");
    let err = vfs.open_file(&missing, VfsMode::Read).await.unwrap_err();
    assert!(matches!(err, VfsError::NotFound { .. }));

    let existing = uri_for(&dir, "existing");
    vfs.write(&existing, b"data").await.unwrap();
    vfs.close_file(&existing).await.unwrap();
    vfs.open_file(&existing, VfsMode::Write).await.unwrap();
    assert!(!vfs.is_file(&existing).await.unwrap());

    vfs.touch(&existing).await.unwrap();
    vfs.open_file(&existing, VfsMode::Append).await.unwrap();

    let object = Uri::new("s3://bucket/k");
    let err = vfs.open_file(&object, VfsMode::Append).await.unwrap_err();
    #[cfg(feature = "s3")]
    assert!(matches!(err, VfsError::AppendUnsupported { .. }));
    #[cfg(not(feature = "s3"))]
    assert!(matches!(err, VfsError::FeatureNotBuilt { .. }));
}

#[tokio::test]
async fn operations_fail_before_init_and_after_shutdown() {
    let dir = TempDir::new().unwrap();
    let uri = uri_for(&dir, "x");

    let mut vfs = Vfs::new();
    let err = vfs.touch(&uri).await.unwrap_err();
    assert!(matches!(err, VfsError::NotInitialized));

    vfs.init(VfsParams::default()).await.unwrap();
    vfs.touch(&uri).await.unwrap();

    vfs.shutdown();
    let err = vfs.touch(&uri).await.unwrap_err();
    assert!(matches!(err, VfsError::NotInitialized));
    assert!(matches!(vfs.config(), Err(VfsError::NotInitialized)));
}

#[tokio::test]
async fn init_rejects_degenerate_params() {
    let mut vfs = Vfs::new();
    let err = vfs
        .init(VfsParams::default().max_parallel_ops(0))
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::Config(_)));

    let err = vfs
        .init(VfsParams::default().min_parallel_size(0))
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::Config(_)));

    let dir = TempDir::new().unwrap();
    let err = vfs.touch(&uri_for(&dir, "x")).await.unwrap_err();
    assert!(matches!(err, VfsError::NotInitialized));
}

#[tokio::test]
async fn unsupported_scheme_is_reported_as_such() {
    let vfs = vfs_with(4, 1024).await;
    let odd = Uri::new("gcs://bucket/object");

    let err = vfs.touch(&odd).await.unwrap_err();
    assert!(matches!(err, VfsError::UnsupportedScheme { .. }));
    let err = vfs.is_dir(&odd).await.unwrap_err();
    assert!(matches!(err, VfsError::UnsupportedScheme { .. }));
}

#[tokio::test]
async fn bucket_ops_reject_non_object_schemes() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let local = uri_for(&dir, "x");

    let err = vfs.create_bucket(&local).await.unwrap_err();
    assert!(matches!(err, VfsError::UnsupportedScheme { .. }));
    let err = vfs.is_bucket(&local).await.unwrap_err();
    assert!(matches!(err, VfsError::UnsupportedScheme { .. }));
}

#[cfg(not(feature = "s3"))]
#[tokio::test]
async fn s3_ops_report_feature_not_built() {
    let vfs = vfs_with(4, 1024).await;
    assert!(!vfs.supports_fs(Filesystem::S3));

    let bucket = Uri::new("s3://bucket");
    let err = vfs.create_bucket(&bucket).await.unwrap_err();
    assert!(matches!(
        err,
        VfsError::FeatureNotBuilt { fs: Filesystem::S3 }
    ));
    let err = vfs.touch(&Uri::new("s3://bucket/k")).await.unwrap_err();
    assert!(matches!(
        err,
        VfsError::FeatureNotBuilt { fs: Filesystem::S3 }
    ));
}

#[cfg(not(feature = "hdfs"))]
#[tokio::test]
async fn hdfs_ops_report_feature_not_built() {
    let vfs = vfs_with(4, 1024).await;
    assert!(!vfs.supports_fs(Filesystem::Hdfs));

    let err = vfs
        .create_dir(&Uri::new("hdfs://namenode:9000/dir"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VfsError::FeatureNotBuilt {
            fs: Filesystem::Hdfs
        }
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn the_host_local_backend_is_always_supported() {
    let vfs = Vfs::new();
    assert!(vfs.supports_fs(Filesystem::Posix));
    assert!(!vfs.supports_fs(Filesystem::Win));
}

#[tokio::test]
async fn create_and_remove_dir() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let sub = uri_for(&dir, "sub");

    vfs.create_dir(&sub).await.unwrap();
    vfs.create_dir(&sub).await.unwrap();
    assert!(vfs.is_dir(&sub).await.unwrap());
    assert!(!vfs.is_file(&sub).await.unwrap());

    vfs.touch(&uri_for(&dir, "sub/inner")).await.unwrap();
    vfs.remove_dir(&sub).await.unwrap();
    assert!(!vfs.is_dir(&sub).await.unwrap());

    let err = vfs.remove_dir(&sub).await.unwrap_err();
    assert!(matches!(err, VfsError::NotFound { .. }));
}

#[tokio::test]
async fn second_remove_file_reports_not_found() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let uri = uri_for(&dir, "x");

    vfs.touch(&uri).await.unwrap();
    vfs.remove_file(&uri).await.unwrap();
    let err = vfs.remove_file(&uri).await.unwrap_err();
    assert!(matches!(err, VfsError::NotFound { .. }));
}

#[tokio::test]
async fn file_size_of_a_directory_is_an_error() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let sub = uri_for(&dir, "sub");

    vfs.create_dir(&sub).await.unwrap();
    assert!(vfs.file_size(&sub).await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn advisory_locks_round_trip() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;
    let uri = uri_for(&dir, "lockfile");
    vfs.touch(&uri).await.unwrap();

    let exclusive = vfs.filelock_lock(&uri, false).await.unwrap();
    assert!(matches!(exclusive, FileLock::Local(_)));
    vfs.filelock_unlock(&uri, exclusive).await.unwrap();

    // Shared locks coexist.
    let first = vfs.filelock_lock(&uri, true).await.unwrap();
    let second = vfs.filelock_lock(&uri, true).await.unwrap();
    vfs.filelock_unlock(&uri, first).await.unwrap();
    vfs.filelock_unlock(&uri, second).await.unwrap();
}

#[cfg(feature = "s3")]
#[tokio::test]
async fn remote_locks_are_inert_tokens() {
    let vfs = vfs_with(4, 1024).await;
    let object = Uri::new("s3://bucket/k");

    let lock = vfs.filelock_lock(&object, false).await.unwrap();
    assert!(matches!(lock, FileLock::Remote));
    vfs.filelock_unlock(&object, lock).await.unwrap();
}

#[tokio::test]
async fn sync_accepts_files_and_directories() {
    let dir = TempDir::new().unwrap();
    let vfs = vfs_with(4, 1024).await;

    let file = uri_for(&dir, "f");
    vfs.write(&file, b"x").await.unwrap();
    vfs.sync(&file).await.unwrap();

    let sub = uri_for(&dir, "sub");
    vfs.create_dir(&sub).await.unwrap();
    vfs.sync(&sub).await.unwrap();
}

#[tokio::test]
async fn config_returns_the_init_snapshot() {
    let vfs = vfs_with(4, 2048).await;
    let params = vfs.config().unwrap();
    assert_eq!(params.max_parallel_ops, 4);
    assert_eq!(params.min_parallel_size, 2048);
}

#[tokio::test]
async fn abs_path_normalizes_local_paths() {
    assert_eq!(Vfs::abs_path("file:///a/b/../c"), "file:///a/c");
    assert_eq!(Vfs::abs_path("/x/./y"), "file:///x/y");
    assert_eq!(Vfs::abs_path("s3://bucket/key"), "s3://bucket/key");
    assert_eq!(
        Vfs::abs_path("hdfs://namenode:9000/a"),
        "hdfs://namenode:9000/a"
    );
}

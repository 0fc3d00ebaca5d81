//! Live-endpoint object-store tests.
//!
//! These run against a real S3-compatible service (MinIO, localstack);
//! point `SPANFS_S3_ENDPOINT` at it and run with `--ignored`.

#![cfg(feature = "s3")]

use spanfs::{S3Params, S3Scheme, Uri, Vfs, VfsParams};

async fn vfs_against_endpoint() -> Vfs {
    let endpoint = std::env::var("SPANFS_S3_ENDPOINT").expect("SPANFS_S3_ENDPOINT not set");
    let mut vfs = Vfs::new();
    vfs.init(
        VfsParams::default().s3(
            S3Params::default()
                .endpoint_override(endpoint)
                .scheme(S3Scheme::Http)
                .use_virtual_addressing(false),
        ),
    )
    .await
    .unwrap();
    vfs
}

#[tokio::test]
#[ignore = "needs a live S3-compatible endpoint"]
async fn directory_emulation_round_trip() {
    let vfs = vfs_against_endpoint().await;
    let bucket = Uri::new("s3://spanfs-test");
    if !vfs.is_bucket(&bucket).await.unwrap() {
        vfs.create_bucket(&bucket).await.unwrap();
    }
    vfs.empty_bucket(&bucket).await.unwrap();

    let dir = Uri::new("s3://spanfs-test/a");
    vfs.create_dir(&dir).await.unwrap();
    // Nothing under the prefix yet, so the emulated directory is absent.
    assert!(!vfs.is_dir(&dir).await.unwrap());

    let key = Uri::new("s3://spanfs-test/a/k");
    vfs.touch(&key).await.unwrap();
    assert!(vfs.is_dir(&dir).await.unwrap());
    assert!(vfs.is_file(&key).await.unwrap());

    let children = vfs.ls(&dir).await.unwrap();
    let raw: Vec<&str> = children.iter().map(Uri::as_str).collect();
    assert_eq!(raw, vec!["s3://spanfs-test/a/k"]);

    vfs.empty_bucket(&bucket).await.unwrap();
    assert!(vfs.is_empty_bucket(&bucket).await.unwrap());
}

#[tokio::test]
#[ignore = "needs a live S3-compatible endpoint"]
async fn buffered_writes_flush_on_close() {
    let vfs = vfs_against_endpoint().await;
    let bucket = Uri::new("s3://spanfs-test");
    if !vfs.is_bucket(&bucket).await.unwrap() {
        vfs.create_bucket(&bucket).await.unwrap();
    }

    let object = Uri::new("s3://spanfs-test/blob");
    vfs.write(&object, b"hello ").await.unwrap();
    vfs.write(&object, b"world").await.unwrap();
    // Not visible until the buffered object is flushed on close.
    vfs.close_file(&object).await.unwrap();

    assert_eq!(vfs.file_size(&object).await.unwrap(), 11);
    let mut buf = vec![0u8; 11];
    vfs.read(&object, 0, &mut buf).await.unwrap();
    assert_eq!(&buf, b"hello world");

    let moved = Uri::new("s3://spanfs-test/blob2");
    vfs.move_file(&object, &moved).await.unwrap();
    assert!(!vfs.is_file(&object).await.unwrap());
    assert!(vfs.is_file(&moved).await.unwrap());

    vfs.remove_file(&moved).await.unwrap();
}

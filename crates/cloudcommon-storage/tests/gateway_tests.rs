use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use cloudcommon_storage::{BlobGateway, InMemoryProvider, StorageConfig, StorageProvider};
use tokio::io::AsyncWriteExt;

async fn setup() -> (Arc<InMemoryProvider>, BlobGateway) {
    let provider = Arc::new(InMemoryProvider::new());
    provider.create_bucket("uploads").await;
    provider.create_bucket("openag-v1-images").await;
    let gateway = BlobGateway::new(provider.clone(), StorageConfig::default());
    (provider, gateway)
}

#[tokio::test]
async fn test_upload_then_download_round_trip() {
    let (_, gateway) = setup().await;
    let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    let url = gateway
        .upload(&payload[..], "uploads", "frame.png", None)
        .await
        .expect("upload should succeed");
    assert_eq!(url, "https://storage.googleapis.com/uploads/frame.png");

    let downloaded = gateway.download("uploads", "frame.png").await.unwrap();
    assert_eq!(downloaded, Bytes::from(payload));
}

#[tokio::test]
async fn test_exists_tracks_upload() {
    let (_, gateway) = setup().await;

    assert!(!gateway.exists("uploads", "missing").await);
    assert!(!gateway.exists("no-such-bucket", "missing").await);

    gateway
        .upload_from_string("{\"temp\": 21.5}", "uploads", "missing", None)
        .await
        .unwrap();
    assert!(gateway.exists("uploads", "missing").await);
}

#[tokio::test]
async fn test_file_upload_and_download_via_disk() {
    let (_, gateway) = setup().await;
    let dir = tempfile::tempdir().unwrap();

    let src_path = dir.path().join("capture.jpg");
    let mut src = tokio::fs::File::create(&src_path).await.unwrap();
    src.write_all(b"\xff\xd8\xff\xe0jpeg-ish").await.unwrap();
    src.flush().await.unwrap();
    drop(src);

    let file = tokio::fs::File::open(&src_path).await.unwrap();
    gateway
        .upload(file, "uploads", "capture.jpg", Some("image/jpeg"))
        .await
        .unwrap();

    let out_path = dir.path().join("copy.jpg");
    let mut out = tokio::fs::File::create(&out_path).await.unwrap();
    assert!(gateway.download_to(&mut out, "uploads", "capture.jpg").await);
    drop(out);

    let original = tokio::fs::read(&src_path).await.unwrap();
    let copy = tokio::fs::read(&out_path).await.unwrap();
    assert_eq!(original, copy);
}

#[tokio::test]
async fn test_upload_move_and_sweep_lifecycle() {
    let (provider, gateway) = setup().await;
    let morning = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    provider.set_time(morning).await;

    gateway
        .upload_bytes(Bytes::from_static(b"keep"), "uploads", "keep.png", None)
        .await
        .unwrap();
    gateway
        .upload_bytes(Bytes::from_static(b"abandoned"), "uploads", "abandoned.png", None)
        .await
        .unwrap();

    let url = gateway
        .move_blob("uploads", "openag-v1-images", "keep.png")
        .await
        .unwrap();
    assert_eq!(url, provider.public_url("openag-v1-images", "keep.png"));
    assert!(!gateway.exists("uploads", "keep.png").await);
    assert!(gateway.exists("openag-v1-images", "keep.png").await);
    assert!(provider.is_public("openag-v1-images", "keep.png").await);

    let report = gateway
        .expire_stale_blobs_at(
            "uploads",
            Duration::from_secs(2 * 60 * 60),
            morning + chrono::Duration::hours(3),
        )
        .await;
    assert_eq!(report.deleted, 1);
    assert!(provider.blob_names("uploads").await.is_empty());

    // Moving again finds nothing in the source
    assert!(gateway
        .move_blob("uploads", "openag-v1-images", "keep.png")
        .await
        .is_none());
}

#[tokio::test]
async fn test_latest_backup_with_custom_prefix() {
    let provider = Arc::new(InMemoryProvider::new());
    provider.create_bucket("farm-backup-2022-01").await;
    provider.create_bucket("farm-backup-2022-02").await;
    provider.create_bucket("openag-v1-backup-2030").await;

    let config = StorageConfig {
        backup_bucket_prefix: "farm-backup-".to_string(),
        ..Default::default()
    };
    let gateway = BlobGateway::new(provider, config);

    assert_eq!(
        gateway.latest_backup_bucket().await.as_deref(),
        Some("farm-backup-2022-02")
    );
}

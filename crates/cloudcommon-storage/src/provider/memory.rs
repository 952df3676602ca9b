//! In-memory storage provider
//!
//! Deterministic stand-in for the real object store. Buckets keep creation
//! order, the clock can be pinned and individual operations can be made to
//! fail, which is what the gateway tests need.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{path_style_url, BlobInfo, BucketInfo, StorageProvider};
use crate::error::StorageError;
use crate::services::DEFAULT_PUBLIC_BASE_URL;

#[derive(Debug, Clone)]
struct StoredBlob {
    body: Bytes,
    content_type: String,
    created_at: DateTime<Utc>,
    public: bool,
}

#[derive(Debug, Default)]
struct MemoryBucket {
    name: String,
    created_at: Option<DateTime<Utc>>,
    blobs: BTreeMap<String, StoredBlob>,
}

#[derive(Debug, Default)]
struct Faults {
    listing: bool,
    copy: bool,
    make_public: bool,
    delete: HashSet<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: Vec<MemoryBucket>,
    clock: Option<DateTime<Utc>>,
    faults: Faults,
}

impl MemoryState {
    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    fn bucket(&self, name: &str) -> Result<&MemoryBucket, StorageError> {
        self.buckets
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| StorageError::NotFound(format!("bucket '{}'", name)))
    }

    fn bucket_mut(&mut self, name: &str) -> Result<&mut MemoryBucket, StorageError> {
        self.buckets
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| StorageError::NotFound(format!("bucket '{}'", name)))
    }
}

fn blob_info(bucket: &str, name: &str, blob: &StoredBlob) -> BlobInfo {
    BlobInfo {
        bucket: bucket.to_string(),
        name: name.to_string(),
        content_type: Some(blob.content_type.clone()),
        size: blob.body.len() as u64,
        created_at: Some(blob.created_at),
    }
}

/// In-memory implementation of [`StorageProvider`]
pub struct InMemoryProvider {
    public_base_url: String,
    state: RwLock<MemoryState>,
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self {
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            state: RwLock::new(MemoryState::default()),
        }
    }

    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = base.into();
        self
    }

    /// Create an empty bucket stamped with the current clock. No-op if it exists.
    pub async fn create_bucket(&self, name: &str) {
        let mut state = self.state.write().await;
        if state.bucket(name).is_ok() {
            return;
        }
        let created_at = Some(state.now());
        state.buckets.push(MemoryBucket {
            name: name.to_string(),
            created_at,
            blobs: BTreeMap::new(),
        });
    }

    /// Seed a blob with an explicit creation time, creating the bucket if needed
    pub async fn insert_blob(
        &self,
        bucket: &str,
        name: &str,
        body: impl Into<Bytes>,
        created_at: DateTime<Utc>,
    ) {
        self.create_bucket(bucket).await;
        let mut state = self.state.write().await;
        if let Ok(b) = state.bucket_mut(bucket) {
            b.blobs.insert(
                name.to_string(),
                StoredBlob {
                    body: body.into(),
                    content_type: "application/octet-stream".to_string(),
                    created_at,
                    public: false,
                },
            );
        }
    }

    /// Pin the provider clock used for new blobs and buckets
    pub async fn set_time(&self, now: DateTime<Utc>) {
        self.state.write().await.clock = Some(now);
    }

    pub async fn fail_listing(&self, fail: bool) {
        self.state.write().await.faults.listing = fail;
    }

    pub async fn fail_copies(&self, fail: bool) {
        self.state.write().await.faults.copy = fail;
    }

    pub async fn fail_make_public(&self, fail: bool) {
        self.state.write().await.faults.make_public = fail;
    }

    /// Make every delete of `name` fail, in any bucket
    pub async fn fail_delete_of(&self, name: &str) {
        self.state.write().await.faults.delete.insert(name.to_string());
    }

    /// Blob names currently stored in a bucket, sorted
    pub async fn blob_names(&self, bucket: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .bucket(bucket)
            .map(|b| b.blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn is_public(&self, bucket: &str, name: &str) -> bool {
        let state = self.state.read().await;
        state
            .bucket(bucket)
            .ok()
            .and_then(|b| b.blobs.get(name))
            .map(|blob| blob.public)
            .unwrap_or(false)
    }
}

#[async_trait]
impl StorageProvider for InMemoryProvider {
    async fn list_buckets(&self, prefix: &str) -> Result<Vec<BucketInfo>, StorageError> {
        let state = self.state.read().await;
        if state.faults.listing {
            return Err(StorageError::Transient("listing unavailable".to_string()));
        }
        Ok(state
            .buckets
            .iter()
            .filter(|b| b.name.starts_with(prefix))
            .map(|b| BucketInfo {
                name: b.name.clone(),
                created_at: b.created_at,
            })
            .collect())
    }

    async fn list_blobs(&self, bucket: &str) -> Result<Vec<BlobInfo>, StorageError> {
        let state = self.state.read().await;
        if state.faults.listing {
            return Err(StorageError::Transient("listing unavailable".to_string()));
        }
        let b = state.bucket(bucket)?;
        Ok(b.blobs
            .iter()
            .map(|(name, blob)| blob_info(bucket, name, blob))
            .collect())
    }

    async fn get_blob(&self, bucket: &str, name: &str) -> Result<Option<BlobInfo>, StorageError> {
        let state = self.state.read().await;
        let b = state.bucket(bucket)?;
        Ok(b.blobs.get(name).map(|blob| blob_info(bucket, name, blob)))
    }

    async fn put_blob(
        &self,
        bucket: &str,
        name: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<BlobInfo, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidInput("blob name is empty".to_string()));
        }
        let mut state = self.state.write().await;
        let now = state.now();
        let b = state.bucket_mut(bucket)?;
        let blob = StoredBlob {
            body,
            content_type: content_type.to_string(),
            created_at: now,
            public: false,
        };
        let info = blob_info(bucket, name, &blob);
        b.blobs.insert(name.to_string(), blob);
        Ok(info)
    }

    async fn copy_blob(
        &self,
        src_bucket: &str,
        dest_bucket: &str,
        name: &str,
    ) -> Result<BlobInfo, StorageError> {
        let mut state = self.state.write().await;
        if state.faults.copy {
            return Err(StorageError::Transient(format!(
                "copy of '{}' interrupted",
                name
            )));
        }
        let now = state.now();
        let source = state
            .bucket(src_bucket)?
            .blobs
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", src_bucket, name)))?;

        let copy = StoredBlob {
            created_at: now,
            public: false,
            ..source
        };
        let info = blob_info(dest_bucket, name, &copy);
        state
            .bucket_mut(dest_bucket)?
            .blobs
            .insert(name.to_string(), copy);
        Ok(info)
    }

    async fn delete_blob(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if state.faults.delete.contains(name) {
            return Err(StorageError::Transient(format!(
                "delete of '{}' rejected",
                name
            )));
        }
        let b = state.bucket_mut(bucket)?;
        b.blobs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, name)))
    }

    async fn download(&self, bucket: &str, name: &str) -> Result<Bytes, StorageError> {
        let state = self.state.read().await;
        state
            .bucket(bucket)?
            .blobs
            .get(name)
            .map(|blob| blob.body.clone())
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, name)))
    }

    async fn make_public(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if state.faults.make_public {
            return Err(StorageError::PermissionDenied(format!(
                "cannot change ACL of {}/{}",
                bucket, name
            )));
        }
        let blob = state
            .bucket_mut(bucket)?
            .blobs
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, name)))?;
        blob.public = true;
        Ok(())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        path_style_url(&self.public_base_url, bucket, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_buckets_keep_creation_order() {
        let provider = InMemoryProvider::new();
        provider.create_bucket("openag-v1-backup-2021").await;
        provider.create_bucket("openag-v1-images").await;
        provider.create_bucket("openag-v1-backup-2020").await;

        let names: Vec<String> = provider
            .list_buckets("openag-v1-backup-")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["openag-v1-backup-2021", "openag-v1-backup-2020"]);
    }

    #[tokio::test]
    async fn test_put_uses_pinned_clock() {
        let provider = InMemoryProvider::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        provider.set_time(now).await;
        provider.create_bucket("uploads").await;

        let info = provider
            .put_blob("uploads", "a.json", Bytes::from_static(b"{}"), "application/json")
            .await
            .unwrap();
        assert_eq!(info.created_at, Some(now));
        assert_eq!(info.size, 2);
        assert_eq!(info.content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_put_into_missing_bucket() {
        let provider = InMemoryProvider::new();
        let err = provider
            .put_blob("nope", "a", Bytes::new(), "text/plain")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_copy_does_not_carry_acl() {
        let provider = InMemoryProvider::new();
        provider.create_bucket("src").await;
        provider.create_bucket("dest").await;
        provider
            .put_blob("src", "x", Bytes::from_static(b"1"), "text/plain")
            .await
            .unwrap();
        provider.make_public("src", "x").await.unwrap();

        provider.copy_blob("src", "dest", "x").await.unwrap();
        assert!(provider.is_public("src", "x").await);
        assert!(!provider.is_public("dest", "x").await);
    }

    #[tokio::test]
    async fn test_delete_fault_is_per_name() {
        let provider = InMemoryProvider::new();
        let t = Utc::now();
        provider.insert_blob("b", "keep", b"k".to_vec(), t).await;
        provider.insert_blob("b", "gone", b"g".to_vec(), t).await;
        provider.fail_delete_of("keep").await;

        assert!(provider.delete_blob("b", "keep").await.is_err());
        provider.delete_blob("b", "gone").await.unwrap();
        assert_eq!(provider.blob_names("b").await, vec!["keep"]);
    }

    #[test]
    fn test_public_url_base() {
        let provider = InMemoryProvider::new().with_public_base_url("http://localhost:9000");
        assert_eq!(
            provider.public_url("images", "cat.png"),
            "http://localhost:9000/images/cat.png"
        );
    }
}

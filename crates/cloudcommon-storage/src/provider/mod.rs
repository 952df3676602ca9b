//! Object storage provider abstraction
//!
//! The gateway talks to the storage service only through [`StorageProvider`],
//! so a real S3-compatible backend and the in-memory fake are interchangeable.

mod memory;
mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::StorageError;

pub use memory::InMemoryProvider;
pub use s3::S3Provider;

/// A bucket as reported by the provider listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    /// Creation timestamp, when the provider reports one
    pub created_at: Option<DateTime<Utc>>,
}

/// Metadata about a stored blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    /// Bucket the blob lives in
    pub bucket: String,
    /// Blob name (object key)
    pub name: String,
    /// Content type, not always present in listings
    pub content_type: Option<String>,
    /// Size in bytes
    pub size: u64,
    /// Creation timestamp set by the provider
    pub created_at: Option<DateTime<Utc>>,
}

impl BlobInfo {
    /// Age of the blob relative to `now`, if the creation time is known
    pub fn age_at(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.created_at.map(|created| now - created)
    }
}

/// Trait for object storage operations (mockable for testing)
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// List buckets whose name starts with `prefix`, in provider order
    async fn list_buckets(&self, prefix: &str) -> Result<Vec<BucketInfo>, StorageError>;

    /// List every blob in a bucket
    async fn list_blobs(&self, bucket: &str) -> Result<Vec<BlobInfo>, StorageError>;

    /// Fetch blob metadata, `Ok(None)` when the blob does not exist
    async fn get_blob(&self, bucket: &str, name: &str) -> Result<Option<BlobInfo>, StorageError>;

    /// Write a blob, overwriting any existing blob with the same name
    async fn put_blob(
        &self,
        bucket: &str,
        name: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<BlobInfo, StorageError>;

    /// Copy a blob into another bucket under the same name
    async fn copy_blob(
        &self,
        src_bucket: &str,
        dest_bucket: &str,
        name: &str,
    ) -> Result<BlobInfo, StorageError>;

    /// Delete a blob
    async fn delete_blob(&self, bucket: &str, name: &str) -> Result<(), StorageError>;

    /// Download the full contents of a blob
    async fn download(&self, bucket: &str, name: &str) -> Result<Bytes, StorageError>;

    /// Grant anonymous read access to a blob
    async fn make_public(&self, bucket: &str, name: &str) -> Result<(), StorageError>;

    /// Public URL for a blob. Pure, no I/O.
    fn public_url(&self, bucket: &str, name: &str) -> String;
}

/// Percent-encode an object key segment by segment, keeping `/` separators
pub(crate) fn encode_key(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Build a path-style public URL: `{base}/{bucket}/{key}`
pub(crate) fn path_style_url(base: &str, bucket: &str, name: &str) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        bucket,
        encode_key(name)
    )
}

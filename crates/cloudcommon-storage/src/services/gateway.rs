//! Blob Store Gateway
//!
//! Every public operation absorbs provider failures: the error is logged and
//! the caller gets `None`/`false` back. Provider errors are matched explicitly
//! so not-found cases read differently from outages in the logs.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

use super::config::StorageConfig;
use crate::error::StorageError;
use crate::provider::StorageProvider;

/// Content type used by [`BlobGateway::upload`] when none is given
pub const DEFAULT_UPLOAD_CONTENT_TYPE: &str = "image/png";
/// Content type used by [`BlobGateway::upload_from_string`] when none is given
pub const DEFAULT_STRING_CONTENT_TYPE: &str = "application/json";

/// Outcome of a stale file sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Blobs listed in the bucket
    pub scanned: usize,
    /// Blobs at or over the age limit
    pub expired: usize,
    /// Expired blobs actually removed
    pub deleted: usize,
    /// Expired blobs whose delete failed
    pub failed: usize,
    /// Blobs without a creation time
    pub skipped: usize,
}

/// Gateway over an object storage provider
pub struct BlobGateway {
    provider: Arc<dyn StorageProvider>,
    config: StorageConfig,
}

impl BlobGateway {
    pub fn new(provider: Arc<dyn StorageProvider>, config: StorageConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Name of the most recent backup bucket, `None` if there is none or listing failed
    ///
    /// The provider's list order is trusted: the last matching bucket is the latest.
    pub async fn latest_backup_bucket(&self) -> Option<String> {
        let prefix = &self.config.backup_bucket_prefix;

        match self.provider.list_buckets(prefix).await {
            Ok(buckets) => match buckets.last() {
                Some(bucket) => {
                    debug!("Latest backup bucket is {}", bucket.name);
                    Some(bucket.name.clone())
                }
                None => {
                    error!("No backup buckets with prefix '{}'", prefix);
                    None
                }
            },
            Err(e) => {
                log_failure("list backup buckets", &e);
                None
            }
        }
    }

    /// Delete every blob in `bucket` at least `max_age` old
    pub async fn expire_stale_blobs(&self, bucket: &str, max_age: Duration) -> SweepReport {
        self.expire_stale_blobs_at(bucket, max_age, Utc::now()).await
    }

    /// Sweep using an explicit clock
    ///
    /// Best effort: a failed delete is counted and logged, and the sweep moves on.
    pub async fn expire_stale_blobs_at(
        &self,
        bucket: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let blobs = match self.provider.list_blobs(bucket).await {
            Ok(blobs) => blobs,
            Err(e) => {
                log_failure(&format!("list blobs in '{}'", bucket), &e);
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            scanned: blobs.len(),
            ..Default::default()
        };

        for blob in blobs {
            let Some(age) = blob.age_at(now) else {
                debug!("Skipping {}/{}: no creation time", bucket, blob.name);
                report.skipped += 1;
                continue;
            };

            // Negative ages (clock skew) never expire
            if !age.to_std().is_ok_and(|age| age >= max_age) {
                continue;
            }
            report.expired += 1;

            match self.provider.delete_blob(bucket, &blob.name).await {
                // NotFound: someone else removed it first
                Ok(()) | Err(StorageError::NotFound(_)) => {
                    info!(
                        "Removed stale file {}/{} (age {}s)",
                        bucket,
                        blob.name,
                        age.num_seconds()
                    );
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(
                        "Failed to remove stale file {}/{} (age {}s): {}",
                        bucket,
                        blob.name,
                        age.num_seconds(),
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            "Stale sweep of '{}': scanned={} expired={} deleted={} failed={} skipped={}",
            bucket, report.scanned, report.expired, report.deleted, report.failed, report.skipped
        );

        report
    }

    /// Move a blob to another bucket and return its new public URL
    ///
    /// Returns `None` when the source is missing or the copy fails. Once the
    /// copy exists, failing to mark it public or to delete the source only
    /// produces a warning. Moving within one bucket leaves the blob in place
    /// and only publishes it.
    pub async fn move_blob(
        &self,
        src_bucket: &str,
        dest_bucket: &str,
        name: &str,
    ) -> Option<String> {
        match self.provider.get_blob(src_bucket, name).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                error!("File {} not found in bucket {}", name, src_bucket);
                return None;
            }
            Err(e) => {
                log_failure(&format!("look up {}/{}", src_bucket, name), &e);
                return None;
            }
        }

        // Copy and delete would target the same key and destroy the blob
        if src_bucket == dest_bucket {
            if let Err(e) = self.provider.make_public(dest_bucket, name).await {
                warn!("Could not make {}/{} public: {}", dest_bucket, name, e);
            }
            let url = self.provider.public_url(dest_bucket, name);
            debug!("{} is already in '{}', nothing to move", name, dest_bucket);
            return Some(url);
        }

        if let Err(e) = self.provider.copy_blob(src_bucket, dest_bucket, name).await {
            log_failure(
                &format!("copy {}/{} to '{}'", src_bucket, name, dest_bucket),
                &e,
            );
            return None;
        }

        if let Err(e) = self.provider.make_public(dest_bucket, name).await {
            warn!("Could not make {}/{} public: {}", dest_bucket, name, e);
        }

        if let Err(e) = self.provider.delete_blob(src_bucket, name).await {
            warn!(
                "Copied {} to '{}' but could not delete the source: {}",
                name, dest_bucket, e
            );
        }

        let url = self.provider.public_url(dest_bucket, name);
        info!("Moved {} from '{}' to {}", name, src_bucket, url);
        Some(url)
    }

    /// Upload everything readable from `reader` and return the public URL
    pub async fn upload<R>(
        &self,
        mut reader: R,
        bucket: &str,
        name: &str,
        content_type: Option<&str>,
    ) -> Option<String>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buf = Vec::new();
        if let Err(e) = reader.read_to_end(&mut buf).await {
            error!("Failed to read upload body for {}/{}: {}", bucket, name, e);
            return None;
        }

        self.upload_bytes(
            Bytes::from(buf),
            bucket,
            name,
            Some(content_type.unwrap_or(DEFAULT_UPLOAD_CONTENT_TYPE)),
        )
        .await
    }

    /// Upload an in-memory buffer and return the public URL
    pub async fn upload_bytes(
        &self,
        body: Bytes,
        bucket: &str,
        name: &str,
        content_type: Option<&str>,
    ) -> Option<String> {
        let content_type = content_type.unwrap_or(DEFAULT_UPLOAD_CONTENT_TYPE);

        match self.provider.put_blob(bucket, name, body, content_type).await {
            Ok(_) => {
                let url = self.provider.public_url(bucket, name);
                debug!("Uploaded {} to {}", name, url);
                Some(url)
            }
            Err(e) => {
                log_failure(&format!("upload {}/{}", bucket, name), &e);
                None
            }
        }
    }

    /// Upload text content (JSON by default) and return the public URL
    pub async fn upload_from_string(
        &self,
        content: &str,
        bucket: &str,
        name: &str,
        content_type: Option<&str>,
    ) -> Option<String> {
        self.upload_bytes(
            Bytes::copy_from_slice(content.as_bytes()),
            bucket,
            name,
            Some(content_type.unwrap_or(DEFAULT_STRING_CONTENT_TYPE)),
        )
        .await
    }

    /// Download a blob's contents
    pub async fn download(&self, bucket: &str, name: &str) -> Option<Bytes> {
        match self.provider.download(bucket, name).await {
            Ok(body) => Some(body),
            Err(StorageError::NotFound(_)) => {
                error!("File {} not found in bucket {}", name, bucket);
                None
            }
            Err(e) => {
                log_failure(&format!("download {}/{}", bucket, name), &e);
                None
            }
        }
    }

    /// Download a blob into `writer`, returning whether it was fully written
    pub async fn download_to<W>(&self, writer: &mut W, bucket: &str, name: &str) -> bool
    where
        W: AsyncWrite + Unpin + Send,
    {
        let Some(body) = self.download(bucket, name).await else {
            return false;
        };

        let written: std::io::Result<()> = async {
            writer.write_all(&body).await?;
            writer.flush().await
        }
        .await;

        match written {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to write {}/{} to output: {}", bucket, name, e);
                false
            }
        }
    }

    /// Whether a blob currently resolves in the bucket
    ///
    /// Freshly uploaded files may take a moment to appear; callers poll.
    pub async fn exists(&self, bucket: &str, name: &str) -> bool {
        match self.provider.get_blob(bucket, name).await {
            Ok(Some(_)) => {
                debug!("File {} is in bucket {}", name, bucket);
                true
            }
            Ok(None) | Err(StorageError::NotFound(_)) => {
                debug!("File {} is NOT in bucket {}", name, bucket);
                false
            }
            Err(e) => {
                log_failure(&format!("check {}/{}", bucket, name), &e);
                false
            }
        }
    }

    /// Console link for browsing a bucket
    pub fn images_browser_url(&self, bucket: &str) -> String {
        self.config.browser_url(bucket)
    }

    /// Console link for the configured image bucket
    pub fn images_url(&self) -> String {
        self.config.browser_url(&self.config.image_bucket)
    }

    /// Save a device image into the default bucket under a timestamped name
    pub async fn save_device_image(
        &self,
        device_id: &str,
        var_name: &str,
        image_type: &str,
        body: impl Into<Bytes>,
    ) -> Option<String> {
        let name = device_image_name(device_id, var_name, image_type, Utc::now());
        let content_type = format!("image/{}", image_type);

        let url = self
            .upload_bytes(
                body.into(),
                &self.config.default_bucket,
                &name,
                Some(content_type.as_str()),
            )
            .await?;

        info!("Image saved to {}", url);
        Some(url)
    }
}

/// `{device}_{var}_{timestamp}.{type}` with a UTC `YYYY-MM-DDTHH:MM:SSZ` stamp
pub fn device_image_name(
    device_id: &str,
    var_name: &str,
    image_type: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}_{}_{}.{}",
        device_id,
        var_name,
        at.format("%Y-%m-%dT%H:%M:%SZ"),
        image_type
    )
}

fn log_failure(operation: &str, err: &StorageError) {
    match err {
        StorageError::NotFound(what) => error!("Failed to {}: {} does not exist", operation, what),
        StorageError::PermissionDenied(detail) => {
            error!("Failed to {}: permission denied ({})", operation, detail)
        }
        StorageError::Transient(detail) => error!("Failed to {}: {}", operation, detail),
        StorageError::InvalidInput(detail) => warn!("Rejected {}: {}", operation, detail),
    }
}

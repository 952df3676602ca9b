//! Storage gateway configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Default cloud project identifier
pub const DEFAULT_PROJECT_ID: &str = "openag-v1";
/// Default bucket for device uploads
pub const DEFAULT_BUCKET_NAME: &str = "openag-v1-uploads";
/// Bucket holding device images
pub const DEFAULT_IMAGE_BUCKET: &str = "openag-v1-images";
/// Name prefix shared by all backup buckets
pub const DEFAULT_BACKUP_BUCKET_PREFIX: &str = "openag-v1-backup-";
/// Storage browser console URL, `{bucket}` and `{project}` are substituted
pub const DEFAULT_BROWSER_URL_TEMPLATE: &str =
    "https://console.cloud.google.com/storage/browser/{bucket}?project={project}";
/// Base for public object URLs
pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://storage.googleapis.com";
/// Default region for the S3 client
pub const DEFAULT_REGION: &str = "us-east-1";
/// Files older than this are removed by the sweep
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(2 * 60 * 60);

/// Environment variables read by [`StorageConfig::from_env`]
pub mod env {
    pub const PROJECT_ID: &str = "CLOUDCOMMON_PROJECT_ID";
    pub const BUCKET: &str = "CLOUDCOMMON_BUCKET";
    pub const IMAGE_BUCKET: &str = "CLOUDCOMMON_IMAGE_BUCKET";
    pub const BACKUP_PREFIX: &str = "CLOUDCOMMON_BACKUP_PREFIX";
    pub const BROWSER_URL_TEMPLATE: &str = "CLOUDCOMMON_BROWSER_URL_TEMPLATE";
    pub const PUBLIC_BASE_URL: &str = "CLOUDCOMMON_PUBLIC_BASE_URL";
    pub const REGION: &str = "CLOUDCOMMON_REGION";
    pub const ENDPOINT: &str = "CLOUDCOMMON_ENDPOINT";
    pub const STALE_AFTER_SECS: &str = "CLOUDCOMMON_STALE_AFTER_SECS";
}

/// Configuration for the storage gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Cloud project the buckets belong to
    pub project_id: String,

    /// Bucket used for device image saves
    pub default_bucket: String,

    /// Bucket browsed by the images console link
    pub image_bucket: String,

    /// Prefix identifying backup buckets
    pub backup_bucket_prefix: String,

    /// Console URL template for browsing a bucket
    pub browser_url_template: String,

    /// Base URL for public blob links
    pub public_base_url: String,

    /// S3 region
    pub region: String,

    /// Custom S3 endpoint (MinIO, GCS interop). Forces path-style addressing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Age in seconds after which a file is considered stale
    pub stale_after_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            project_id: DEFAULT_PROJECT_ID.to_string(),
            default_bucket: DEFAULT_BUCKET_NAME.to_string(),
            image_bucket: DEFAULT_IMAGE_BUCKET.to_string(),
            backup_bucket_prefix: DEFAULT_BACKUP_BUCKET_PREFIX.to_string(),
            browser_url_template: DEFAULT_BROWSER_URL_TEMPLATE.to_string(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            stale_after_secs: DEFAULT_STALE_AFTER.as_secs(),
        }
    }
}

impl StorageConfig {
    /// Load configuration from `CLOUDCOMMON_*` environment variables over the defaults
    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup keyed by the [`env`] names
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StorageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut config = Self::default();

        if let Some(v) = get(env::PROJECT_ID) {
            config.project_id = v;
        }
        if let Some(v) = get(env::BUCKET) {
            config.default_bucket = v;
        }
        if let Some(v) = get(env::IMAGE_BUCKET) {
            config.image_bucket = v;
        }
        if let Some(v) = get(env::BACKUP_PREFIX) {
            config.backup_bucket_prefix = v;
        }
        if let Some(v) = get(env::BROWSER_URL_TEMPLATE) {
            config.browser_url_template = v;
        }
        if let Some(v) = get(env::PUBLIC_BASE_URL) {
            config.public_base_url = v;
        }
        if let Some(v) = get(env::REGION) {
            config.region = v;
        }
        config.endpoint = get(env::ENDPOINT);
        if let Some(v) = get(env::STALE_AFTER_SECS) {
            config.stale_after_secs = v.trim().parse().map_err(|_| {
                StorageError::InvalidInput(format!(
                    "{} must be a number of seconds, got '{}'",
                    env::STALE_AFTER_SECS, v
                ))
            })?;
        }

        Ok(config)
    }

    /// Console URL for browsing a bucket
    pub fn browser_url(&self, bucket: &str) -> String {
        self.browser_url_template
            .replace("{bucket}", bucket)
            .replace("{project}", &self.project_id)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

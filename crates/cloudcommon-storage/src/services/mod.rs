//! Blob gateway service implementation

mod config;
mod gateway;

pub use config::{
    env, StorageConfig, DEFAULT_BACKUP_BUCKET_PREFIX, DEFAULT_BROWSER_URL_TEMPLATE,
    DEFAULT_BUCKET_NAME, DEFAULT_IMAGE_BUCKET, DEFAULT_PROJECT_ID, DEFAULT_PUBLIC_BASE_URL,
    DEFAULT_REGION, DEFAULT_STALE_AFTER,
};
pub use gateway::{
    device_image_name, BlobGateway, SweepReport, DEFAULT_STRING_CONTENT_TYPE,
    DEFAULT_UPLOAD_CONTENT_TYPE,
};

//! S3-compatible storage provider
//!
//! Works against AWS S3, MinIO/RustFS and the S3 interoperability endpoint of
//! Google Cloud Storage. Credentials come from the ambient AWS provider chain.

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{encode_key, path_style_url, BlobInfo, BucketInfo, StorageProvider};
use crate::error::StorageError;
use crate::services::StorageConfig;

/// S3 implementation of [`StorageProvider`]
pub struct S3Provider {
    client: Client,
    public_base_url: String,
}

impl S3Provider {
    /// Build a provider from configuration, resolving credentials from the environment
    pub async fn new(config: &StorageConfig) -> Self {
        debug!("Creating S3 provider for region: {}", config.region);

        let region_provider =
            RegionProviderChain::first_try(aws_sdk_s3::config::Region::new(config.region.clone()))
                .or_default_provider();

        let mut loader =
            aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region_provider);

        // Custom endpoint for MinIO / GCS interop
        if let Some(endpoint) = &config.endpoint {
            let endpoint_url = if endpoint.starts_with("http") {
                endpoint.clone()
            } else {
                format!("https://{}", endpoint)
            };
            loader = loader.endpoint_url(endpoint_url);
        }

        let sdk_config = loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if config.endpoint.is_some() {
            s3_config = s3_config.force_path_style(true);
        }

        Self::from_client(Client::from_conf(s3_config.build()), &config.public_base_url)
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client, public_base_url: &str) -> Self {
        Self {
            client,
            public_base_url: public_base_url.to_string(),
        }
    }
}

/// Map an SDK failure onto the storage error taxonomy using its error code
fn classify<E, R>(context: &str, err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().map(str::to_string);
    let detail = format!("{}: {}", context, DisplayErrorContext(&err));
    match code.as_deref() {
        Some("NoSuchKey") | Some("NotFound") | Some("NoSuchBucket") => {
            StorageError::NotFound(detail)
        }
        Some("AccessDenied") | Some("Forbidden") | Some("AllAccessDisabled") => {
            StorageError::PermissionDenied(detail)
        }
        _ => StorageError::Transient(detail),
    }
}

fn to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl StorageProvider for S3Provider {
    async fn list_buckets(&self, prefix: &str) -> Result<Vec<BucketInfo>, StorageError> {
        debug!("LIST buckets prefix={}", prefix);

        let response = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify("list buckets", e))?;

        Ok(response
            .buckets()
            .iter()
            .filter_map(|bucket| {
                let name = bucket.name()?;
                name.starts_with(prefix).then(|| BucketInfo {
                    name: name.to_string(),
                    created_at: bucket.creation_date().and_then(to_utc),
                })
            })
            .collect())
    }

    async fn list_blobs(&self, bucket: &str) -> Result<Vec<BlobInfo>, StorageError> {
        let mut blobs = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            debug!("LIST {} cursor={:?}", bucket, cursor);

            let mut request = self.client.list_objects_v2().bucket(bucket);
            if let Some(token) = cursor.take() {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| classify(&format!("list objects in '{}'", bucket), e))?;

            blobs.extend(response.contents().iter().filter_map(|obj| {
                Some(BlobInfo {
                    bucket: bucket.to_string(),
                    name: obj.key()?.to_string(),
                    content_type: None,
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    created_at: obj.last_modified().and_then(to_utc),
                })
            }));

            match response.next_continuation_token() {
                Some(next) if response.is_truncated().unwrap_or(false) => {
                    cursor = Some(next.to_string())
                }
                _ => break,
            }
        }

        Ok(blobs)
    }

    async fn get_blob(&self, bucket: &str, name: &str) -> Result<Option<BlobInfo>, StorageError> {
        debug!("HEAD {}/{}", bucket, name);

        let response = match self
            .client
            .head_object()
            .bucket(bucket)
            .key(name)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                return Ok(None)
            }
            Err(e) => return Err(classify(&format!("head {}/{}", bucket, name), e)),
        };

        Ok(Some(BlobInfo {
            bucket: bucket.to_string(),
            name: name.to_string(),
            content_type: response.content_type().map(str::to_string),
            size: response.content_length().unwrap_or(0).max(0) as u64,
            created_at: response.last_modified().and_then(to_utc),
        }))
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

        let size = body.len() as u64;
        debug!("PUT {}/{} ({} bytes, {})", bucket, name, size, content_type);

        self.client
            .put_object()
            .bucket(bucket)
            .key(name)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| classify(&format!("put {}/{}", bucket, name), e))?;

        Ok(BlobInfo {
            bucket: bucket.to_string(),
            name: name.to_string(),
            content_type: Some(content_type.to_string()),
            size,
            created_at: Some(Utc::now()),
        })
    }

    async fn copy_blob(
        &self,
        src_bucket: &str,
        dest_bucket: &str,
        name: &str,
    ) -> Result<BlobInfo, StorageError> {
        debug!("COPY {}/{} -> {}", src_bucket, name, dest_bucket);

        let response = self
            .client
            .copy_object()
            .copy_source(format!("{}/{}", src_bucket, encode_key(name)))
            .bucket(dest_bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| {
                classify(
                    &format!("copy {}/{} to '{}'", src_bucket, name, dest_bucket),
                    e,
                )
            })?;

        Ok(BlobInfo {
            bucket: dest_bucket.to_string(),
            name: name.to_string(),
            content_type: None,
            size: 0,
            created_at: response
                .copy_object_result()
                .and_then(|r| r.last_modified())
                .and_then(to_utc),
        })
    }

    async fn delete_blob(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        debug!("DELETE {}/{}", bucket, name);

        self.client
            .delete_object()
            .bucket(bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| classify(&format!("delete {}/{}", bucket, name), e))?;

        Ok(())
    }

    async fn download(&self, bucket: &str, name: &str) -> Result<Bytes, StorageError> {
        debug!("GET {}/{}", bucket, name);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(name)
            .send()
            .await
            .map_err(|e| classify(&format!("get {}/{}", bucket, name), e))?;

        let data = response.body.collect().await.map_err(|e| {
            StorageError::Transient(format!("read body of {}/{}: {}", bucket, name, e))
        })?;

        Ok(data.into_bytes())
    }

    async fn make_public(&self, bucket: &str, name: &str) -> Result<(), StorageError> {
        debug!("ACL public-read {}/{}", bucket, name);

        self.client
            .put_object_acl()
            .bucket(bucket)
            .key(name)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| classify(&format!("make {}/{} public", bucket, name), e))?;

        Ok(())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        path_style_url(&self.public_base_url, bucket, name)
    }
}

//! cloudcommon-storage: Blob store gateway for the cloud common services
//!
//! Wraps an S3-compatible object store behind [`StorageProvider`] and exposes
//! [`BlobGateway`], whose operations log failures and return sentinels
//! instead of errors.

pub mod error;
pub mod provider;
pub mod services;

pub use error::StorageError;
pub use provider::{BlobInfo, BucketInfo, InMemoryProvider, S3Provider, StorageProvider};
pub use services::{BlobGateway, StorageConfig, SweepReport};

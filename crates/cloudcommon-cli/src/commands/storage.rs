use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use cloudcommon_storage::services::{
    env, DEFAULT_BACKUP_BUCKET_PREFIX, DEFAULT_BROWSER_URL_TEMPLATE, DEFAULT_BUCKET_NAME,
    DEFAULT_IMAGE_BUCKET, DEFAULT_PROJECT_ID, DEFAULT_PUBLIC_BASE_URL, DEFAULT_REGION,
};
use cloudcommon_storage::{BlobGateway, S3Provider, StorageConfig};
use colored::Colorize;
use tracing::info;

/// Provider and bucket settings shared by every command
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Cloud project identifier
    #[arg(long, env = env::PROJECT_ID, default_value = DEFAULT_PROJECT_ID, global = true)]
    project_id: String,

    /// Default bucket for device image saves
    #[arg(long, env = env::BUCKET, default_value = DEFAULT_BUCKET_NAME, global = true)]
    default_bucket: String,

    /// Bucket holding device images
    #[arg(long, env = env::IMAGE_BUCKET, default_value = DEFAULT_IMAGE_BUCKET, global = true)]
    image_bucket: String,

    /// Name prefix of backup buckets
    #[arg(
        long,
        env = env::BACKUP_PREFIX,
        default_value = DEFAULT_BACKUP_BUCKET_PREFIX,
        global = true
    )]
    backup_prefix: String,

    /// Console URL template, `{bucket}` and `{project}` are substituted
    #[arg(
        long,
        env = env::BROWSER_URL_TEMPLATE,
        default_value = DEFAULT_BROWSER_URL_TEMPLATE,
        global = true
    )]
    browser_url_template: String,

    /// Base URL used to build public blob links
    #[arg(
        long,
        env = env::PUBLIC_BASE_URL,
        default_value = DEFAULT_PUBLIC_BASE_URL,
        global = true
    )]
    public_base_url: String,

    /// S3 region
    #[arg(long, env = env::REGION, default_value = DEFAULT_REGION, global = true)]
    region: String,

    /// S3 endpoint URL (MinIO, GCS interoperability)
    #[arg(long, env = env::ENDPOINT, global = true)]
    endpoint: Option<String>,

    /// Age in seconds after which uploads are considered stale
    #[arg(long, env = env::STALE_AFTER_SECS, default_value_t = 7200, global = true)]
    stale_after_secs: u64,
}

impl StorageArgs {
    pub fn to_config(&self) -> StorageConfig {
        StorageConfig {
            project_id: self.project_id.clone(),
            default_bucket: self.default_bucket.clone(),
            image_bucket: self.image_bucket.clone(),
            backup_bucket_prefix: self.backup_prefix.clone(),
            browser_url_template: self.browser_url_template.clone(),
            public_base_url: self.public_base_url.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            stale_after_secs: self.stale_after_secs,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum StorageCommand {
    /// Print the most recent backup bucket
    LatestBackup,
    /// Delete files older than the stale age from a bucket
    Expire {
        /// Bucket to sweep
        #[arg(long)]
        bucket: String,

        /// Override the configured stale age (seconds)
        #[arg(long)]
        max_age_secs: Option<u64>,
    },
    /// Move a file between buckets and print its public URL
    Move {
        /// Source bucket
        #[arg(long)]
        from: String,

        /// Destination bucket
        #[arg(long)]
        to: String,

        /// File name
        #[arg(long)]
        name: String,
    },
    /// Upload a local file and print its public URL
    Upload {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        name: String,

        /// Local file to upload
        #[arg(long)]
        file: PathBuf,

        /// Content type (defaults to image/png)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download a file to a local path
    Download {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        name: String,

        /// Destination path
        #[arg(long)]
        out: PathBuf,
    },
    /// Check whether a file is present in a bucket
    Exists {
        #[arg(long)]
        bucket: String,

        #[arg(long)]
        name: String,
    },
    /// Print the console URL for browsing a bucket (image bucket by default)
    BrowserUrl {
        #[arg(long)]
        bucket: Option<String>,
    },
}

impl StorageCommand {
    pub fn execute(self, args: StorageArgs) -> anyhow::Result<()> {
        let config = args.to_config();

        // No provider needed for a pure URL
        if let StorageCommand::BrowserUrl { bucket } = &self {
            let url = match bucket {
                Some(bucket) => config.browser_url(bucket),
                None => config.browser_url(&config.image_bucket),
            };
            println!("{}", url);
            return Ok(());
        }

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let provider = S3Provider::new(&config).await;
            let gateway = BlobGateway::new(Arc::new(provider), config);
            self.run(&gateway).await
        })
    }

    /// Run against an existing gateway; sentinel results become errors
    pub async fn run(self, gateway: &BlobGateway) -> anyhow::Result<()> {
        match self {
            StorageCommand::LatestBackup => {
                let Some(bucket) = gateway.latest_backup_bucket().await else {
                    bail!("No backup bucket found");
                };
                println!("{}", bucket.bright_cyan());
            }
            StorageCommand::Expire {
                bucket,
                max_age_secs,
            } => {
                let max_age = max_age_secs
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| gateway.config().stale_after());
                info!("Expiring files older than {}s in {}", max_age.as_secs(), bucket);

                let report = gateway.expire_stale_blobs(&bucket, max_age).await;
                println!(
                    "{} scanned {}, deleted {}, failed {}, skipped {}",
                    "Sweep:".bright_white().bold(),
                    report.scanned,
                    report.deleted.to_string().bright_green(),
                    report.failed.to_string().bright_red(),
                    report.skipped
                );
                if report.failed > 0 {
                    bail!("{} stale files could not be deleted", report.failed);
                }
            }
            StorageCommand::Move { from, to, name } => {
                let Some(url) = gateway.move_blob(&from, &to, &name).await else {
                    bail!("Could not move {} from {} to {}", name, from, to);
                };
                println!("{}", url.bright_green());
            }
            StorageCommand::Upload {
                bucket,
                name,
                file,
                content_type,
            } => {
                let reader = tokio::fs::File::open(&file)
                    .await
                    .with_context(|| format!("Failed to open {}", file.display()))?;
                let Some(url) = gateway
                    .upload(reader, &bucket, &name, content_type.as_deref())
                    .await
                else {
                    bail!("Upload of {} failed", file.display());
                };
                println!("{}", url.bright_green());
            }
            StorageCommand::Download { bucket, name, out } => {
                // Fetch first so a failed download leaves an existing file untouched
                let Some(body) = gateway.download(&bucket, &name).await else {
                    bail!("Download of {}/{} failed", bucket, name);
                };
                tokio::fs::write(&out, &body)
                    .await
                    .with_context(|| format!("Failed to write {}", out.display()))?;
                println!("{} {}", "Saved".bright_green(), out.display());
            }
            StorageCommand::Exists { bucket, name } => {
                if !gateway.exists(&bucket, &name).await {
                    bail!("{} is not in bucket {}", name, bucket);
                }
                println!("{}", "present".bright_green());
            }
            StorageCommand::BrowserUrl { bucket } => {
                let url = match bucket {
                    Some(bucket) => gateway.images_browser_url(&bucket),
                    None => gateway.images_url(),
                };
                println!("{}", url);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use clap::Parser;
    use cloudcommon_storage::InMemoryProvider;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        storage: StorageArgs,

        #[command(subcommand)]
        command: StorageCommand,
    }

    #[test]
    fn test_parse_expire_with_defaults() {
        let cli = TestCli::try_parse_from(["cloudcommon", "expire", "--bucket", "uploads"]).unwrap();
        let config = cli.storage.to_config();

        assert_eq!(config.backup_bucket_prefix, "openag-v1-backup-");
        assert_eq!(config.stale_after(), Duration::from_secs(7200));
        assert!(matches!(
            cli.command,
            StorageCommand::Expire { ref bucket, max_age_secs: None } if bucket == "uploads"
        ));
    }

    #[test]
    fn test_parse_global_endpoint_after_subcommand() {
        let cli = TestCli::try_parse_from([
            "cloudcommon",
            "move",
            "--from",
            "uploads",
            "--to",
            "images",
            "--name",
            "x.png",
            "--endpoint",
            "http://localhost:9000",
        ])
        .unwrap();
        assert_eq!(
            cli.storage.to_config().endpoint.as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[test]
    fn test_parse_browser_url_template() {
        let cli = TestCli::try_parse_from([
            "cloudcommon",
            "browser-url",
            "--project-id",
            "greenhouse",
            "--browser-url-template",
            "https://minio.local/browser/{bucket}?p={project}",
        ])
        .unwrap();
        let config = cli.storage.to_config();

        assert_eq!(
            config.browser_url_template,
            "https://minio.local/browser/{bucket}?p={project}"
        );
        assert_eq!(
            config.browser_url("scans"),
            "https://minio.local/browser/scans?p=greenhouse"
        );

        let defaults = TestCli::try_parse_from(["cloudcommon", "browser-url"]).unwrap();
        assert_eq!(
            defaults.storage.to_config().browser_url_template,
            DEFAULT_BROWSER_URL_TEMPLATE
        );
    }

    #[test]
    fn test_move_requires_name() {
        assert!(TestCli::try_parse_from(["cloudcommon", "move", "--from", "a", "--to", "b"]).is_err());
    }

    #[tokio::test]
    async fn test_run_reports_sentinels_as_errors() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.create_bucket("uploads").await;
        let gateway = BlobGateway::new(provider, StorageConfig::default());

        let missing = StorageCommand::Exists {
            bucket: "uploads".to_string(),
            name: "nope.png".to_string(),
        };
        assert!(missing.run(&gateway).await.is_err());

        assert!(StorageCommand::LatestBackup.run(&gateway).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_download_keeps_existing_file() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.create_bucket("uploads").await;
        provider
            .insert_blob(
                "uploads",
                "state.json",
                b"{\"ec\": 1.4}".to_vec(),
                Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            )
            .await;
        let gateway = BlobGateway::new(provider, StorageConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("keep.json");
        tokio::fs::write(&out, b"precious").await.unwrap();

        let missing = StorageCommand::Download {
            bucket: "uploads".to_string(),
            name: "nope".to_string(),
            out: out.clone(),
        };
        assert!(missing.run(&gateway).await.is_err());
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"precious");

        StorageCommand::Download {
            bucket: "uploads".to_string(),
            name: "state.json".to_string(),
            out: out.clone(),
        }
        .run(&gateway)
        .await
        .unwrap();
        assert_eq!(tokio::fs::read(&out).await.unwrap(), b"{\"ec\": 1.4}");
    }

    #[tokio::test]
    async fn test_run_upload_and_expire() {
        let provider = Arc::new(InMemoryProvider::new());
        provider.create_bucket("uploads").await;
        provider
            .set_time(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())
            .await;
        let gateway = BlobGateway::new(provider.clone(), StorageConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("reading.json");
        tokio::fs::write(&file, b"{\"ph\": 6.2}").await.unwrap();

        StorageCommand::Upload {
            bucket: "uploads".to_string(),
            name: "reading.json".to_string(),
            file,
            content_type: Some("application/json".to_string()),
        }
        .run(&gateway)
        .await
        .unwrap();
        assert_eq!(provider.blob_names("uploads").await, vec!["reading.json"]);

        StorageCommand::Expire {
            bucket: "uploads".to_string(),
            max_age_secs: None,
        }
        .run(&gateway)
        .await
        .unwrap();
        assert!(provider.blob_names("uploads").await.is_empty());
    }
}

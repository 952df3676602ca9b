//! Cloud Common CLI
//!
//! Operator entrypoint for the storage gateway: stale upload sweeps, backup
//! bucket lookup and manual blob transfers.

mod commands;

use clap::Parser;
use commands::{StorageArgs, StorageCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "CLOUDCOMMON_LOG_LEVEL",
        global = true
    )]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "CLOUDCOMMON_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(flatten)]
    storage: StorageArgs,

    #[command(subcommand)]
    command: StorageCommand,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // If RUST_LOG is set, use it as-is; otherwise our crates at the chosen level
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "cloudcommon_cli={level},\
             cloudcommon_storage={level},\
             aws_config=warn,\
             aws_smithy_runtime=warn,\
             hyper=warn,\
             rustls=warn",
            level = cli.log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    cli.command.execute(cli.storage)
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use s3upload::{config, FileDescriptor, FileValidationOptions, S3Client, UploadOptions};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "s3upload")]
#[command(version, about = "Upload, inspect and share objects on S3-compatible storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (YAML); environment variables are used when omitted
    #[arg(long, global = true)]
    config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file
    Upload {
        /// Local file path
        path: String,

        /// Key prefix (e.g. "docs")
        #[arg(long)]
        prefix: Option<String>,

        /// Exact object key instead of a generated one
        #[arg(long)]
        key: Option<String>,

        /// Bucket override
        #[arg(long)]
        bucket: Option<String>,

        /// Declared content type
        #[arg(long)]
        content_type: Option<String>,

        /// User metadata as name=value, repeatable
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,

        /// Skip the MIME allow-list check
        #[arg(long)]
        no_type_check: bool,
    },

    /// Delete an object
    Delete {
        key: String,

        #[arg(long)]
        bucket: Option<String>,
    },

    /// Check whether an object exists and show its metadata
    Exists {
        key: String,

        #[arg(long)]
        bucket: Option<String>,
    },

    /// Print a presigned GET URL
    Presign {
        key: String,

        /// Validity in seconds
        #[arg(long, default_value = "3600")]
        expires: u64,

        #[arg(long)]
        bucket: Option<String>,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got {s:?}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Every command is a single request; a current-thread runtime is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref(), cli.profile.as_deref())?;
    let client = S3Client::new(config)?;

    match cli.command {
        Commands::Upload {
            path,
            prefix,
            key,
            bucket,
            content_type,
            metadata,
            no_type_check,
        } => {
            let file = FileDescriptor::from_path(&path)
                .await
                .with_context(|| format!("Failed to read {path}"))?;

            let options = UploadOptions {
                prefix,
                bucket,
                key,
                content_type,
                metadata: metadata.into_iter().collect(),
                validation: FileValidationOptions::default().with_validate_type(!no_type_check),
            };

            let result = client.upload(&file, &options).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Delete { key, bucket } => {
            client.delete(&key, bucket.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&json!({ "deleted": key }))?);
        }
        Commands::Exists { key, bucket } => {
            let metadata = client.exists(&key, bucket.as_deref()).await?;
            let output = json!({
                "key": key,
                "exists": metadata.is_some(),
                "metadata": metadata,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Presign {
            key,
            expires,
            bucket,
        } => {
            let url = client.presigned_url(&key, expires, bucket.as_deref())?;
            println!("{url}");
        }
    }

    Ok(())
}
